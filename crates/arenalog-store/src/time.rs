//! Canonical instant handling.
//!
//! Every timestamp persisted by the store is RFC 3339 in UTC. Client logs
//! carry two shapes: RFC 3339 strings inside RPC payloads, and decimal
//! epoch strings on room/GRE envelopes whose unit must be inferred from
//! magnitude.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current instant in the canonical form.
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Normalize an RFC 3339 timestamp to the canonical UTC form.
/// Unparseable input is returned verbatim rather than dropped; the store
/// prefers a non-canonical timestamp over losing it.
pub fn normalize_ts(ts: &str) -> String {
    let trimmed = ts.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Err(_) => trimmed.to_string(),
    }
}

/// Parse a decimal epoch string from a client envelope.
///
/// Magnitudes in `[1e12, 1e13)` are milliseconds, `[1e9, 1e10)` seconds;
/// anything else is treated as absent. Returns the canonical instant form.
pub fn parse_client_timestamp(raw: &str) -> Option<String> {
    let value: i64 = raw.trim().parse().ok()?;

    let ts = if (1_000_000_000_000..10_000_000_000_000).contains(&value) {
        DateTime::<Utc>::from_timestamp_millis(value)?
    } else if (1_000_000_000..10_000_000_000).contains(&value) {
        DateTime::<Utc>::from_timestamp(value, 0)?
    } else {
        return None;
    };

    Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
