//! Event runs: one row per tournament/event entry, join through prize claim.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::row_helpers::{NullIfEmpty, PositiveOrNull};
use crate::time::{normalize_ts, now_utc};

/// Compact `SET_Kind` event names the client emits on match starts, which
/// the event-run table stores in expanded, date-suffixed form.
static SET_KIND_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)_(Quick_Draft|Premier_Draft|Sealed)$").unwrap()
});

/// Classify an event name into a coarse type used for filtering.
pub fn detect_event_type(event_name: &str) -> &'static str {
    let lower = event_name.to_lowercase();
    if lower.contains("quickdraft") {
        "quick_draft"
    } else if lower.contains("premierdraft") {
        "premier_draft"
    } else if lower.contains("traditionalsealed") || lower.contains("sealed") {
        "sealed"
    } else if lower.contains("jump_in") {
        "jump_in"
    } else if lower.contains("ladder") {
        "ladder"
    } else {
        "other"
    }
}

/// Resolve a possibly-compact event name against known event runs.
///
/// Exact match wins. Otherwise `SET_Kind` names fall back to the newest
/// run matching the expanded lowercase prefix. Unresolvable names are
/// returned verbatim, which makes resolution idempotent.
pub fn resolve_event_name_alias(
    conn: &Connection,
    event_name: &str,
) -> Result<String, StoreError> {
    let event_name = event_name.trim();
    if event_name.is_empty() {
        return Ok(String::new());
    }

    let exact: Option<String> = conn
        .query_row(
            "SELECT event_name FROM event_runs WHERE event_name = ?1 LIMIT 1",
            [event_name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(existing) = exact {
        return Ok(existing);
    }

    let Some(caps) = SET_KIND_EVENT.captures(event_name) else {
        return Ok(event_name.to_string());
    };

    let set_code = caps[1].to_lowercase();
    let like_pattern = match caps[2].to_lowercase().as_str() {
        "quick_draft" => format!("quickdraft_{set_code}_%"),
        "premier_draft" => format!("premierdraft_{set_code}_%"),
        "sealed" => format!("sealed_{set_code}_%"),
        _ => return Ok(event_name.to_string()),
    };

    let matched: Option<String> = conn
        .query_row(
            "SELECT event_name
             FROM event_runs
             WHERE LOWER(event_name) LIKE ?1
             ORDER BY started_at DESC, updated_at DESC
             LIMIT 1",
            [like_pattern],
            |row| row.get(0),
        )
        .optional()?;

    Ok(matched.unwrap_or_else(|| event_name.to_string()))
}

/// Record an event join. Status starts `active`; a re-join never resets
/// `started_at` or the win/loss record.
pub fn upsert_join(
    conn: &Connection,
    event_name: &str,
    currency_type: &str,
    currency_paid: i64,
    ts: &str,
) -> Result<(), StoreError> {
    let ts = normalize_ts(ts);
    conn.execute(
        "INSERT INTO event_runs (
             event_name, event_type, entry_currency_type, entry_currency_paid, status, started_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)
         ON CONFLICT(event_name) DO UPDATE SET
             event_type = excluded.event_type,
             entry_currency_type = COALESCE(excluded.entry_currency_type, event_runs.entry_currency_type),
             entry_currency_paid = COALESCE(excluded.entry_currency_paid, event_runs.entry_currency_paid),
             updated_at = excluded.updated_at",
        rusqlite::params![
            event_name,
            detect_event_type(event_name),
            NullIfEmpty(currency_type),
            PositiveOrNull(currency_paid),
            NullIfEmpty(&ts),
            now_utc(),
        ],
    )?;
    Ok(())
}

/// Ensure a run row exists for an event seen only through match starts.
/// Touches `updated_at` on conflict, nothing else.
pub fn ensure_exists(
    conn: &Connection,
    event_name: &str,
    started_at: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO event_runs (event_name, event_type, status, started_at, updated_at)
         VALUES (?1, ?2, 'active', ?3, ?4)
         ON CONFLICT(event_name) DO UPDATE SET updated_at = excluded.updated_at",
        rusqlite::params![
            event_name,
            detect_event_type(event_name),
            NullIfEmpty(started_at),
            now_utc(),
        ],
    )?;
    Ok(())
}

/// Mark a run claimed. `ended_at` sticks at its first value.
pub fn mark_claimed(conn: &Connection, event_name: &str, ts: &str) -> Result<(), StoreError> {
    let ts = normalize_ts(ts);
    conn.execute(
        "UPDATE event_runs
         SET status = 'claimed',
             ended_at = COALESCE(ended_at, ?1),
             updated_at = ?2
         WHERE event_name = ?3",
        rusqlite::params![NullIfEmpty(&ts), now_utc(), event_name],
    )?;
    Ok(())
}

/// Increment the run's win or loss counter. Callers bump exactly once per
/// decided match end; the counters only ever grow.
pub fn bump_record(conn: &Connection, event_name: &str, result: &str) -> Result<(), StoreError> {
    if event_name.is_empty() {
        return Ok(());
    }
    let column = match result {
        "win" => "wins",
        "loss" => "losses",
        _ => return Ok(()),
    };
    conn.execute(
        &format!(
            "UPDATE event_runs SET {column} = {column} + 1, updated_at = ?1 WHERE event_name = ?2"
        ),
        rusqlite::params![now_utc(), event_name],
    )?;
    Ok(())
}
