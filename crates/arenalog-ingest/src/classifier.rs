//! Line classification and identity sniffing.
//!
//! The client log interleaves human-readable framing, single-line RPC
//! envelopes, and single-line state envelopes. Classification is by
//! cheap prefix/substring checks; anything unrecognized is noise.

use std::sync::LazyLock;

use regex::Regex;

static OUTGOING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[UnityCrossThreadLogger\])?==>\s+([A-Za-z0-9_]+)\s+(.*)$").unwrap()
});
static METHOD_COMPLETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<==\s+([A-Za-z0-9_]+)\(([^)]*)\)").unwrap());

static PERSONA_PLAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""PersonaId":"([A-Za-z0-9_\-]+)""#).unwrap());
static PERSONA_ESCAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\\"PersonaId\\":\\"([A-Za-z0-9_\-]+)\\""#).unwrap());
static PERSONA_MATCH_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Match to ([A-Za-z0-9_\-]+):").unwrap());
static CLIENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""clientId"\s*:\s*"([A-Za-z0-9_\-]+)""#).unwrap());
static SCREEN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""screenName"\s*:\s*"([^"]+)""#).unwrap());

const ROOM_STATE_TOKEN: &str = "\"matchGameRoomStateChangedEvent\"";
const GRE_STATE_TOKEN: &str = "\"greToClientEvent\"";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classified<'a> {
    /// Outgoing RPC: method name plus the envelope JSON text.
    Outgoing { method: &'a str, envelope: &'a str },
    /// RPC completion acknowledgement: method plus request id.
    MethodComplete { method: &'a str, request_id: &'a str },
    /// Room-state JSON envelope.
    RoomState,
    /// Game-engine state JSON envelope.
    GreState,
    Noise,
}

pub fn classify(line: &str) -> Classified<'_> {
    if let Some(caps) = OUTGOING.captures(line) {
        let (Some(method), Some(envelope)) = (caps.get(1), caps.get(2)) else {
            return Classified::Noise;
        };
        return Classified::Outgoing {
            method: method.as_str(),
            envelope: envelope.as_str(),
        };
    }

    if let Some(caps) = METHOD_COMPLETE.captures(line) {
        let (Some(method), Some(request_id)) = (caps.get(1), caps.get(2)) else {
            return Classified::Noise;
        };
        return Classified::MethodComplete {
            method: method.as_str(),
            request_id: request_id.as_str(),
        };
    }

    if line.starts_with('{') {
        if line.contains(ROOM_STATE_TOKEN) {
            return Classified::RoomState;
        }
        if line.contains(GRE_STATE_TOKEN) {
            return Classified::GreState;
        }
    }

    Classified::Noise
}

/// Extract the self persona id from any line shape it appears in.
/// `NoInstallID`-prefixed values are placeholders, not identities.
pub fn sniff_persona_id(line: &str) -> Option<&str> {
    let persona = PERSONA_PLAIN
        .captures(line)
        .or_else(|| PERSONA_ESCAPED.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    if let Some(id) = persona {
        if !id.starts_with("NoInstallID") {
            return Some(id);
        }
    }

    PERSONA_MATCH_TO
        .captures(line)
        .or_else(|| CLIENT_ID.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|id| !id.is_empty())
}

pub fn sniff_screen_name(line: &str) -> Option<&str> {
    SCREEN_NAME
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
}
