//! Draft sessions and picks, for both human and bot drafts.

use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::row_helpers::NullIfEmpty;
use crate::time::{normalize_ts, now_utc};

/// Find or create the session a pick belongs to.
///
/// Human drafts carry a stable `draft_id`; bot drafts only carry the event
/// name, so the most recent incomplete session for that event is reused.
/// Returns the session rowid.
pub fn ensure_session(
    conn: &Connection,
    event_name: &str,
    draft_id: Option<&str>,
    is_bot: bool,
    ts: &str,
) -> Result<i64, StoreError> {
    let is_bot = i64::from(is_bot);
    let ts = normalize_ts(ts);
    let draft_id = draft_id.map(str::trim).filter(|id| !id.is_empty());

    if let Some(draft_id) = draft_id {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM draft_sessions WHERE draft_id = ?1 AND is_bot_draft = ?2",
                rusqlite::params![draft_id, is_bot],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(session_id) = found {
            conn.execute(
                "UPDATE draft_sessions
                 SET event_name = COALESCE(?1, event_name), updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![NullIfEmpty(event_name), now_utc(), session_id],
            )?;
            return Ok(session_id);
        }
    } else {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id
                 FROM draft_sessions
                 WHERE event_name = ?1 AND is_bot_draft = ?2 AND completed_at IS NULL
                 ORDER BY id DESC
                 LIMIT 1",
                rusqlite::params![event_name, is_bot],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(session_id) = found {
            return Ok(session_id);
        }
    }

    conn.execute(
        "INSERT INTO draft_sessions (event_name, draft_id, is_bot_draft, started_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![
            NullIfEmpty(event_name),
            draft_id,
            is_bot,
            NullIfEmpty(&ts),
            now_utc(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Upsert a pick decision. Re-ingesting the same (pack, pick) replaces the
/// card-id lists; `pick_ts` sticks at its first value.
pub fn insert_pick(
    conn: &Connection,
    session_id: i64,
    pack_number: i64,
    pick_number: i64,
    picked_ids: &[i64],
    pack_ids: &[i64],
    ts: &str,
) -> Result<(), StoreError> {
    let picked_json = serde_json::to_string(picked_ids)?;
    let pack_json = serde_json::to_string(pack_ids)?;
    let ts = normalize_ts(ts);

    conn.execute(
        "INSERT INTO draft_picks (
             draft_session_id, pack_number, pick_number, picked_card_ids, pack_card_ids, pick_ts, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(draft_session_id, pack_number, pick_number) DO UPDATE SET
             picked_card_ids = excluded.picked_card_ids,
             pack_card_ids = excluded.pack_card_ids,
             pick_ts = COALESCE(excluded.pick_ts, draft_picks.pick_ts)",
        rusqlite::params![
            session_id,
            pack_number,
            pick_number,
            picked_json,
            pack_json,
            NullIfEmpty(&ts),
            now_utc(),
        ],
    )?;

    conn.execute(
        "UPDATE draft_sessions SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now_utc(), session_id],
    )?;
    Ok(())
}

/// Mark a session completed. `completed_at` sticks at its first value.
/// A `draft_id` addresses the session directly; otherwise the most recent
/// session for the event is completed.
pub fn complete_session(
    conn: &Connection,
    event_name: &str,
    draft_id: Option<&str>,
    is_bot: bool,
    ts: &str,
) -> Result<(), StoreError> {
    let is_bot = i64::from(is_bot);
    // Completion events carry no timestamp of their own; fall back to the
    // ingest clock so completed_at still marks the session finished.
    let mut ts = normalize_ts(ts);
    if ts.is_empty() {
        ts = now_utc();
    }
    let draft_id = draft_id.map(str::trim).filter(|id| !id.is_empty());

    if let Some(draft_id) = draft_id {
        conn.execute(
            "UPDATE draft_sessions
             SET completed_at = COALESCE(completed_at, ?1), updated_at = ?2
             WHERE draft_id = ?3 AND is_bot_draft = ?4",
            rusqlite::params![ts, now_utc(), draft_id, is_bot],
        )?;
        return Ok(());
    }

    if !event_name.trim().is_empty() {
        conn.execute(
            "UPDATE draft_sessions
             SET completed_at = COALESCE(completed_at, ?1), updated_at = ?2
             WHERE id = (
                 SELECT id FROM draft_sessions
                 WHERE event_name = ?3 AND is_bot_draft = ?4
                 ORDER BY id DESC LIMIT 1
             )",
            rusqlite::params![ts, now_utc(), event_name, is_bot],
        )?;
    }

    Ok(())
}
