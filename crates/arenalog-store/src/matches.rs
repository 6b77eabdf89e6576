//! Match lifecycle: start, opponent identity, end/result.

use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::event_runs;
use crate::row_helpers::{NullIfEmpty, PositiveOrNull};
use crate::time::{normalize_ts, now_utc};

/// Upsert a match by its client-assigned id. `started_at` never regresses;
/// event name and seat coalesce. The event name is alias-resolved first and
/// a matching event-run row is ensured. Returns the match rowid.
pub fn upsert_start(
    conn: &Connection,
    arena_match_id: &str,
    event_name: &str,
    seat_id: i64,
    started_at: &str,
) -> Result<i64, StoreError> {
    let resolved = if event_name.trim().is_empty() {
        String::new()
    } else {
        event_runs::resolve_event_name_alias(conn, event_name)?
    };

    let started_at = normalize_ts(started_at);
    let now = now_utc();
    conn.execute(
        "INSERT INTO matches (
             arena_match_id, event_name, player_seat_id, started_at, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(arena_match_id) DO UPDATE SET
             event_name = COALESCE(excluded.event_name, matches.event_name),
             player_seat_id = COALESCE(excluded.player_seat_id, matches.player_seat_id),
             started_at = COALESCE(matches.started_at, excluded.started_at),
             updated_at = excluded.updated_at",
        rusqlite::params![
            arena_match_id,
            NullIfEmpty(&resolved),
            PositiveOrNull(seat_id),
            NullIfEmpty(&started_at),
            now,
        ],
    )?;

    let match_id: i64 = conn.query_row(
        "SELECT id FROM matches WHERE arena_match_id = ?1",
        [arena_match_id],
        |row| row.get(0),
    )?;

    if !resolved.is_empty() {
        event_runs::ensure_exists(conn, &resolved, &started_at)?;
    }

    Ok(match_id)
}

/// Fill in opponent identity, coalescing over what is already known.
pub fn update_opponent(
    conn: &Connection,
    arena_match_id: &str,
    opponent_name: &str,
    opponent_user_id: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE matches
         SET opponent_name = COALESCE(?1, opponent_name),
             opponent_user_id = COALESCE(?2, opponent_user_id),
             updated_at = ?3
         WHERE arena_match_id = ?4",
        rusqlite::params![
            NullIfEmpty(opponent_name),
            NullIfEmpty(opponent_user_id),
            now_utc(),
            arena_match_id,
        ],
    )?;
    Ok(())
}

/// Derive a result from the self team and the winning team.
fn derive_result(team_id: i64, winning_team_id: i64) -> &'static str {
    if team_id > 0 && winning_team_id > 0 {
        if team_id == winning_team_id {
            "win"
        } else {
            "loss"
        }
    } else {
        "unknown"
    }
}

/// Record a match end. Creates an ended-only match row if the start was
/// never observed. Returns `(event_name, result)`.
///
/// The event-run win/loss record is bumped only when the stored result
/// transitions out of `unknown`: both the business-event and the
/// room-state end paths call this for the same match, and the transition
/// check is what keeps the counters from double counting.
#[allow(clippy::too_many_arguments)]
pub fn update_end(
    conn: &Connection,
    arena_match_id: &str,
    team_id: i64,
    winning_team_id: i64,
    turn_count: i64,
    seconds_count: i64,
    win_reason: &str,
    ended_at: &str,
) -> Result<(String, String), StoreError> {
    let ended_at = normalize_ts(ended_at);

    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT COALESCE(event_name, ''), result FROM matches WHERE arena_match_id = ?1",
            [arena_match_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (event_name, previous_result) = match existing {
        Some(found) => found,
        None => {
            conn.execute(
                "INSERT INTO matches (arena_match_id, ended_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![arena_match_id, NullIfEmpty(&ended_at), now_utc()],
            )?;
            (String::new(), "unknown".to_string())
        }
    };

    let result = derive_result(team_id, winning_team_id);

    conn.execute(
        "UPDATE matches
         SET ended_at = COALESCE(?1, ended_at),
             result = ?2,
             win_reason = COALESCE(?3, win_reason),
             turn_count = COALESCE(?4, turn_count),
             seconds_count = COALESCE(?5, seconds_count),
             updated_at = ?6
         WHERE arena_match_id = ?7",
        rusqlite::params![
            NullIfEmpty(&ended_at),
            result,
            NullIfEmpty(win_reason),
            PositiveOrNull(turn_count),
            PositiveOrNull(seconds_count),
            now_utc(),
            arena_match_id,
        ],
    )?;

    let decided = result == "win" || result == "loss";
    let transitioned = previous_result != "win" && previous_result != "loss";
    if decided && transitioned && !event_name.is_empty() {
        event_runs::bump_record(conn, &event_name, result)?;
    }

    Ok((event_name, result.to_string()))
}

/// Link a match to the most recently updated deck submitted for its event.
/// The link is additive; an existing (match, deck) pair is left alone.
pub fn link_to_latest_deck_by_event(
    conn: &Connection,
    arena_match_id: &str,
    event_name: &str,
    reason: &str,
) -> Result<(), StoreError> {
    if event_name.trim().is_empty() {
        return Ok(());
    }
    let event_name = event_runs::resolve_event_name_alias(conn, event_name)?;

    let match_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM matches WHERE arena_match_id = ?1",
            [arena_match_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(match_id) = match_id else {
        return Ok(());
    };

    let deck_id: Option<i64> = conn
        .query_row(
            "SELECT id
             FROM decks
             WHERE event_name = ?1
             ORDER BY COALESCE(last_updated, updated_at) DESC
             LIMIT 1",
            [event_name.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(deck_id) = deck_id else {
        return Ok(());
    };

    conn.execute(
        "INSERT INTO match_decks (match_id, deck_id, snapshot_reason, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(match_id, deck_id) DO NOTHING",
        rusqlite::params![match_id, deck_id, NullIfEmpty(reason), now_utc()],
    )?;

    Ok(())
}
