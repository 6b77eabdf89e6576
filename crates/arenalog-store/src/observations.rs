//! Publicly observed card objects: timeline plays and opponent instances.
//!
//! Both tables are keyed by `(match, game_number, instance_id)`, so the
//! GRE stream re-emitting the same object never duplicates a row, and the
//! first-seen timestamps are immutable once set.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::row_helpers::{NullIfEmpty, PositiveOrNull};
use crate::time::{normalize_ts, now_utc};

/// Record the first public appearance of a card instance in a playable
/// zone. Re-emissions update nothing.
#[allow(clippy::too_many_arguments)]
pub fn upsert_card_play(
    conn: &Connection,
    arena_match_id: &str,
    game_number: i64,
    instance_id: i64,
    card_id: i64,
    owner_seat_id: i64,
    turn_number: i64,
    phase: &str,
    zone_type: &str,
    played_at: &str,
    source: &str,
) -> Result<(), StoreError> {
    let Some(match_id) = match_rowid(conn, arena_match_id)? else {
        return Ok(());
    };
    let played_at = normalize_ts(played_at);

    conn.execute(
        "INSERT INTO match_card_plays (
             match_id, game_number, instance_id, card_id, owner_seat_id,
             first_public_zone, turn_number, phase, source, played_at, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(match_id, game_number, instance_id) DO NOTHING",
        rusqlite::params![
            match_id,
            game_number.max(1),
            instance_id,
            card_id,
            PositiveOrNull(owner_seat_id),
            NullIfEmpty(zone_type),
            PositiveOrNull(turn_number),
            NullIfEmpty(phase),
            NullIfEmpty(source),
            NullIfEmpty(&played_at),
            now_utc(),
        ],
    )?;
    Ok(())
}

/// Record an opponent-owned card instance. `first_seen_at` is never
/// overwritten by later sightings.
pub fn upsert_opponent_card_instance(
    conn: &Connection,
    arena_match_id: &str,
    game_number: i64,
    instance_id: i64,
    card_id: i64,
    first_seen_at: &str,
    source: &str,
) -> Result<(), StoreError> {
    let Some(match_id) = match_rowid(conn, arena_match_id)? else {
        return Ok(());
    };
    let first_seen_at = normalize_ts(first_seen_at);

    conn.execute(
        "INSERT INTO match_opponent_card_instances (
             match_id, game_number, instance_id, card_id, source, first_seen_at, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(match_id, game_number, instance_id) DO NOTHING",
        rusqlite::params![
            match_id,
            game_number.max(1),
            instance_id,
            card_id,
            NullIfEmpty(source),
            NullIfEmpty(&first_seen_at),
            now_utc(),
        ],
    )?;
    Ok(())
}

fn match_rowid(conn: &Connection, arena_match_id: &str) -> Result<Option<i64>, StoreError> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT id FROM matches WHERE arena_match_id = ?1",
            [arena_match_id],
            |row| row.get(0),
        )
        .optional()?)
}
