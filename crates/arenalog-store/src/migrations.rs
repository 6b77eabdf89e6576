//! Schema migrations beyond the idempotent DDL in [`crate::schema`].
//!
//! Databases written before observations became game-aware lack the
//! `game_number` column on the two observation tables. SQLite cannot add a
//! column into a UNIQUE constraint, so affected tables are rebuilt:
//! rename old, create new, copy rows with `game_number = 1`, recreate
//! indexes, drop old. Each rebuild runs inside a transaction.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;
use crate::time::now_utc;

/// Run all pending rebuilds. Idempotent: tables already carrying
/// `game_number` are left untouched.
pub fn run(conn: &Connection) -> Result<(), StoreError> {
    if !table_has_column(conn, "match_card_plays", "game_number")? {
        rebuild_match_card_plays(conn)?;
    }
    if !table_has_column(conn, "match_opponent_card_instances", "game_number")? {
        rebuild_match_opponent_card_instances(conn)?;
    }
    Ok(())
}

fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn rebuild_match_card_plays(conn: &Connection) -> Result<(), StoreError> {
    info!(table = "match_card_plays", "rebuilding for game-aware uniqueness");

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StoreError::Migration(format!("begin match_card_plays rebuild: {e}")))?;

    tx.execute_batch(
        "ALTER TABLE match_card_plays RENAME TO match_card_plays_old;
         DROP INDEX IF EXISTS idx_match_card_plays_match_id;
         DROP INDEX IF EXISTS idx_match_card_plays_card_id;
         DROP INDEX IF EXISTS idx_match_card_plays_turn_order;
         CREATE TABLE match_card_plays (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             match_id INTEGER NOT NULL,
             game_number INTEGER NOT NULL DEFAULT 1,
             instance_id INTEGER NOT NULL,
             card_id INTEGER NOT NULL,
             owner_seat_id INTEGER,
             first_public_zone TEXT,
             turn_number INTEGER,
             phase TEXT,
             source TEXT,
             played_at TEXT,
             created_at TEXT NOT NULL,
             UNIQUE(match_id, game_number, instance_id),
             FOREIGN KEY(match_id) REFERENCES matches(id) ON DELETE CASCADE
         );
         INSERT INTO match_card_plays (
             id, match_id, game_number, instance_id, card_id, owner_seat_id,
             first_public_zone, turn_number, phase, source, played_at, created_at
         )
         SELECT
             id, match_id, 1, instance_id, card_id, owner_seat_id,
             first_public_zone, turn_number, phase, source, played_at, created_at
         FROM match_card_plays_old;
         CREATE INDEX idx_match_card_plays_match_id ON match_card_plays(match_id);
         CREATE INDEX idx_match_card_plays_card_id ON match_card_plays(card_id);
         CREATE INDEX idx_match_card_plays_turn_order ON match_card_plays(match_id, turn_number, played_at, id);
         DROP TABLE match_card_plays_old;",
    )
    .map_err(|e| StoreError::Migration(format!("rebuild match_card_plays: {e}")))?;

    record_rebuild(&tx, "match_card_plays rebuilt with game_number")?;

    tx.commit()
        .map_err(|e| StoreError::Migration(format!("commit match_card_plays rebuild: {e}")))
}

fn rebuild_match_opponent_card_instances(conn: &Connection) -> Result<(), StoreError> {
    info!(
        table = "match_opponent_card_instances",
        "rebuilding for game-aware uniqueness"
    );

    let tx = conn.unchecked_transaction().map_err(|e| {
        StoreError::Migration(format!("begin match_opponent_card_instances rebuild: {e}"))
    })?;

    tx.execute_batch(
        "ALTER TABLE match_opponent_card_instances RENAME TO match_opponent_card_instances_old;
         DROP INDEX IF EXISTS idx_match_opponent_cards_match_id;
         DROP INDEX IF EXISTS idx_match_opponent_cards_card_id;
         CREATE TABLE match_opponent_card_instances (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             match_id INTEGER NOT NULL,
             game_number INTEGER NOT NULL DEFAULT 1,
             instance_id INTEGER NOT NULL,
             card_id INTEGER NOT NULL,
             source TEXT,
             first_seen_at TEXT,
             created_at TEXT NOT NULL,
             UNIQUE(match_id, game_number, instance_id),
             FOREIGN KEY(match_id) REFERENCES matches(id) ON DELETE CASCADE
         );
         INSERT INTO match_opponent_card_instances (
             id, match_id, game_number, instance_id, card_id, source, first_seen_at, created_at
         )
         SELECT
             id, match_id, 1, instance_id, card_id, source, first_seen_at, created_at
         FROM match_opponent_card_instances_old;
         CREATE INDEX idx_match_opponent_cards_match_id ON match_opponent_card_instances(match_id);
         CREATE INDEX idx_match_opponent_cards_card_id ON match_opponent_card_instances(card_id);
         DROP TABLE match_opponent_card_instances_old;",
    )
    .map_err(|e| StoreError::Migration(format!("rebuild match_opponent_card_instances: {e}")))?;

    record_rebuild(&tx, "match_opponent_card_instances rebuilt with game_number")?;

    tx.commit().map_err(|e| {
        StoreError::Migration(format!("commit match_opponent_card_instances rebuild: {e}"))
    })
}

fn record_rebuild(conn: &Connection, description: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![crate::schema::SCHEMA_VERSION, now_utc(), description],
    )
    .map_err(|e| StoreError::Migration(format!("record schema version: {e}")))?;
    Ok(())
}
