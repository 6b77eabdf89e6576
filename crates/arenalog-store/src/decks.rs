//! Deck snapshots and their card lists.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::row_helpers::NullIfEmpty;
use crate::time::{normalize_ts, now_utc};

/// One card line inside a deck section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeckCard {
    pub section: &'static str,
    pub card_id: i64,
    pub quantity: i64,
}

/// Upsert a deck by its client-assigned id and replace its card list
/// wholesale. Metadata updates coalesce: absent values never clobber
/// present ones. Returns the deck's rowid.
#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &Connection,
    arena_deck_id: &str,
    event_name: &str,
    name: &str,
    format: &str,
    source: &str,
    last_updated: &str,
    cards: &[DeckCard],
) -> Result<i64, StoreError> {
    let now = now_utc();
    let last_updated = normalize_ts(last_updated);

    conn.execute(
        "INSERT INTO decks (
             arena_deck_id, event_name, name, format, source, last_updated, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(arena_deck_id) DO UPDATE SET
             event_name = COALESCE(excluded.event_name, decks.event_name),
             name = COALESCE(excluded.name, decks.name),
             format = COALESCE(excluded.format, decks.format),
             source = COALESCE(excluded.source, decks.source),
             last_updated = COALESCE(excluded.last_updated, decks.last_updated),
             updated_at = excluded.updated_at",
        rusqlite::params![
            arena_deck_id,
            NullIfEmpty(event_name),
            NullIfEmpty(name),
            NullIfEmpty(format),
            NullIfEmpty(source),
            NullIfEmpty(&last_updated),
            now,
        ],
    )?;

    let deck_id: i64 = conn.query_row(
        "SELECT id FROM decks WHERE arena_deck_id = ?1",
        [arena_deck_id],
        |row| row.get(0),
    )?;

    conn.execute("DELETE FROM deck_cards WHERE deck_id = ?1", [deck_id])?;

    let mut insert = conn.prepare(
        "INSERT INTO deck_cards (deck_id, section, card_id, quantity) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for card in cards {
        if card.quantity <= 0 {
            continue;
        }
        insert.execute(rusqlite::params![deck_id, card.section, card.card_id, card.quantity])?;
    }

    Ok(deck_id)
}
