//! Read-side queries backing the HTTP API.
//!
//! Row shapes serialize in the camelCase form the frontend consumes.
//! `card_name` fields start empty here; the enrichment layer fills them
//! in best-effort after the query.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event_runs::detect_event_type;
use crate::row_helpers::{get, get_opt};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRow {
    pub id: i64,
    pub arena_match_id: String,
    pub event_name: String,
    pub opponent: String,
    pub started_at: String,
    pub ended_at: String,
    pub result: String,
    pub win_reason: String,
    pub turn_count: Option<i64>,
    pub seconds_count: Option<i64>,
    pub deck_id: Option<i64>,
    pub deck_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_matches: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate: f64,
    pub recent: Vec<MatchRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPlayRow {
    pub id: i64,
    pub game_number: Option<i64>,
    pub instance_id: i64,
    pub card_id: i64,
    pub card_name: Option<String>,
    pub owner_seat_id: Option<i64>,
    pub first_public_zone: String,
    pub turn_number: Option<i64>,
    pub phase: String,
    pub played_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentObservedCardRow {
    pub card_id: i64,
    pub card_name: Option<String>,
    pub quantity: i64,
    pub first_seen_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub match_info: MatchRow,
    pub card_plays: Vec<CardPlayRow>,
    pub opponent_observed_cards: Vec<OpponentObservedCardRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummaryRow {
    pub deck_id: i64,
    pub deck_name: String,
    pub format: String,
    pub event_name: String,
    pub matches: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCardRow {
    pub section: String,
    pub card_id: i64,
    pub card_name: Option<String>,
    pub quantity: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckDetail {
    pub deck_id: i64,
    pub arena_deck_id: String,
    pub name: String,
    pub format: String,
    pub event_name: String,
    pub cards: Vec<DeckCardRow>,
    pub matches: Vec<MatchRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSessionRow {
    pub id: i64,
    pub event_name: String,
    pub draft_id: Option<String>,
    pub is_bot_draft: bool,
    pub started_at: String,
    pub completed_at: String,
    pub picks: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPickRow {
    pub id: i64,
    pub pack_number: i64,
    pub pick_number: i64,
    pub picked_card_ids: String,
    pub pack_card_ids: String,
    pub pick_ts: String,
}

/// Deck listing scope. Draft covers the three limited event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckScope {
    All,
    Constructed,
    Draft,
}

impl DeckScope {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "constructed" => Self::Constructed,
            "draft" => Self::Draft,
            _ => Self::All,
        }
    }

    fn keeps(self, event_name: &str) -> bool {
        let is_limited = matches!(
            detect_event_type(event_name),
            "quick_draft" | "premier_draft" | "sealed"
        );
        match self {
            Self::All => true,
            Self::Draft => is_limited,
            Self::Constructed => !is_limited,
        }
    }
}

const MATCH_SELECT: &str = "
    SELECT
        m.id,
        m.arena_match_id,
        COALESCE(m.event_name, ''),
        COALESCE(m.opponent_name, ''),
        COALESCE(m.started_at, ''),
        COALESCE(m.ended_at, ''),
        COALESCE(m.result, 'unknown'),
        COALESCE(m.win_reason, ''),
        m.turn_count,
        m.seconds_count,
        d.id,
        d.name
    FROM matches m
    LEFT JOIN match_decks md ON md.match_id = m.id
    LEFT JOIN decks d ON d.id = md.deck_id";

fn row_to_match(row: &rusqlite::Row<'_>) -> Result<MatchRow, StoreError> {
    Ok(MatchRow {
        id: get(row, 0, "matches", "id")?,
        arena_match_id: get(row, 1, "matches", "arena_match_id")?,
        event_name: get(row, 2, "matches", "event_name")?,
        opponent: get(row, 3, "matches", "opponent_name")?,
        started_at: get(row, 4, "matches", "started_at")?,
        ended_at: get(row, 5, "matches", "ended_at")?,
        result: get(row, 6, "matches", "result")?,
        win_reason: get(row, 7, "matches", "win_reason")?,
        turn_count: get_opt(row, 8, "matches", "turn_count")?,
        seconds_count: get_opt(row, 9, "matches", "seconds_count")?,
        deck_id: get_opt(row, 10, "matches", "deck_id")?,
        deck_name: get_opt(row, 11, "matches", "deck_name")?,
    })
}

pub fn overview(conn: &Connection, recent_limit: i64) -> Result<Overview, StoreError> {
    let recent_limit = if recent_limit <= 0 { 20 } else { recent_limit };

    let (total, wins, losses): (i64, i64, i64) = conn.query_row(
        "SELECT
             COUNT(*),
             COALESCE(SUM(CASE WHEN result = 'win' THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN result = 'loss' THEN 1 ELSE 0 END), 0)
         FROM matches",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let win_rate = if total > 0 { wins as f64 / total as f64 } else { 0.0 };

    Ok(Overview {
        total_matches: total,
        wins,
        losses,
        win_rate,
        recent: list_matches(conn, recent_limit, "", "")?,
    })
}

pub fn list_matches(
    conn: &Connection,
    limit: i64,
    event_name: &str,
    result: &str,
) -> Result<Vec<MatchRow>, StoreError> {
    let limit = if limit <= 0 { 200 } else { limit };
    let sql = format!(
        "{MATCH_SELECT}
         WHERE (?1 = '' OR m.event_name = ?1)
           AND (?2 = '' OR m.result = ?2)
         ORDER BY COALESCE(m.started_at, m.ended_at, m.updated_at) DESC
         LIMIT ?3"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params![event_name, result, limit])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_match(row)?);
    }
    Ok(out)
}

pub fn get_match_detail(conn: &Connection, match_id: i64) -> Result<MatchDetail, StoreError> {
    let sql = format!("{MATCH_SELECT} WHERE m.id = ?1 LIMIT 1");
    // The row closure can only fail with rusqlite errors, so mapping to
    // StoreError happens outside it.
    let match_info = conn
        .query_row(&sql, [match_id], |row| Ok(row_to_match(row)))
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("match {match_id}")))??;

    Ok(MatchDetail {
        match_info,
        card_plays: list_card_plays(conn, match_id)?,
        opponent_observed_cards: list_opponent_observed_cards(conn, match_id)?,
    })
}

/// Card plays for a match in timeline order.
pub fn list_card_plays(conn: &Connection, match_id: i64) -> Result<Vec<CardPlayRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, game_number, instance_id, card_id, owner_seat_id,
                COALESCE(first_public_zone, ''), turn_number, COALESCE(phase, ''),
                COALESCE(played_at, '')
         FROM match_card_plays
         WHERE match_id = ?1
         ORDER BY game_number, turn_number, played_at, id",
    )?;
    let mut rows = stmt.query([match_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(CardPlayRow {
            id: get(row, 0, "match_card_plays", "id")?,
            game_number: get_opt(row, 1, "match_card_plays", "game_number")?,
            instance_id: get(row, 2, "match_card_plays", "instance_id")?,
            card_id: get(row, 3, "match_card_plays", "card_id")?,
            card_name: None,
            owner_seat_id: get_opt(row, 4, "match_card_plays", "owner_seat_id")?,
            first_public_zone: get(row, 5, "match_card_plays", "first_public_zone")?,
            turn_number: get_opt(row, 6, "match_card_plays", "turn_number")?,
            phase: get(row, 7, "match_card_plays", "phase")?,
            played_at: get(row, 8, "match_card_plays", "played_at")?,
        });
    }
    Ok(out)
}

/// Opponent cards aggregated per card id. A best-of-N match sees the same
/// physical card once per game, so the quantity is the max per-game count,
/// not the total across games.
pub fn list_opponent_observed_cards(
    conn: &Connection,
    match_id: i64,
) -> Result<Vec<OpponentObservedCardRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT card_id, MAX(cnt), MIN(first_seen)
         FROM (
             SELECT card_id, game_number, COUNT(*) AS cnt,
                    MIN(COALESCE(first_seen_at, '')) AS first_seen
             FROM match_opponent_card_instances
             WHERE match_id = ?1
             GROUP BY card_id, game_number
         )
         GROUP BY card_id
         ORDER BY MIN(first_seen), card_id",
    )?;
    let mut rows = stmt.query([match_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(OpponentObservedCardRow {
            card_id: get(row, 0, "match_opponent_card_instances", "card_id")?,
            card_name: None,
            quantity: get(row, 1, "match_opponent_card_instances", "quantity")?,
            first_seen_at: get(row, 2, "match_opponent_card_instances", "first_seen_at")?,
        });
    }
    Ok(out)
}

pub fn list_decks(conn: &Connection, scope: DeckScope) -> Result<Vec<DeckSummaryRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT
             d.id,
             COALESCE(d.name, d.arena_deck_id) AS deck_name,
             COALESCE(d.format, ''),
             COALESCE(d.event_name, ''),
             COUNT(m.id) AS matches,
             COALESCE(SUM(CASE WHEN m.result = 'win' THEN 1 ELSE 0 END), 0) AS wins,
             COALESCE(SUM(CASE WHEN m.result = 'loss' THEN 1 ELSE 0 END), 0) AS losses
         FROM decks d
         LEFT JOIN match_decks md ON md.deck_id = d.id
         LEFT JOIN matches m ON m.id = md.match_id
         GROUP BY d.id, d.name, d.arena_deck_id, d.format, d.event_name
         ORDER BY matches DESC, deck_name ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut summary = DeckSummaryRow {
            deck_id: get(row, 0, "decks", "id")?,
            deck_name: get(row, 1, "decks", "name")?,
            format: get(row, 2, "decks", "format")?,
            event_name: get(row, 3, "decks", "event_name")?,
            matches: get(row, 4, "decks", "matches")?,
            wins: get(row, 5, "decks", "wins")?,
            losses: get(row, 6, "decks", "losses")?,
            win_rate: 0.0,
        };
        if !scope.keeps(&summary.event_name) {
            continue;
        }
        if summary.matches > 0 {
            summary.win_rate = summary.wins as f64 / summary.matches as f64;
        }
        out.push(summary);
    }
    Ok(out)
}

pub fn get_deck_detail(
    conn: &Connection,
    deck_id: i64,
    match_limit: i64,
) -> Result<DeckDetail, StoreError> {
    let match_limit = if match_limit <= 0 { 50 } else { match_limit };

    let header: Option<(i64, String, String, String, String)> = conn
        .query_row(
            "SELECT id, arena_deck_id, COALESCE(name, ''), COALESCE(format, ''), COALESCE(event_name, '')
             FROM decks WHERE id = ?1",
            [deck_id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            },
        )
        .optional()?;
    let (deck_id, arena_deck_id, name, format, event_name) =
        header.ok_or_else(|| StoreError::NotFound(format!("deck {deck_id}")))?;

    let mut cards = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT section, card_id, quantity
             FROM deck_cards
             WHERE deck_id = ?1
             ORDER BY section, card_id",
        )?;
        let mut rows = stmt.query([deck_id])?;
        while let Some(row) = rows.next()? {
            cards.push(DeckCardRow {
                section: get(row, 0, "deck_cards", "section")?,
                card_id: get(row, 1, "deck_cards", "card_id")?,
                card_name: None,
                quantity: get(row, 2, "deck_cards", "quantity")?,
            });
        }
    }

    let mut matches = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT
                 m.id,
                 m.arena_match_id,
                 COALESCE(m.event_name, ''),
                 COALESCE(m.opponent_name, ''),
                 COALESCE(m.started_at, ''),
                 COALESCE(m.ended_at, ''),
                 COALESCE(m.result, 'unknown'),
                 COALESCE(m.win_reason, ''),
                 m.turn_count,
                 m.seconds_count
             FROM matches m
             JOIN match_decks md ON md.match_id = m.id
             WHERE md.deck_id = ?1
             ORDER BY COALESCE(m.started_at, m.ended_at, m.updated_at) DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(rusqlite::params![deck_id, match_limit])?;
        while let Some(row) = rows.next()? {
            matches.push(MatchRow {
                id: get(row, 0, "matches", "id")?,
                arena_match_id: get(row, 1, "matches", "arena_match_id")?,
                event_name: get(row, 2, "matches", "event_name")?,
                opponent: get(row, 3, "matches", "opponent_name")?,
                started_at: get(row, 4, "matches", "started_at")?,
                ended_at: get(row, 5, "matches", "ended_at")?,
                result: get(row, 6, "matches", "result")?,
                win_reason: get(row, 7, "matches", "win_reason")?,
                turn_count: get_opt(row, 8, "matches", "turn_count")?,
                seconds_count: get_opt(row, 9, "matches", "seconds_count")?,
                deck_id: Some(deck_id),
                deck_name: None,
            });
        }
    }

    Ok(DeckDetail {
        deck_id,
        arena_deck_id,
        name,
        format,
        event_name,
        cards,
        matches,
    })
}

pub fn list_draft_sessions(conn: &Connection) -> Result<Vec<DraftSessionRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT
             ds.id,
             COALESCE(ds.event_name, ''),
             ds.draft_id,
             ds.is_bot_draft,
             COALESCE(ds.started_at, ''),
             COALESCE(ds.completed_at, ''),
             COUNT(dp.id) AS picks
         FROM draft_sessions ds
         LEFT JOIN draft_picks dp ON dp.draft_session_id = ds.id
         GROUP BY ds.id, ds.event_name, ds.draft_id, ds.is_bot_draft, ds.started_at, ds.completed_at
         ORDER BY ds.id DESC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let is_bot: i64 = get(row, 3, "draft_sessions", "is_bot_draft")?;
        out.push(DraftSessionRow {
            id: get(row, 0, "draft_sessions", "id")?,
            event_name: get(row, 1, "draft_sessions", "event_name")?,
            draft_id: get_opt(row, 2, "draft_sessions", "draft_id")?,
            is_bot_draft: is_bot == 1,
            started_at: get(row, 4, "draft_sessions", "started_at")?,
            completed_at: get(row, 5, "draft_sessions", "completed_at")?,
            picks: get(row, 6, "draft_sessions", "picks")?,
        });
    }
    Ok(out)
}

pub fn list_draft_picks(
    conn: &Connection,
    session_id: i64,
) -> Result<Vec<DraftPickRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, pack_number, pick_number, picked_card_ids,
                COALESCE(pack_card_ids, '[]'), COALESCE(pick_ts, '')
         FROM draft_picks
         WHERE draft_session_id = ?1
         ORDER BY pack_number, pick_number",
    )?;
    let mut rows = stmt.query([session_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(DraftPickRow {
            id: get(row, 0, "draft_picks", "id")?,
            pack_number: get(row, 1, "draft_picks", "pack_number")?,
            pick_number: get(row, 2, "draft_picks", "pick_number")?,
            picked_card_ids: get(row, 3, "draft_picks", "picked_card_ids")?,
            pack_card_ids: get(row, 4, "draft_picks", "pack_card_ids")?,
            pick_ts: get(row, 5, "draft_picks", "pick_ts")?,
        });
    }
    Ok(out)
}
