//! The ingestion pipeline: reader → classifier → extractors → correlator
//! → transactional writer.
//!
//! One cooperative pass per log file. Lines are processed strictly in
//! file order; work is committed in batches of [`BATCH_SIZE`] lines, and
//! the ingest-state boundary advances inside the same transaction as the
//! rows it covers. An error or cancellation rolls back the open batch,
//! leaving the boundary at the last successful commit; re-running re-reads
//! those bytes and the keyed upserts absorb the replay.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use arenalog_store::decks::DeckCard;
use arenalog_store::time::parse_client_timestamp;
use arenalog_store::{
    decks, drafts, event_runs, ingest_state, matches, observations, raw_events,
};
use arenalog_store::{Database, StoreError};

use crate::classifier::{self, Classified};
use crate::envelopes::{
    choose_match_result, fallback_zone_type, is_playable_zone, normalize_phase,
    normalize_win_reason, normalize_zone_type, parse_string_ids, room_event_name,
    BotDraftPickRequest, DeckCardEntry, DraftCompleteRequest, EventClaimPrizeRequest,
    EventJoinRequest, EventSetDeckRequest, GreEnvelope, LogBusinessEvent, OutgoingEnvelope,
    PlayerDraftPickRequest, RoomStateEnvelope,
};
use crate::error::IngestError;
use crate::reader::LogReader;
use crate::stats::ParseStats;

/// Lines per transaction.
const BATCH_SIZE: i64 = 500;

const OBSERVATION_SOURCE: &str = "gre_public_gameobject";

/// Per-log transient correlation state. Rebuilt from scratch whenever the
/// log rotates or a non-resume parse runs; never persisted.
#[derive(Debug, Default)]
struct LogState {
    persona_id: String,
    player_name: String,
    active_match_id: String,
    self_seat_by_match: HashMap<String, i64>,
    turn_by_match: HashMap<String, i64>,
    phase_by_match: HashMap<String, String>,
    zone_type_by_match: HashMap<String, HashMap<i64, String>>,
}

impl LogState {
    fn remember_self_seat(&mut self, match_id: &str, seat_id: i64) {
        let match_id = match_id.trim();
        if match_id.is_empty() || seat_id <= 0 {
            return;
        }
        self.self_seat_by_match.insert(match_id.to_string(), seat_id);
    }

    fn self_seat(&self, match_id: &str) -> i64 {
        self.self_seat_by_match.get(match_id.trim()).copied().unwrap_or(0)
    }

    fn remember_turn(&mut self, match_id: &str, turn_number: i64) {
        let match_id = match_id.trim();
        if match_id.is_empty() || turn_number <= 0 {
            return;
        }
        self.turn_by_match.insert(match_id.to_string(), turn_number);
    }

    fn turn(&self, match_id: &str) -> i64 {
        self.turn_by_match.get(match_id.trim()).copied().unwrap_or(0)
    }

    fn remember_phase(&mut self, match_id: &str, raw_phase: &str) {
        let match_id = match_id.trim();
        let phase = normalize_phase(raw_phase);
        if match_id.is_empty() || phase.is_empty() {
            return;
        }
        self.phase_by_match.insert(match_id.to_string(), phase);
    }

    fn phase(&self, match_id: &str) -> String {
        self.phase_by_match.get(match_id.trim()).cloned().unwrap_or_default()
    }

    fn remember_zone_type(&mut self, match_id: &str, zone_id: i64, raw_type: &str) {
        let match_id = match_id.trim();
        let zone_type = normalize_zone_type(raw_type);
        if match_id.is_empty() || zone_id <= 0 || zone_type.is_empty() {
            return;
        }
        self.zone_type_by_match
            .entry(match_id.to_string())
            .or_default()
            .insert(zone_id, zone_type);
    }

    fn zone_type(&self, match_id: &str, zone_id: i64) -> String {
        if zone_id <= 0 {
            return String::new();
        }
        self.zone_type_by_match
            .get(match_id.trim())
            .and_then(|by_zone| by_zone.get(&zone_id))
            .cloned()
            .unwrap_or_default()
    }
}

pub struct Parser {
    db: Database,
    states: Mutex<HashMap<String, LogState>>,
}

impl Parser {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Run one pass over `log_path`.
    ///
    /// With `resume`, reading starts at the committed boundary; without,
    /// from the top with fresh correlation state. The cancellation token
    /// is honored between lines.
    pub fn parse_file(
        &self,
        log_path: &Path,
        resume: bool,
        cancel: &CancellationToken,
    ) -> Result<ParseStats, IngestError> {
        let started = Instant::now();
        let path_key = log_path.to_string_lossy().into_owned();
        let mut stats = ParseStats::new(&path_key);

        let mut start = ingest_state::IngestState::default();
        let mut reset_state = !resume;
        if resume {
            let saved = self.db.with_conn(|conn| ingest_state::get(conn, &path_key))?;
            if let Some(saved) = saved {
                start = saved;
                if saved.offset == 0 && saved.line_no == 0 {
                    reset_state = true;
                }
            }
        }

        let (mut reader, rotated) = LogReader::open(log_path, start.offset, start.line_no)?;
        if rotated {
            debug!(path = %path_key, saved_offset = start.offset, "log rotated or truncated, restarting from zero");
            reset_state = true;
        }

        let previous = self.states.lock().remove(&path_key);
        let mut state = if reset_state {
            LogState::default()
        } else {
            previous.unwrap_or_default()
        };

        let result: Result<(), IngestError> = self
            .db
            .with_conn(|conn| Ok(self.run(conn, &mut reader, &mut state, &mut stats, &path_key, cancel)))?;
        self.states.lock().insert(path_key, state);
        result?;

        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    fn run(
        &self,
        conn: &Connection,
        reader: &mut LogReader,
        state: &mut LogState,
        stats: &mut ParseStats,
        log_path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let mut tx = conn.unchecked_transaction().map_err(StoreError::from)?;
        let mut lines_since_commit = 0i64;

        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let Some(line) = reader.next_line()? else {
                break;
            };

            stats.lines_read += 1;
            stats.bytes_read += line.byte_len;
            lines_since_commit += 1;

            self.process_line(
                &tx,
                state,
                stats,
                log_path,
                line.line_no,
                line.start_offset,
                line.text.trim(),
            )?;

            if lines_since_commit >= BATCH_SIZE {
                ingest_state::save(&tx, log_path, reader.offset(), reader.line_no())?;
                tx.commit().map_err(StoreError::from)?;
                tx = conn.unchecked_transaction().map_err(StoreError::from)?;
                lines_since_commit = 0;
            }
        }

        ingest_state::save(&tx, log_path, reader.offset(), reader.line_no())?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_line(
        &self,
        conn: &Connection,
        state: &mut LogState,
        stats: &mut ParseStats,
        log_path: &str,
        line_no: i64,
        byte_offset: i64,
        line: &str,
    ) -> Result<(), IngestError> {
        if line.is_empty() {
            return Ok(());
        }

        if state.persona_id.is_empty() {
            if let Some(id) = classifier::sniff_persona_id(line) {
                state.persona_id = id.to_string();
            }
        }
        if state.player_name.is_empty() {
            if let Some(name) = classifier::sniff_screen_name(line) {
                state.player_name = name.to_string();
            }
        }

        match classifier::classify(line) {
            Classified::Outgoing { method, envelope } => {
                self.handle_outgoing(conn, state, stats, log_path, line_no, byte_offset, method, envelope)
            }
            Classified::MethodComplete { method, request_id } => {
                raw_events::insert(
                    conn, log_path, line_no, byte_offset, "method_complete", method, request_id, "",
                )?;
                stats.raw_events_stored += 1;
                Ok(())
            }
            Classified::RoomState => {
                self.handle_room_state(conn, state, stats, log_path, line_no, byte_offset, line)
            }
            Classified::GreState => self.handle_gre(conn, state, line),
            Classified::Noise => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_outgoing(
        &self,
        conn: &Connection,
        state: &mut LogState,
        stats: &mut ParseStats,
        log_path: &str,
        line_no: i64,
        byte_offset: i64,
        method: &str,
        envelope_json: &str,
    ) -> Result<(), IngestError> {
        let Ok(env) = serde_json::from_str::<OutgoingEnvelope>(envelope_json) else {
            raw_events::insert(
                conn, log_path, line_no, byte_offset, "outgoing_unparsed", method, "", "",
            )?;
            stats.raw_events_stored += 1;
            return Ok(());
        };

        let payload = env.request_payload().unwrap_or_default();
        raw_events::insert(
            conn,
            log_path,
            line_no,
            byte_offset,
            "outgoing",
            method,
            env.id.as_deref().unwrap_or(""),
            &payload,
        )?;
        stats.raw_events_stored += 1;

        match method {
            "EventJoin" => {
                let Ok(req) = serde_json::from_str::<EventJoinRequest>(&payload) else {
                    return Ok(());
                };
                if req.event_name.is_empty() {
                    return Ok(());
                }
                event_runs::upsert_join(
                    conn,
                    &req.event_name,
                    &req.entry_currency_type,
                    req.entry_currency_paid,
                    "",
                )?;
            }
            "EventClaimPrize" => {
                let Ok(req) = serde_json::from_str::<EventClaimPrizeRequest>(&payload) else {
                    return Ok(());
                };
                if !req.event_name.is_empty() {
                    event_runs::mark_claimed(conn, &req.event_name, "")?;
                }
            }
            "EventSetDeckV2" => {
                let Ok(req) = serde_json::from_str::<EventSetDeckRequest>(&payload) else {
                    return Ok(());
                };
                if req.summary.deck_id.is_empty() {
                    return Ok(());
                }

                let mut cards = Vec::new();
                let sections: [(&'static str, &[DeckCardEntry]); 4] = [
                    ("main", &req.deck.main_deck),
                    ("sideboard", &req.deck.sideboard),
                    ("command", &req.deck.command_zone),
                    ("companion", &req.deck.companions),
                ];
                for (section, entries) in sections {
                    for entry in entries {
                        if entry.quantity <= 0 {
                            continue;
                        }
                        cards.push(DeckCard {
                            section,
                            card_id: entry.card_id,
                            quantity: entry.quantity,
                        });
                    }
                }

                decks::upsert(
                    conn,
                    &req.summary.deck_id,
                    &req.event_name,
                    &req.summary.name,
                    req.format(),
                    "event_set_deck",
                    req.last_updated(),
                    &cards,
                )?;
                stats.decks_upserted += 1;
            }
            "EventPlayerDraftMakePick" => {
                let Ok(req) = serde_json::from_str::<PlayerDraftPickRequest>(&payload) else {
                    return Ok(());
                };
                if req.draft_id.is_empty() {
                    return Ok(());
                }
                let session = drafts::ensure_session(conn, "", Some(&req.draft_id), false, "")?;
                drafts::insert_pick(conn, session, req.pack, req.pick, &req.grp_ids, &[], "")?;
                stats.draft_picks_added += 1;
            }
            "BotDraftDraftPick" => {
                let Ok(req) = serde_json::from_str::<BotDraftPickRequest>(&payload) else {
                    return Ok(());
                };
                if req.event_name.is_empty() {
                    return Ok(());
                }
                let session = drafts::ensure_session(conn, &req.event_name, None, true, "")?;
                let picked = parse_string_ids(&req.pick_info.card_ids);
                drafts::insert_pick(
                    conn,
                    session,
                    req.pick_info.pack_number,
                    req.pick_info.pick_number,
                    &picked,
                    &[],
                    "",
                )?;
                stats.draft_picks_added += 1;
            }
            "DraftCompleteDraft" => {
                let Ok(req) = serde_json::from_str::<DraftCompleteRequest>(&payload) else {
                    return Ok(());
                };
                let draft_id = (!req.draft_id.trim().is_empty()).then_some(req.draft_id.as_str());
                drafts::complete_session(conn, &req.event_name, draft_id, req.is_bot_draft, "")?;
            }
            "LogBusinessEvents" => {
                let Ok(evt) = serde_json::from_str::<LogBusinessEvent>(&payload) else {
                    return Ok(());
                };
                match evt.event_type {
                    3 => {
                        if evt.match_id.is_empty() {
                            return Ok(());
                        }
                        let event_name = if evt.event_id.is_empty() {
                            evt.event_name.as_str()
                        } else {
                            evt.event_id.as_str()
                        };
                        matches::upsert_start(
                            conn, &evt.match_id, event_name, evt.seat_id, &evt.event_time,
                        )?;
                        state.active_match_id = evt.match_id.trim().to_string();
                        state.remember_self_seat(&evt.match_id, evt.seat_id);
                        let _ = matches::link_to_latest_deck_by_event(
                            conn, &evt.match_id, event_name, "pre_match",
                        );
                        stats.matches_upserted += 1;
                    }
                    4 => {
                        if evt.match_id.is_empty() {
                            return Ok(());
                        }
                        matches::update_end(
                            conn,
                            &evt.match_id,
                            evt.team_id,
                            evt.winning_team_id,
                            evt.turn_count,
                            evt.seconds_count,
                            normalize_win_reason(&evt.winning_reason),
                            &evt.event_time,
                        )?;
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn handle_gre(
        &self,
        conn: &Connection,
        state: &mut LogState,
        line: &str,
    ) -> Result<(), IngestError> {
        let Ok(env) = serde_json::from_str::<GreEnvelope>(line) else {
            return Ok(());
        };
        let Some(event) = env.event else {
            return Ok(());
        };
        let event_ts = parse_client_timestamp(&env.timestamp).unwrap_or_default();

        for msg in &event.messages {
            let Some(game_state) = &msg.game_state else {
                continue;
            };

            let mut match_id = state.active_match_id.trim().to_string();
            if let Some(info) = &game_state.game_info {
                let id = info.match_id.trim();
                if !id.is_empty() {
                    match_id = id.to_string();
                    let mut self_seat = state.self_seat(&match_id);
                    if self_seat <= 0 && msg.system_seat_ids.len() == 1 && msg.system_seat_ids[0] > 0
                    {
                        self_seat = msg.system_seat_ids[0];
                    }
                    matches::upsert_start(conn, &match_id, "", self_seat, &event_ts)?;
                    state.active_match_id = match_id.clone();
                    state.remember_self_seat(&match_id, self_seat);
                }
            }
            if match_id.is_empty() {
                continue;
            }

            let game_number = game_state
                .game_info
                .as_ref()
                .map(|info| info.game_number)
                .filter(|n| *n > 0)
                .unwrap_or(1);

            if let Some(turn) = &game_state.turn_info {
                state.remember_turn(&match_id, turn.turn_number);
                state.remember_phase(&match_id, &turn.phase);
            }
            for zone in &game_state.zones {
                state.remember_zone_type(&match_id, zone.zone_id, &zone.zone_type);
            }

            let mut self_seat = state.self_seat(&match_id);
            if self_seat <= 0 && msg.system_seat_ids.len() == 1 && msg.system_seat_ids[0] > 0 {
                self_seat = msg.system_seat_ids[0];
                state.remember_self_seat(&match_id, self_seat);
            }
            let turn_number = state.turn(&match_id);
            let phase = state.phase(&match_id);

            for obj in &game_state.game_objects {
                if !obj.is_public_card() {
                    continue;
                }

                if !obj.is_token {
                    let mut zone_type = state.zone_type(&match_id, obj.zone_id);
                    if zone_type.is_empty() {
                        zone_type = fallback_zone_type(obj.zone_id).to_string();
                    }
                    if is_playable_zone(&zone_type) {
                        observations::upsert_card_play(
                            conn,
                            &match_id,
                            game_number,
                            obj.instance_id,
                            obj.grp_id,
                            obj.owner_seat_id,
                            turn_number,
                            &phase,
                            &zone_type,
                            &event_ts,
                            OBSERVATION_SOURCE,
                        )?;
                    }
                }

                if self_seat <= 0 || obj.is_token || obj.owner_seat_id == self_seat {
                    continue;
                }
                observations::upsert_opponent_card_instance(
                    conn,
                    &match_id,
                    game_number,
                    obj.instance_id,
                    obj.grp_id,
                    &event_ts,
                    OBSERVATION_SOURCE,
                )?;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_room_state(
        &self,
        conn: &Connection,
        state: &mut LogState,
        stats: &mut ParseStats,
        log_path: &str,
        line_no: i64,
        byte_offset: i64,
        line: &str,
    ) -> Result<(), IngestError> {
        let Ok(env) = serde_json::from_str::<RoomStateEnvelope>(line) else {
            return Ok(());
        };
        let Some(info) = env.changed.and_then(|changed| changed.game_room_info) else {
            return Ok(());
        };
        let Some(config) = &info.game_room_config else {
            return Ok(());
        };
        if config.match_id.is_empty() {
            return Ok(());
        }

        let players = if config.reserved_players.is_empty() {
            &info.players
        } else {
            &config.reserved_players
        };

        let mut event_name = room_event_name(&config.reserved_players).to_string();
        if event_name.is_empty() {
            event_name = room_event_name(players).to_string();
        }
        let match_ts = parse_client_timestamp(&env.timestamp).unwrap_or_default();

        let mut self_seen = false;
        let mut self_seat_id = 0i64;
        let mut self_team_id = 0i64;
        let mut opponent_name = String::new();
        let mut opponent_user_id = String::new();
        let persona_id = state.persona_id.trim().to_string();

        for player in players {
            let player_user_id = player.user_id.trim();
            let player_name = player.player_name.trim();

            if !persona_id.is_empty() && player_user_id == persona_id {
                self_seen = true;
                if player.system_seat_id > 0 {
                    self_seat_id = player.system_seat_id;
                }
                if player.team_id > 0 {
                    self_team_id = player.team_id;
                }
                if state.player_name.is_empty() && !player_name.is_empty() {
                    state.player_name = player_name.to_string();
                }
                continue;
            }
            if opponent_name.is_empty() {
                // Never record self as the opponent by display name.
                if !state.player_name.is_empty()
                    && player_name.eq_ignore_ascii_case(state.player_name.trim())
                {
                    continue;
                }
                opponent_name = player_name.to_string();
                opponent_user_id = player_user_id.to_string();
            }
        }

        matches::upsert_start(conn, &config.match_id, &event_name, self_seat_id, &match_ts)?;
        state.active_match_id = config.match_id.trim().to_string();
        state.remember_self_seat(&config.match_id, self_seat_id);
        if !event_name.is_empty() {
            let _ = matches::link_to_latest_deck_by_event(
                conn, &config.match_id, &event_name, "room_state",
            );
        }

        if self_seen && (!opponent_name.trim().is_empty() || !opponent_user_id.trim().is_empty()) {
            matches::update_opponent(conn, &config.match_id, &opponent_name, &opponent_user_id)?;
        }

        if info
            .state_type
            .trim()
            .eq_ignore_ascii_case("MatchGameRoomStateType_MatchCompleted")
            && self_team_id > 0
        {
            if let Some(final_result) = &info.final_match_result {
                let (winning_team_id, reason) = choose_match_result(&final_result.result_list);
                if winning_team_id > 0 {
                    matches::update_end(
                        conn,
                        &config.match_id,
                        self_team_id,
                        winning_team_id,
                        0,
                        0,
                        &reason,
                        &match_ts,
                    )?;
                }
            }
        }

        raw_events::insert(
            conn,
            log_path,
            line_no,
            byte_offset,
            "room_state",
            "matchGameRoomStateChangedEvent",
            "",
            "",
        )?;
        stats.raw_events_stored += 1;
        stats.matches_upserted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_state_ignores_empty_keys_and_nonpositive_values() {
        let mut state = LogState::default();
        state.remember_self_seat("", 2);
        state.remember_self_seat("m1", 0);
        state.remember_turn("m1", -1);
        state.remember_phase("m1", "  ");
        state.remember_zone_type("m1", 0, "ZoneType_Hand");

        assert_eq!(state.self_seat("m1"), 0);
        assert_eq!(state.turn("m1"), 0);
        assert_eq!(state.phase("m1"), "");
        assert_eq!(state.zone_type("m1", 0), "");
    }

    #[test]
    fn log_state_remembers_per_match() {
        let mut state = LogState::default();
        state.remember_self_seat(" m1 ", 2);
        state.remember_turn("m1", 7);
        state.remember_phase("m1", "Phase_Main2");
        state.remember_zone_type("m1", 28, "ZoneType_Battlefield");
        state.remember_zone_type("m2", 28, "ZoneType_Hand");

        assert_eq!(state.self_seat("m1"), 2);
        assert_eq!(state.turn("m1"), 7);
        assert_eq!(state.phase("m1"), "main2");
        assert_eq!(state.zone_type("m1", 28), "battlefield");
        assert_eq!(state.zone_type("m2", 28), "hand");
        assert_eq!(state.self_seat("m2"), 0);
    }
}
