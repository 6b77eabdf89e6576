//! End-to-end pipeline scenarios over real files: resume, rotation,
//! idempotent re-parse, and correlation across envelope kinds.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use arenalog_ingest::Parser;
use arenalog_store::{queries, Database};

fn write_lines(path: &Path, lines: &[String]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn append_lines(path: &Path, lines: &[String]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn outgoing(method: &str, request: serde_json::Value) -> String {
    // The client string-encodes the request document inside the envelope.
    let envelope = serde_json::json!({"id": "1", "request": request.to_string()});
    format!("[UnityCrossThreadLogger]==> {method} {envelope}")
}

fn identity_line() -> String {
    r#"{"clientId":"self-user","screenName":"Self"}"#.to_string()
}

fn room_state_line(match_id: &str, event_id: &str, ts: &str) -> String {
    serde_json::json!({
        "timestamp": ts,
        "matchGameRoomStateChangedEvent": {
            "gameRoomInfo": {
                "gameRoomConfig": {
                    "reservedPlayers": [
                        {"userId": "opp-user", "playerName": "Opp", "systemSeatId": 1, "teamId": 1, "eventId": event_id},
                        {"userId": "self-user", "playerName": "Self", "systemSeatId": 2, "teamId": 2, "eventId": event_id}
                    ],
                    "matchId": match_id
                },
                "stateType": "MatchGameRoomStateType_Playing"
            }
        }
    })
    .to_string()
}

fn gre_line(match_id: Option<&str>, game_number: i64, instance_id: i64, grp_id: i64, ts: &str) -> String {
    let mut game_state = serde_json::json!({
        "turnInfo": {"phase": "Phase_Main1", "turnNumber": 1},
        "zones": [{"zoneId": 28, "type": "ZoneType_Battlefield"}],
        "gameObjects": [{
            "instanceId": instance_id,
            "grpId": grp_id,
            "type": "GameObjectType_Card",
            "zoneId": 28,
            "visibility": "Visibility_Public",
            "ownerSeatId": 1
        }]
    });
    if let Some(match_id) = match_id {
        game_state["gameInfo"] = serde_json::json!({"matchID": match_id, "gameNumber": game_number});
    }
    serde_json::json!({
        "timestamp": ts,
        "greToClientEvent": {
            "greToClientMessages": [{
                "type": "GREMessageType_GameStateMessage",
                "systemSeatIds": [2],
                "gameStateMessage": game_state
            }]
        }
    })
    .to_string()
}

fn count(db: &Database, sql: &str) -> i64 {
    db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
        .unwrap()
}

fn parse(parser: &Parser, path: &Path, resume: bool) -> arenalog_ingest::ParseStats {
    parser
        .parse_file(path, resume, &CancellationToken::new())
        .unwrap()
}

#[test]
fn resume_across_append_accumulates_observations() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            identity_line(),
            room_state_line("match-1", "Traditional_Ladder", "1772330782273"),
            gre_line(Some("match-1"), 1, 101, 5001, "1772330782309"),
        ],
    );
    parse(&parser, &log, true);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM matches"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM match_card_plays"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM match_opponent_card_instances"), 1);

    // Second game-state message arrives later; resume picks it up without
    // re-processing committed bytes.
    append_lines(&log, &[gre_line(None, 0, 102, 5002, "1772330782310")]);
    let stats = parse(&parser, &log, true);
    assert_eq!(stats.lines_read, 1);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM match_card_plays"), 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM match_opponent_card_instances"), 2);
}

#[test]
fn fully_parsed_file_resumes_to_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            identity_line(),
            outgoing("EventJoin", serde_json::json!({"EventName": "QuickDraft_FIN_20250619"})),
            room_state_line("match-1", "QuickDraft_FIN_20250619", "1772330782273"),
        ],
    );
    parse(&parser, &log, true);

    let raw_events = count(&db, "SELECT COUNT(*) FROM events_raw");
    let (offset, line_no): (i64, i64) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT byte_offset, line_no FROM ingest_state",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();

    let stats = parse(&parser, &log, true);
    assert_eq!(stats.lines_read, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM events_raw"), raw_events);

    let (offset_after, line_after): (i64, i64) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT byte_offset, line_no FROM ingest_state",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!((offset, line_no), (offset_after, line_after));
}

#[test]
fn incremental_prefixes_match_single_backfill() {
    let all_lines = vec![
        identity_line(),
        outgoing("EventJoin", serde_json::json!({"EventName": "QuickDraft_FIN_20250619", "EntryCurrencyType": "Gems", "EntryCurrencyPaid": 750})),
        outgoing(
            "EventSetDeckV2",
            serde_json::json!({
                "EventName": "QuickDraft_FIN_20250619",
                "Summary": {"DeckId": "D1", "Name": "Draft Deck", "Attributes": [{"name": "Format", "value": "Limited"}]},
                "Deck": {"MainDeck": [{"cardId": 5001, "quantity": 2}], "Sideboard": [{"cardId": 5002, "quantity": 1}]}
            }),
        ),
        room_state_line("match-1", "QuickDraft_FIN_20250619", "1772330782273"),
        gre_line(Some("match-1"), 1, 101, 5001, "1772330782309"),
        gre_line(Some("match-1"), 2, 101, 5001, "1772330782310"),
    ];

    // Incremental: replay prefix by prefix with resume parses.
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db_incremental = Database::open(&dir.path().join("incremental.db")).unwrap();
    let parser = Parser::new(db_incremental.clone());
    for end in 1..=all_lines.len() {
        write_lines(&log, &all_lines[..end]);
        parse(&parser, &log, true);
    }

    // Single backfill over the concatenated file.
    let db_single = Database::open(&dir.path().join("single.db")).unwrap();
    let single_parser = Parser::new(db_single.clone());
    write_lines(&log, &all_lines);
    parse(&single_parser, &log, false);

    for table in [
        "events_raw",
        "event_runs",
        "decks",
        "deck_cards",
        "matches",
        "match_decks",
        "match_card_plays",
        "match_opponent_card_instances",
    ] {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        assert_eq!(
            count(&db_incremental, &sql),
            count(&db_single, &sql),
            "row count diverged for {table}"
        );
    }
}

#[test]
fn same_instance_across_games_is_two_rows_with_max_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            identity_line(),
            room_state_line("match-bo3", "Traditional_Ladder", "1772330782273"),
            gre_line(Some("match-bo3"), 1, 101, 5001, "1772330782309"),
            gre_line(Some("match-bo3"), 2, 101, 5001, "1772330782310"),
        ],
    );
    parse(&parser, &log, false);

    let detail = db
        .with_conn(|conn| queries::get_match_detail(conn, 1))
        .unwrap();
    assert_eq!(detail.card_plays.len(), 2);
    assert_eq!(detail.card_plays[0].game_number, Some(1));
    assert_eq!(detail.card_plays[1].game_number, Some(2));

    assert_eq!(detail.opponent_observed_cards.len(), 1);
    assert_eq!(detail.opponent_observed_cards[0].card_id, 5001);
    assert_eq!(detail.opponent_observed_cards[0].quantity, 1);
}

#[test]
fn compact_event_alias_reuses_existing_run() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            identity_line(),
            outgoing("EventJoin", serde_json::json!({"EventName": "QuickDraft_FIN_20250619"})),
            room_state_line("match-1", "FIN_Quick_Draft", "1772330782273"),
        ],
    );
    parse(&parser, &log, true);

    let event: String = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT event_name FROM matches WHERE arena_match_id = 'match-1'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(event, "QuickDraft_FIN_20250619");
    assert_eq!(count(&db, "SELECT COUNT(*) FROM event_runs"), 1);
}

#[test]
fn deck_resubmission_replaces_cards() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[outgoing(
            "EventSetDeckV2",
            serde_json::json!({
                "Summary": {"DeckId": "D1"},
                "Deck": {"MainDeck": [{"cardId": 1, "quantity": 4}, {"cardId": 2, "quantity": 3}]}
            }),
        )],
    );
    parse(&parser, &log, true);

    append_lines(
        &log,
        &[outgoing(
            "EventSetDeckV2",
            serde_json::json!({
                "Summary": {"DeckId": "D1"},
                "Deck": {"MainDeck": [{"cardId": 2, "quantity": 4}]}
            }),
        )],
    );
    parse(&parser, &log, true);

    let rows: Vec<(String, i64, i64)> = db
        .with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dc.section, dc.card_id, dc.quantity
                 FROM deck_cards dc
                 JOIN decks d ON d.id = dc.deck_id
                 WHERE d.arena_deck_id = 'D1'",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap();
    assert_eq!(rows, vec![("main".to_string(), 2, 4)]);
}

#[test]
fn rotation_restarts_from_zero_with_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    // Parse a log well past 40 bytes.
    write_lines(
        &log,
        &[
            identity_line(),
            room_state_line("match-1", "Traditional_Ladder", "1772330782273"),
        ],
    );
    parse(&parser, &log, true);
    let (offset_before, _): (i64, i64) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT byte_offset, line_no FROM ingest_state",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();
    assert!(offset_before > 40);

    // Replace with a shorter file holding a single EventJoin.
    write_lines(
        &log,
        &[outgoing("EventJoin", serde_json::json!({"EventName": "E1"}))],
    );
    let stats = parse(&parser, &log, true);
    assert_eq!(stats.lines_read, 1);

    let status: String = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT status FROM event_runs WHERE event_name = 'E1'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(status, "active");
}

#[test]
fn business_events_bump_event_record_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            identity_line(),
            outgoing("EventJoin", serde_json::json!({"EventName": "QuickDraft_FIN_20250619"})),
            outgoing(
                "LogBusinessEvents",
                serde_json::json!({
                    "EventType": 3,
                    "EventId": "QuickDraft_FIN_20250619",
                    "MatchId": "match-1",
                    "SeatId": 2,
                    "EventTime": "2026-01-01T00:00:00Z"
                }),
            ),
            outgoing(
                "LogBusinessEvents",
                serde_json::json!({
                    "EventType": 4,
                    "MatchId": "match-1",
                    "TeamId": 2,
                    "WinningTeamId": 2,
                    "WinningReason": "WinningReason_Concede",
                    "TurnCount": 9,
                    "SecondsCount": 540,
                    "EventTime": "2026-01-01T00:20:00Z"
                }),
            ),
        ],
    );
    parse(&parser, &log, true);

    let (wins, losses): (i64, i64) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT wins, losses FROM event_runs WHERE event_name = 'QuickDraft_FIN_20250619'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!((wins, losses), (1, 0));

    let (result, reason, turns): (String, String, i64) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT result, win_reason, turn_count FROM matches WHERE arena_match_id = 'match-1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?)
        })
        .unwrap();
    assert_eq!(result, "win");
    assert_eq!(reason, "Concede");
    assert_eq!(turns, 9);

    // Re-parsing the same bytes from scratch does not double count.
    parse(&parser, &log, false);
    let wins_after: i64 = count(
        &db,
        "SELECT wins FROM event_runs WHERE event_name = 'QuickDraft_FIN_20250619'",
    );
    assert_eq!(wins_after, 1);
}

#[test]
fn malformed_envelope_is_stored_unparsed_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            "[UnityCrossThreadLogger]==> EventJoin {not json at all".to_string(),
            outgoing("EventJoin", serde_json::json!({"EventName": "E1"})),
        ],
    );
    let stats = parse(&parser, &log, true);
    assert_eq!(stats.lines_read, 2);
    assert_eq!(stats.raw_events_stored, 2);

    let kinds: Vec<String> = db
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT kind FROM events_raw ORDER BY line_no")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap();
    assert_eq!(kinds, vec!["outgoing_unparsed".to_string(), "outgoing".to_string()]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM event_runs"), 1);
}

#[test]
fn draft_picks_flow_into_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Player.log");
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let parser = Parser::new(db.clone());

    write_lines(
        &log,
        &[
            outgoing(
                "BotDraftDraftPick",
                serde_json::json!({
                    "EventName": "QuickDraft_FIN_20250619",
                    "PickInfo": {"CardIds": ["5001", "bogus", "5002"], "PackNumber": 1, "PickNumber": 1}
                }),
            ),
            outgoing(
                "BotDraftDraftPick",
                serde_json::json!({
                    "EventName": "QuickDraft_FIN_20250619",
                    "PickInfo": {"CardIds": ["5003"], "PackNumber": 1, "PickNumber": 2}
                }),
            ),
            outgoing(
                "DraftCompleteDraft",
                serde_json::json!({"EventName": "QuickDraft_FIN_20250619", "IsBotDraft": true}),
            ),
        ],
    );
    let stats = parse(&parser, &log, true);
    assert_eq!(stats.draft_picks_added, 2);

    let sessions = db.with_conn(queries::list_draft_sessions).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].picks, 2);
    assert!(!sessions[0].completed_at.is_empty());

    let picks = db
        .with_conn(|conn| queries::list_draft_picks(conn, sessions[0].id))
        .unwrap();
    // The non-numeric id is dropped, order kept.
    assert_eq!(picks[0].picked_card_ids, "[5001,5002]");
    assert_eq!(picks[1].picked_card_ids, "[5003]");
}
