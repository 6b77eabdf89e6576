/// SQL DDL for the arenalog database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 2;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_state (
    log_path TEXT PRIMARY KEY,
    byte_offset INTEGER NOT NULL,
    line_no INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events_raw (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_path TEXT NOT NULL,
    line_no INTEGER NOT NULL,
    byte_offset INTEGER NOT NULL,
    kind TEXT NOT NULL,
    method_name TEXT,
    request_id TEXT,
    payload_json TEXT,
    raw_text TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name TEXT NOT NULL UNIQUE,
    event_type TEXT,
    entry_currency_type TEXT,
    entry_currency_paid INTEGER,
    status TEXT NOT NULL DEFAULT 'active',
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    ended_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arena_deck_id TEXT NOT NULL UNIQUE,
    event_name TEXT,
    name TEXT,
    format TEXT,
    source TEXT,
    last_updated TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deck_cards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    deck_id INTEGER NOT NULL,
    section TEXT NOT NULL,
    card_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    FOREIGN KEY(deck_id) REFERENCES decks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arena_match_id TEXT NOT NULL UNIQUE,
    event_name TEXT,
    player_seat_id INTEGER,
    opponent_name TEXT,
    opponent_user_id TEXT,
    result TEXT NOT NULL DEFAULT 'unknown',
    win_reason TEXT,
    turn_count INTEGER,
    seconds_count INTEGER,
    started_at TEXT,
    ended_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS match_decks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id INTEGER NOT NULL,
    deck_id INTEGER NOT NULL,
    snapshot_reason TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(match_id, deck_id),
    FOREIGN KEY(match_id) REFERENCES matches(id) ON DELETE CASCADE,
    FOREIGN KEY(deck_id) REFERENCES decks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS draft_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name TEXT,
    draft_id TEXT,
    is_bot_draft INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(draft_id, is_bot_draft)
);

CREATE TABLE IF NOT EXISTS draft_picks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    draft_session_id INTEGER NOT NULL,
    pack_number INTEGER NOT NULL,
    pick_number INTEGER NOT NULL,
    picked_card_ids TEXT NOT NULL,
    pack_card_ids TEXT,
    pick_ts TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(draft_session_id, pack_number, pick_number),
    FOREIGN KEY(draft_session_id) REFERENCES draft_sessions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS match_card_plays (
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

CREATE TABLE IF NOT EXISTS match_opponent_card_instances (
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

CREATE TABLE IF NOT EXISTS card_catalog (
    card_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_raw_kind ON events_raw(kind);
CREATE INDEX IF NOT EXISTS idx_events_raw_method ON events_raw(method_name);
CREATE INDEX IF NOT EXISTS idx_events_raw_log_line ON events_raw(log_path, line_no);
CREATE INDEX IF NOT EXISTS idx_event_runs_status ON event_runs(status);
CREATE INDEX IF NOT EXISTS idx_deck_cards_deck_id ON deck_cards(deck_id);
CREATE INDEX IF NOT EXISTS idx_matches_event_name ON matches(event_name);
CREATE INDEX IF NOT EXISTS idx_matches_started_at ON matches(started_at);
CREATE INDEX IF NOT EXISTS idx_match_decks_deck_id ON match_decks(deck_id);
CREATE INDEX IF NOT EXISTS idx_draft_sessions_event ON draft_sessions(event_name, is_bot_draft);
CREATE INDEX IF NOT EXISTS idx_draft_picks_session ON draft_picks(draft_session_id, pack_number, pick_number);
CREATE INDEX IF NOT EXISTS idx_match_card_plays_match_id ON match_card_plays(match_id);
CREATE INDEX IF NOT EXISTS idx_match_card_plays_card_id ON match_card_plays(card_id);
CREATE INDEX IF NOT EXISTS idx_match_card_plays_turn_order ON match_card_plays(match_id, turn_number, played_at, id);
CREATE INDEX IF NOT EXISTS idx_match_opponent_cards_match_id ON match_opponent_card_instances(match_id);
CREATE INDEX IF NOT EXISTS idx_match_opponent_cards_card_id ON match_opponent_card_instances(card_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
