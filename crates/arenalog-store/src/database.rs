use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;
use crate::{migrations, schema};

/// Thread-safe SQLite connection wrapper.
/// Uses parking_lot::Mutex for synchronous access (rusqlite is not Send).
///
/// The ingest pipeline is the single writer; the API opens its own
/// `Database` for reads.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the given path, apply pragmas and the
    /// schema, and run any pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(&conn)?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Migration(format!("pragmas: {e}")))?;
        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| StoreError::Migration(format!("schema: {e}")))?;
        migrations::run(conn)?;
        Ok(())
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));
    }

    #[test]
    fn tables_created() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let tables: Vec<String> = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            for table in [
                "ingest_state",
                "events_raw",
                "event_runs",
                "decks",
                "deck_cards",
                "matches",
                "match_decks",
                "draft_sessions",
                "draft_picks",
                "match_card_plays",
                "match_opponent_card_instances",
                "card_catalog",
                "schema_version",
            ] {
                assert!(tables.contains(&table.to_string()), "missing table: {table}");
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        // Reopening must be idempotent.
        let db2 = Database::open(&path).unwrap();
        drop(db);
        drop(db2);
    }

    #[test]
    fn foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(fk, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn wal_mode_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("wal.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(mode, "wal");
            Ok(())
        })
        .unwrap();
    }
}
