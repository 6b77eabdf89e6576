//! Committed resume boundary, one row per log path.
//!
//! `save` must run inside the same transaction as the writes it commits;
//! the pipeline only advances the boundary on a successful commit.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::time::now_utc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestState {
    pub offset: i64,
    pub line_no: i64,
}

/// Read the saved boundary for a log path, if any.
pub fn get(conn: &Connection, log_path: &str) -> Result<Option<IngestState>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT byte_offset, line_no FROM ingest_state WHERE log_path = ?1",
    )?;
    let mut rows = stmt.query([log_path])?;
    match rows.next()? {
        Some(row) => Ok(Some(IngestState {
            offset: row.get(0)?,
            line_no: row.get(1)?,
        })),
        None => Ok(None),
    }
}

/// Save the boundary. Caller must be inside the batch transaction.
pub fn save(
    conn: &Connection,
    log_path: &str,
    offset: i64,
    line_no: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO ingest_state (log_path, byte_offset, line_no, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(log_path) DO UPDATE SET
             byte_offset = excluded.byte_offset,
             line_no = excluded.line_no,
             updated_at = excluded.updated_at",
        rusqlite::params![log_path, offset, line_no, now_utc()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn missing_path_is_none() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(get(conn, "/tmp/Player.log").unwrap().is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn save_then_get() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            save(conn, "/tmp/Player.log", 1024, 17)?;
            let state = get(conn, "/tmp/Player.log")?.unwrap();
            assert_eq!(state, IngestState { offset: 1024, line_no: 17 });
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn save_overwrites_previous_boundary() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            save(conn, "/tmp/Player.log", 1024, 17)?;
            save(conn, "/tmp/Player.log", 4096, 60)?;
            let state = get(conn, "/tmp/Player.log")?.unwrap();
            assert_eq!(state.offset, 4096);
            assert_eq!(state.line_no, 60);

            let rows: i64 = conn.query_row("SELECT COUNT(*) FROM ingest_state", [], |r| r.get(0))?;
            assert_eq!(rows, 1);
            Ok(())
        })
        .unwrap();
    }
}
