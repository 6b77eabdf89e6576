//! Append-only audit of classified log lines. Rows are never mutated.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::row_helpers::NullIfEmpty;
use crate::time::now_utc;

/// Insert one raw event row. `payload` is the already-unwrapped request
/// JSON for outgoing lines, empty otherwise.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    log_path: &str,
    line_no: i64,
    byte_offset: i64,
    kind: &str,
    method: &str,
    request_id: &str,
    payload: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO events_raw (
             log_path, line_no, byte_offset, kind, method_name, request_id, payload_json, raw_text, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
        rusqlite::params![
            log_path,
            line_no,
            byte_offset,
            kind,
            NullIfEmpty(method),
            NullIfEmpty(request_id),
            NullIfEmpty(payload),
            now_utc(),
        ],
    )?;
    Ok(())
}
