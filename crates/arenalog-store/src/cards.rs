//! Card-id → display-name catalog, written only by the enrichment layer.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::StoreError;
use crate::time::now_utc;

/// Look up cached names for the given card ids. Missing ids are simply
/// absent from the result.
pub fn lookup_names(
    conn: &Connection,
    card_ids: &[i64],
) -> Result<HashMap<i64, String>, StoreError> {
    let mut out = HashMap::with_capacity(card_ids.len());
    if card_ids.is_empty() {
        return Ok(out);
    }

    let placeholders = vec!["?"; card_ids.len()].join(",");
    let mut stmt = conn.prepare(&format!(
        "SELECT card_id, name FROM card_catalog WHERE card_id IN ({placeholders})"
    ))?;
    let params: Vec<&dyn rusqlite::types::ToSql> =
        card_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let mut rows = stmt.query(params.as_slice())?;
    while let Some(row) = rows.next()? {
        let card_id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        out.insert(card_id, name);
    }
    Ok(out)
}

/// Cache resolved names. Re-resolution overwrites.
pub fn upsert_names(conn: &Connection, names: &HashMap<i64, String>) -> Result<(), StoreError> {
    if names.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare(
        "INSERT INTO card_catalog (card_id, name, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(card_id) DO UPDATE SET
             name = excluded.name,
             updated_at = excluded.updated_at",
    )?;
    let now = now_utc();
    for (card_id, name) in names {
        let name = name.trim();
        if *card_id <= 0 || name.is_empty() {
            continue;
        }
        stmt.execute(rusqlite::params![card_id, name, now])?;
    }
    Ok(())
}
