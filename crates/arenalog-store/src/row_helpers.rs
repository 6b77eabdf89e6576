use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// A string bind that stores NULL for empty or whitespace-only values,
/// so COALESCE-style upserts never clobber a present value with "".
#[derive(Clone, Copy, Debug)]
pub struct NullIfEmpty<'a>(pub &'a str);

impl ToSql for NullIfEmpty<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            Ok(ToSqlOutput::from(rusqlite::types::Null))
        } else {
            Ok(ToSqlOutput::from(trimmed))
        }
    }
}

/// An integer bind that stores NULL for non-positive values. The client
/// uses 0 as "unset" for seat ids, team ids, and currency amounts.
#[derive(Clone, Copy, Debug)]
pub struct PositiveOrNull(pub i64);

impl ToSql for PositiveOrNull {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        if self.0 <= 0 {
            Ok(ToSqlOutput::from(rusqlite::types::Null))
        } else {
            Ok(ToSqlOutput::from(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (s TEXT, n INTEGER)").unwrap();
        conn
    }

    #[test]
    fn null_if_empty_stores_null() {
        let conn = conn();
        conn.execute(
            "INSERT INTO t (s, n) VALUES (?1, ?2)",
            rusqlite::params![NullIfEmpty("   "), PositiveOrNull(0)],
        )
        .unwrap();
        let (s, n): (Option<String>, Option<i64>) = conn
            .query_row("SELECT s, n FROM t", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert!(s.is_none());
        assert!(n.is_none());
    }

    #[test]
    fn null_if_empty_trims_and_stores_value() {
        let conn = conn();
        conn.execute(
            "INSERT INTO t (s, n) VALUES (?1, ?2)",
            rusqlite::params![NullIfEmpty("  QuickDraft_FIN  "), PositiveOrNull(2)],
        )
        .unwrap();
        let (s, n): (String, i64) = conn
            .query_row("SELECT s, n FROM t", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!(s, "QuickDraft_FIN");
        assert_eq!(n, 2);
    }

    #[test]
    fn negative_ints_store_null() {
        let conn = conn();
        conn.execute(
            "INSERT INTO t (s, n) VALUES (NULL, ?1)",
            rusqlite::params![PositiveOrNull(-5)],
        )
        .unwrap();
        let n: Option<i64> = conn.query_row("SELECT n FROM t", [], |row| row.get(0)).unwrap();
        assert!(n.is_none());
    }
}
