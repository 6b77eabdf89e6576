#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },
}

impl StoreError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::Migration(_) => "migration",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::CorruptRow { .. } => "corrupt_row",
        }
    }
}
