use arenalog_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,

    #[error("no client logs found under the default locations; pass --log explicitly")]
    NoDefaultLogs,

    #[error("log path not found: {0}")]
    LogNotFound(String),
}

impl IngestError {
    /// Whether this error is an orderly shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
