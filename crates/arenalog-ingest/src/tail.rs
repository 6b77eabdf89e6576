//! Polling tail driver: one resume parse per tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::pipeline::Parser;

#[derive(Clone, Debug)]
pub struct TailOptions {
    pub interval: Duration,
    /// Log idle ticks too.
    pub verbose: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            verbose: false,
        }
    }
}

/// Tail `log_path` until the token is cancelled.
///
/// A tick that fails logs and retries next tick; only cancellation ends
/// the loop. The parse itself honors the token between lines, so shutdown
/// does not wait for a large backlog.
pub async fn run(
    parser: Arc<Parser>,
    log_path: PathBuf,
    options: TailOptions,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    info!(
        path = %log_path.display(),
        interval_ms = options.interval.as_millis() as u64,
        "tailing"
    );

    loop {
        let tick_parser = Arc::clone(&parser);
        let tick_path = log_path.clone();
        let tick_cancel = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            tick_parser.parse_file(&tick_path, true, &tick_cancel)
        })
        .await;

        match outcome {
            Ok(Ok(stats)) => {
                if stats.has_activity() {
                    info!(
                        lines = stats.lines_read,
                        bytes = stats.bytes_read,
                        raw_events = stats.raw_events_stored,
                        matches = stats.matches_upserted,
                        decks = stats.decks_upserted,
                        draft_picks = stats.draft_picks_added,
                        elapsed_ms = stats.elapsed.as_millis() as u64,
                        "tail activity"
                    );
                } else if options.verbose {
                    info!("tail idle: no new lines");
                }
            }
            Ok(Err(err)) if err.is_cancelled() => return Ok(()),
            Ok(Err(err)) => warn!(error = %err, "tail parse error"),
            Err(join_err) => warn!(error = %join_err, "tail task failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
}
