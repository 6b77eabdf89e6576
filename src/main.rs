use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser as CliParser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use arenalog_ingest::stats::ParseStats;
use arenalog_ingest::{paths, tail, Parser};
use arenalog_server::ServerConfig;
use arenalog_store::Database;
use arenalog_telemetry::TelemetryConfig;

#[derive(CliParser, Debug)]
#[command(name = "arenalog", about = "Local MTG Arena log tracker", version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot backfill over historical log files.
    Parse {
        /// SQLite database path.
        #[arg(long, default_value = "data/arenalog.db")]
        db: PathBuf,
        /// Client log path; defaults to the platform-standard locations.
        #[arg(long)]
        log: Option<PathBuf>,
        /// When --log is omitted, parse the rotated previous log first.
        #[arg(
            long,
            default_value_t = true,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_missing_value = "true"
        )]
        include_prev: bool,
        /// Resume from the committed offset.
        #[arg(
            long,
            default_value_t = true,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_missing_value = "true"
        )]
        resume: bool,
    },
    /// Poll an actively-written log.
    Tail {
        #[arg(long, default_value = "data/arenalog.db")]
        db: PathBuf,
        #[arg(long)]
        log: Option<PathBuf>,
        /// Poll interval (e.g. 2s, 500ms, 90).
        #[arg(long, default_value = "2s", value_parser = parse_duration)]
        interval: Duration,
        /// Log idle polls too.
        #[arg(long, action = ArgAction::SetTrue)]
        verbose: bool,
    },
    /// Serve the read API and frontend.
    Serve {
        #[arg(long, default_value = "data/arenalog.db")]
        db: PathBuf,
        /// HTTP listen address.
        #[arg(long, default_value = ":8080")]
        addr: String,
        /// Path to the built frontend dist.
        #[arg(long)]
        web_dist: Option<PathBuf>,
    },
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {raw}"))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        other => Err(format!("unknown duration unit: {other}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    arenalog_telemetry::init_telemetry(&TelemetryConfig::with_level(&cli.log_level));

    let cancel = CancellationToken::new();
    spawn_shutdown_watcher(cancel.clone());

    let result = match cli.command {
        Command::Parse { db, log, include_prev, resume } => {
            run_parse(db, log, include_prev, resume, cancel).await
        }
        Command::Tail { db, log, interval, verbose } => {
            run_tail(db, log, interval, verbose, cancel).await
        }
        Command::Serve { db, addr, web_dist } => run_serve(db, addr, web_dist, cancel).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::from(2)
        }
    }
}

fn spawn_shutdown_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

type RunError = Box<dyn std::error::Error + Send + Sync>;

async fn run_parse(
    db_path: PathBuf,
    log: Option<PathBuf>,
    include_prev: bool,
    resume: bool,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    let db = Database::open(&db_path)?;
    let parser = Arc::new(Parser::new(db));
    let log_paths = paths::resolve_backfill_paths(log, include_prev)?;

    let mut totals = ParseStats::default();
    for path in &log_paths {
        let file_parser = Arc::clone(&parser);
        let file_path = path.clone();
        let file_cancel = cancel.clone();
        let stats = tokio::task::spawn_blocking(move || {
            file_parser.parse_file(&file_path, resume, &file_cancel)
        })
        .await??;

        info!(
            path = %path.display(),
            lines = stats.lines_read,
            bytes = stats.bytes_read,
            raw_events = stats.raw_events_stored,
            matches = stats.matches_upserted,
            decks = stats.decks_upserted,
            draft_picks = stats.draft_picks_added,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "parsed"
        );
        totals.add(&stats);
    }

    info!(
        files = log_paths.len(),
        lines = totals.lines_read,
        bytes = totals.bytes_read,
        raw_events = totals.raw_events_stored,
        matches = totals.matches_upserted,
        decks = totals.decks_upserted,
        draft_picks = totals.draft_picks_added,
        elapsed_ms = totals.elapsed.as_millis() as u64,
        "parse complete"
    );
    Ok(())
}

async fn run_tail(
    db_path: PathBuf,
    log: Option<PathBuf>,
    interval: Duration,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    let db = Database::open(&db_path)?;
    let parser = Arc::new(Parser::new(db));
    let log_path = paths::resolve_tail_path(log)?;

    tail::run(parser, log_path, tail::TailOptions { interval, verbose }, cancel).await?;
    Ok(())
}

async fn run_serve(
    db_path: PathBuf,
    addr: String,
    web_dist: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    let db = Database::open(&db_path)?;

    let web_dist = web_dist.or_else(|| {
        std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join("web").join("dist"))
    });

    let config = ServerConfig { addr, web_dist };
    let (_, handle) = arenalog_server::listen(config, db, cancel.clone()).await?;

    cancel.cancelled().await;
    handle.await?;
    info!("shutdown complete");
    Ok(())
}
