//! Platform-default client log locations.

use std::path::PathBuf;

use tracing::info;

use crate::error::IngestError;

/// The current and rotated-previous log paths for this platform, if a
/// home directory can be resolved.
pub fn default_log_paths() -> Option<(PathBuf, PathBuf)> {
    let base = default_log_dir()?;
    Some((base.join("Player.log"), base.join("Player-prev.log")))
}

#[cfg(target_os = "macos")]
fn default_log_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join("Library")
            .join("Logs")
            .join("Wizards Of The Coast")
            .join("MTGA"),
    )
}

#[cfg(target_os = "windows")]
fn default_log_dir() -> Option<PathBuf> {
    let home = std::env::var_os("USERPROFILE")?;
    Some(
        PathBuf::from(home)
            .join("AppData")
            .join("LocalLow")
            .join("Wizards Of The Coast")
            .join("MTGA"),
    )
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_log_dir() -> Option<PathBuf> {
    // No native client on this platform; callers must pass --log.
    None
}

/// Resolve the file list for a backfill run.
///
/// An explicit path wins. Otherwise the previous (rotated) log is parsed
/// before the current one so state replays in write order. Missing
/// defaults are skipped with a note; no file at all is an error.
pub fn resolve_backfill_paths(
    explicit: Option<PathBuf>,
    include_prev: bool,
) -> Result<Vec<PathBuf>, IngestError> {
    if let Some(path) = explicit {
        return Ok(vec![path]);
    }

    let Some((current, prev)) = default_log_paths() else {
        return Err(IngestError::NoDefaultLogs);
    };

    let mut candidates = Vec::with_capacity(2);
    if include_prev {
        candidates.push(prev);
    }
    candidates.push(current);

    let mut found = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match std::fs::metadata(&candidate) {
            Ok(meta) if meta.is_file() => found.push(candidate),
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %candidate.display(), "default log not found, skipping");
            }
            Err(err) => return Err(err.into()),
        }
    }

    if found.is_empty() {
        return Err(IngestError::NoDefaultLogs);
    }
    Ok(found)
}

/// Resolve the single file a tail loop follows.
pub fn resolve_tail_path(explicit: Option<PathBuf>) -> Result<PathBuf, IngestError> {
    let path = match explicit {
        Some(path) => path,
        None => default_log_paths().ok_or(IngestError::NoDefaultLogs)?.0,
    };

    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(IngestError::LogNotFound(path.display().to_string())),
    }
}
