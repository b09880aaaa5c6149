//! Logging setup for the snapshot tool.
//!
//! Initializes a global tracing subscriber that writes to both stdout and
//! the log file named by the run configuration. An oversized log file is
//! rotated aside to a timestamped backup at startup, and backups are kept
//! to a bounded count.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Rotate the log file once it reaches this size.
const MAX_LOG_BYTES: u64 = 1024 * 1024;
/// Maximum number of rotated backups to retain.
const MAX_LOG_BACKUPS: usize = 20;

const BACKUP_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log path lacks a directory or file name component.
    #[error("Log path {path} is not a usable file path")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },
    /// Failed to create the log directory.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        /// Directory that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to create the log file.
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        /// Path that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to move an oversized log file aside.
    #[error("Failed to rotate log file {path}: {source}")]
    Rotate {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to enumerate rotated backups for pruning.
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        /// Directory that failed to list.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to remove an obsolete backup.
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        /// Backup path that failed to remove.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to format a timestamp for a backup filename.
    #[error("Failed to format log backup time: {0}")]
    FormatTime(time::error::Format),
    /// Failed to set the global tracing subscriber.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Initialize tracing to write to stdout and the given log file.
///
/// Subsequent calls are no-ops. Failures are returned so the caller can
/// degrade to console-only output without aborting the run.
pub fn init(log_path: &Path) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let invalid = || LoggingError::InvalidPath {
        path: log_path.to_path_buf(),
    };
    let log_dir = log_path.parent().ok_or_else(invalid)?.to_path_buf();
    let file_name = log_path.file_name().ok_or_else(invalid)?.to_os_string();

    fs::create_dir_all(&log_dir).map_err(|source| LoggingError::CreateDir {
        path: log_dir.clone(),
        source,
    })?;
    rotate_if_oversized(log_path, MAX_LOG_BYTES, now_local_or_utc())?;
    prune_old_backups(log_path, MAX_LOG_BACKUPS)?;
    ensure_file_exists(log_path)?;

    let file_appender = rolling::never(&log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let timer = timestamp_timer();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let stdout_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stdout);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(file_writer);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Logging initialized; log file at {}", log_path.display());
    Ok(())
}

/// Move the log file to a timestamped backup once it reaches `max_bytes`.
///
/// A missing log file is fine; there is simply nothing to rotate.
fn rotate_if_oversized(
    log_path: &Path,
    max_bytes: u64,
    now: OffsetDateTime,
) -> Result<(), LoggingError> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if size < max_bytes {
        return Ok(());
    }
    let backup = backup_path(log_path, now)?;
    fs::rename(log_path, &backup).map_err(|source| LoggingError::Rotate {
        path: log_path.to_path_buf(),
        source,
    })
}

fn backup_path(log_path: &Path, now: OffsetDateTime) -> Result<PathBuf, LoggingError> {
    let stamp = now
        .format(BACKUP_TIMESTAMP_FORMAT)
        .map_err(LoggingError::FormatTime)?;
    let mut name = log_path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{stamp}"));
    Ok(log_path.with_file_name(name))
}

/// Delete the oldest rotated backups beyond `max_backups`.
///
/// Backups carry sortable timestamps, so name order is age order.
fn prune_old_backups(log_path: &Path, max_backups: usize) -> Result<(), LoggingError> {
    let Some(dir) = log_path.parent() else {
        return Ok(());
    };
    let Some(file_name) = log_path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };
    let prefix = format!("{file_name}.");
    let list_dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    let mut backups = fs::read_dir(list_dir)
        .map_err(|source| LoggingError::ReadDir {
            path: list_dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .map(|entry| entry.path())
        .collect::<Vec<_>>();

    backups.sort();
    while backups.len() > max_backups {
        let path = backups.remove(0);
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn timestamp_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>>
{
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

/// The current moment in local time, falling back to UTC when the local
/// offset cannot be determined.
pub(crate) fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
