//! Logging setup for the extractor.
//!
//! Installs a global tracing subscriber writing to stderr and, optionally, to
//! one log file per launch. Log files are timestamped and only the newest few
//! are kept. Stdout stays free for command output.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

/// Maximum number of log files to retain.
const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "snipwave";

static INSTALLED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// How the global subscriber should be assembled.
#[derive(Clone, Debug)]
pub struct LoggingOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Mirror log lines into a per-launch file under the app directory.
    pub log_to_file: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".into(),
            log_to_file: true,
        }
    }
}

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// No platform-specific data directory could be resolved.
    #[error("No suitable data directory available for logs")]
    NoDataDir,
    /// Failed to create or access the log directory.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to enumerate existing log files for pruning.
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to remove an obsolete log file.
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to format a timestamp for the log filename.
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    /// Failed to set the global tracing subscriber.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
    /// Failed to create the log file for this launch.
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Initialize tracing with the given options.
///
/// Subsequent calls are no-ops. Failures are returned so callers can keep
/// running without logs.
pub fn init(options: &LoggingOptions) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let timer = build_timer();
    let stderr_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stderr);

    let (file_layer, guard, log_path) = if options.log_to_file {
        let log_dir = app_dirs::logs_dir().map_err(map_app_dir_error)?;
        let log_file_name = format_log_file_name(now_local_or_utc())?;
        let log_path = log_dir.join(&log_file_name);
        ensure_file_exists(&log_path)?;
        prune_old_logs(&log_dir, MAX_LOG_FILES)?;
        let (writer, guard) =
            tracing_appender::non_blocking(rolling::never(&log_dir, log_file_name));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_timer(timer)
            .with_writer(writer);
        (Some(layer), Some(guard), Some(log_path))
    } else {
        (None, None, None)
    };

    let subscriber = Registry::default()
        .with(build_env_filter(&options.default_filter))
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = INSTALLED.set(guard);

    match log_path {
        Some(path) => tracing::info!("Logging initialized; log file at {}", path.display()),
        None => tracing::debug!("Logging initialized without a log file"),
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

fn prune_old_logs(dir: &Path, max_files: usize) -> Result<(), LoggingError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("log"))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect::<Vec<_>>();

    if entries.len() <= max_files {
        return Ok(());
    }
    entries.sort_by_key(|(modified, _)| *modified);
    let excess = entries.len() - max_files;
    for (_, path) in entries.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let name = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{name}.log"))
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn build_env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> LoggingError {
    match error {
        app_dirs::AppDirError::NoBaseDir => LoggingError::NoDataDir,
        app_dirs::AppDirError::CreateDir { path, source } => {
            LoggingError::CreateDir { path, source }
        }
    }
}
