//! Logging setup for batch runs
//!
//! Two outputs:
//! - File: daily-rolling `<logs_dir>/<log_file>.<date>`, level from settings
//! - Console (stderr): WARN by default, INFO with `--verbose`
//!
//! `RUST_LOG` overrides both filters when set.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for log files
    pub log_directory: PathBuf,
    /// Base name of the log file; the appender adds a date suffix
    pub file_name: String,
    /// Level for file output
    pub log_level: Level,
    /// Maximum number of log files to keep
    pub max_files: usize,
    /// Level for console output
    pub console_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
            file_name: "snapshots.log".to_string(),
            log_level: Level::DEBUG,
            max_files: 5,
            console_level: Level::WARN,
        }
    }
}

impl LoggingConfig {
    /// Create from global settings values
    pub fn from_config(
        log_directory: &Path,
        file_name: &str,
        log_level: &str,
        max_files: usize,
        verbose: bool,
    ) -> Self {
        Self {
            log_directory: log_directory.to_path_buf(),
            file_name: file_name.to_string(),
            log_level: parse_level(log_level),
            max_files,
            console_level: if verbose { Level::INFO } else { Level::WARN },
        }
    }
}

/// Parse a level name, falling back to INFO for unknown names
pub fn parse_level(name: &str) -> Level {
    match name.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with console and file outputs
///
/// Returns a guard that must be kept alive for the duration of the program.
/// When the guard is dropped, any remaining logs are flushed to disk.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let log_dir = crate::config::expand_tilde(&config.log_directory);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, &config.file_name);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_filter(level_filter(config.log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .without_time()
        .with_filter(level_filter(config.console_level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    // the subscriber is installed now, so the guard must be returned
    cleanup_old_logs(&log_dir, &config.file_name, config.max_files);

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Initialize console-only logging (for when settings aren't available)
pub fn init_console_logging(verbose: bool) {
    let level = if verbose { Level::INFO } else { Level::WARN };

    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(level_filter(level))
        .with_target(false)
        .with_level(true)
        .try_init();
}

/// Filter for this crate at `level`, unless `RUST_LOG` is set
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,snapshot_manager={}", level)))
}

/// Remove rotated log files beyond `max_files`, newest kept first.
/// Failures are logged; returns the number of files removed.
fn cleanup_old_logs(log_dir: &Path, file_name: &str, max_files: usize) -> usize {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to scan log directory {:?} for old logs: {}", log_dir, e);
            return 0;
        }
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_name))
        .collect();

    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    let mut removed = 0;
    for file in log_files.into_iter().skip(max_files.max(1)) {
        if let Err(e) = fs::remove_file(file.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", file.path(), e);
        } else {
            tracing::debug!("Removed old log file: {:?}", file.path());
            removed += 1;
        }
    }

    removed
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any remaining logs to disk.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}
