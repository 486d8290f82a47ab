//! Structured logging setup using tracing.
//!
//! Console output is human-readable and filtered via `RUST_LOG`; file output
//! is JSON with daily rotation under the local data directory.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix (e.g., "mp3grab" -> "mp3grab.2025-08-08.log").
    pub log_file_prefix: String,
    /// Maximum log level for console output.
    pub console_level: Level,
    /// Maximum log level for file output.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: Rotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LoggingConfig {
    /// Verbose configuration for debug builds.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "mp3grab".to_string(),
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            rotation: Rotation::HOURLY,
        }
    }

    /// Quiet configuration for release builds.
    #[must_use]
    pub fn production() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "mp3grab".to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            rotation: Rotation::DAILY,
        }
    }

    /// Pick a configuration based on the build type.
    #[must_use]
    pub fn auto() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }
}

/// Guard that keeps file logging active. Drop it to flush pending entries.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },
}

/// Initialize the logging system with the given configuration.
///
/// Returns a guard that must be kept alive for the duration of the process;
/// dropping it flushes pending log entries to disk.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
///
/// # Panics
///
/// Panics if logging has already been initialized.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    if !config.log_directory.exists() {
        std::fs::create_dir_all(&config.log_directory).map_err(|e| {
            LoggingError::DirectoryCreationFailed {
                path: config.log_directory.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    let file_appender = RollingFileAppender::new(
        config.rotation.clone(),
        &config.log_directory,
        &config.log_file_prefix,
    );
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins for the console; default keeps dependencies quiet.
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,mp3grab={level},mp3grab_core={level}",
            level = level_to_directive(config.console_level)
        ))
    });

    let file_filter = EnvFilter::new(format!(
        "{level},mp3grab=trace,mp3grab_core=trace",
        level = level_to_directive(config.file_level)
    ));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialize logging with automatic configuration detection.
///
/// # Errors
///
/// Returns an error if initialization fails.
///
/// # Panics
///
/// Panics if logging has already been initialized.
pub fn init_auto() -> Result<LoggingGuard, LoggingError> {
    init(&LoggingConfig::auto())
}

/// Get the default log directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mp3grab")
        .join("logs")
}

/// Convert a tracing Level to a filter directive string.
const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_production() {
        let config = LoggingConfig::default();
        assert_eq!(config.console_level, Level::WARN);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_development_config_is_verbose() {
        let config = LoggingConfig::development();
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::TRACE);
    }

    #[test]
    fn test_default_log_directory() {
        let dir = default_log_directory();
        assert!(dir.to_string_lossy().contains("mp3grab"));
        assert!(dir.to_string_lossy().contains("logs"));
    }
}
