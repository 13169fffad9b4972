//! src/logging.rs
//! ============================================================================
//! # Logging: tracing subscriber setup
//!
//! JSON lines go to a (optionally daily-rotated) file through a non-blocking
//! appender; a compact human-readable copy can be echoed to stderr. The
//! level comes from `RUST_LOG` when set, from the config otherwise.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, RollingFileAppender},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub rotation: LogRotation,
    /// Echo log lines to stderr as well.
    pub stderr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("fbrowse"),
            log_level: CompactString::const_new("info"),
            rotation: LogRotation::Daily,
            stderr: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Keeps the non-blocking writer alive; buffered lines are flushed on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: WorkerGuard,
}

pub fn init_logging(config: &LoggerConfig) -> Result<LoggingGuard, LoggingError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(LoggingError::AlreadyInitialized);
    }

    std::fs::create_dir_all(&config.log_dir)?;

    let appender: RollingFileAppender = match config.rotation {
        LogRotation::Daily => rolling::daily(&config.log_dir, config.log_file_prefix.as_str()),
        LogRotation::Never => rolling::never(
            &config.log_dir,
            format!("{}.log", config.log_file_prefix),
        ),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))
        .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

    let file_layer = fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let stderr_layer = config
        .stderr
        .then(|| fmt::layer().compact().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

    tracing::info!(
        marker = "LOGGING_INIT",
        log_dir = %config.log_dir.display(),
        level = %config.log_level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_init_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = LoggerConfig {
            log_dir: tmp.path().join("logs"),
            rotation: LogRotation::Never,
            ..LoggerConfig::default()
        };

        let guard = init_logging(&config).unwrap();
        assert!(tmp.path().join("logs").is_dir());
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::AlreadyInitialized)
        ));
        drop(guard);
    }

    #[test]
    fn rotation_parses_lowercase() {
        let config: LoggerConfig = toml::from_str("rotation = \"never\"\nstderr = true").unwrap();
        assert_eq!(config.rotation, LogRotation::Never);
        assert!(config.stderr);
        assert_eq!(config.log_level, "info");
    }
}
