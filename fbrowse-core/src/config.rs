//! src/config.rs
//! ============================================================================
//! # Config: Application Configuration Loader and Saver
//!
//! Static application configuration, stored as TOML in the platform config
//! directory (via [`directories`](https://docs.rs/directories)). View
//! preferences that change at runtime are not kept here; they go through
//! [`crate::settings::Settings`].
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! init_logging(&config.logging)?;
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::error::{AppError, AppResult};
use crate::logging::LoggerConfig;

const CONFIG_FILE: &str = "config.toml";
const SETTINGS_FILE: &str = "settings.toml";

/// Recursive search behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Subtrees never entered (pseudo filesystems with pathological content).
    pub excluded_roots: Vec<PathBuf>,

    /// Search inside hidden files and directories.
    pub include_hidden: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            excluded_roots: vec![PathBuf::from("/proc"), PathBuf::from("/sys/block")],
            include_hidden: false,
        }
    }
}

/// Filesystem watch behaviour for open directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,

    /// Bursts of change notifications within this window trigger one refresh.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(200),
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggerConfig,

    pub search: SearchConfig,

    pub watch: WatchConfig,

    /// Key/value settings store; defaults to `settings.toml` next to the config.
    pub settings_file: Option<PathBuf>,
}

impl Config {
    /// Loads config from the platform config dir, or writes and returns defaults.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/fbrowse/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> AppResult<Self> {
        let path = Self::config_path()?;
        if TokioFs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    pub async fn load_from(path: &Path) -> AppResult<Self> {
        info!("Loading config from {}", path.display());
        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|e| AppError::config_io(path, e))?;

        Ok(toml::from_str(&text)?)
    }

    pub async fn save_to(&self, path: &Path) -> AppResult<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::config_io(parent, e))?;
        }

        let toml_str = toml::to_string_pretty(self).map_err(|e| AppError::Other(e.to_string()))?;
        TokioFs::write(path, toml_str)
            .await
            .map_err(|e| AppError::config_io(path, e))
    }

    /// Resolved path of the key/value settings store.
    pub fn settings_path(&self) -> AppResult<PathBuf> {
        match &self.settings_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join(SETTINGS_FILE)),
        }
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn config_dir() -> AppResult<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fbrowse", "fbrowse")
            .ok_or_else(|| AppError::Other("Could not determine config directory.".into()))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.search.include_hidden = true;
        config.watch.debounce = Duration::from_millis(750);
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert!(loaded.search.include_hidden);
        assert_eq!(loaded.watch.debounce, Duration::from_millis(750));
        assert_eq!(loaded.search.excluded_roots, SearchConfig::default().excluded_roots);
    }

    #[tokio::test]
    async fn missing_sections_use_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        TokioFs::write(&path, "[watch]\nenabled = false\n").await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert!(!loaded.watch.enabled);
        assert_eq!(loaded.watch.debounce, Duration::from_millis(200));
        assert_eq!(loaded.search, SearchConfig::default());
    }

    #[tokio::test]
    async fn malformed_file_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        TokioFs::write(&path, "watch = [").await.unwrap();

        let err = Config::load_from(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn explicit_settings_file_wins() {
        let config = Config {
            settings_file: Some(PathBuf::from("/etc/fbrowse/settings.toml")),
            ..Config::default()
        };
        assert_eq!(
            config.settings_path().unwrap(),
            PathBuf::from("/etc/fbrowse/settings.toml")
        );
    }
}
