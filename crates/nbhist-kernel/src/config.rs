//! Tracker configuration.
//!
//! Read from `$XDG_CONFIG_HOME/nbhist/config.toml` (or a path given on the
//! command line). Every field has a default, so a missing file and an empty
//! file behave the same:
//!
//! ```toml
//! data_directory = "/home/amy/.local/share/nbhist"
//! track_actions = true
//! track_versions = true
//! compare_outputs = true
//! flush_delay_ms = 2000
//! version_interval_secs = 300
//! ```
//!
//! `NBHIST_DATA_DIR` overrides `data_directory`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "NBHIST_DATA_DIR";

/// Quiet period before queued actions are written.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(2);

/// Minimum age of the newest dated version before another is written.
pub const DEFAULT_VERSION_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`HistoryConfig`].
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings shared by every tracked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Root under which per-notebook directories are created.
    pub data_directory: PathBuf,
    /// Record each action to the actions database.
    pub track_actions: bool,
    /// Write dated full snapshots.
    pub track_versions: bool,
    /// Count output changes as block changes.
    pub compare_outputs: bool,
    /// Quiet period before a delayed flush, in milliseconds.
    pub flush_delay_ms: u64,
    /// Dated snapshot quiescence window, in seconds.
    pub version_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_dir(),
            track_actions: true,
            track_versions: true,
            compare_outputs: true,
            flush_delay_ms: DEFAULT_FLUSH_DELAY.as_millis() as u64,
            version_interval_secs: DEFAULT_VERSION_INTERVAL.as_secs(),
        }
    }
}

impl HistoryConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nbhist").join("config.toml"))
    }

    /// Parse config from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load config from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from `path` or the default location, then apply the environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    /// Apply `NBHIST_DATA_DIR` if set.
    pub fn with_env(mut self) -> Self {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            self.data_directory = PathBuf::from(dir);
        }
        self
    }

    /// Replace the data directory.
    pub fn with_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_directory = dir.into();
        self
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn version_interval(&self) -> Duration {
        Duration::from_secs(self.version_interval_secs)
    }
}

/// `~/.local/share/nbhist` or the platform equivalent.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nbhist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HistoryConfig::default();
        assert!(config.track_actions);
        assert!(config.track_versions);
        assert!(config.compare_outputs);
        assert_eq!(config.flush_delay(), Duration::from_secs(2));
        assert_eq!(config.version_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HistoryConfig::from_toml(
            "track_versions = false\nflush_delay_ms = 250\n",
            Path::new("inline"),
        )
        .unwrap();
        assert!(!config.track_versions);
        assert_eq!(config.flush_delay(), Duration::from_millis(250));
        assert!(config.track_actions);
        assert_eq!(config.version_interval_secs, 300);
    }

    #[test]
    fn test_invalid_toml() {
        let err = HistoryConfig::from_toml("track_actions = \"maybe\"", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = HistoryConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HistoryConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_directory = \"/srv/history\"\ncompare_outputs = false\n").unwrap();

        let config = HistoryConfig::load(&path).unwrap();
        assert_eq!(config.data_directory, PathBuf::from("/srv/history"));
        assert!(!config.compare_outputs);
    }
}
