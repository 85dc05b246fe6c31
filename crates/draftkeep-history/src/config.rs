/// Configuration and utility functions for the history system.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Quiet period after the last edit before the live state is written to disk.
const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Upper bound for the debounce window; anything longer risks losing work.
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Maximum number of undo steps kept in memory.
/// Oldest steps are evicted when this limit is exceeded.
const DEFAULT_MAX_UNDO_DEPTH: usize = 10_000;

/// Key of the singleton project snapshot.
pub const DEFAULT_SNAPSHOT_KEY: &str = "current";

/// Config file name inside the data directory.
const CONFIG_FILE_NAME: &str = "draftkeep.json";

/// Configuration for the history system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Root directory for the store database.
    pub data_dir: PathBuf,
    /// Debounce window for snapshot writes, in milliseconds.
    pub debounce_ms: u64,
    /// Max undo steps kept by the history manager.
    pub max_undo_depth: usize,
    /// Key the project snapshot is stored under.
    pub snapshot_key: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: resolve_data_dir(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }
}

impl HistoryConfig {
    /// Returns the config file path inside the resolved data directory.
    pub fn config_path() -> PathBuf {
        resolve_data_dir().join(CONFIG_FILE_NAME)
    }

    /// The debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (unreadable file, parse error, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<HistoryConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {}: {e}", path.display());
                }
            }
            // Return defaults on error (don't overwrite broken file)
            Self::default()
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to create default config at {}: {e}", path.display());
            }
            config
        }
    }

    /// Loads the config stored in `dir` without creating anything.
    ///
    /// Falls back to defaults when the file is missing or unreadable. The
    /// returned config always points at `dir`.
    pub fn load_from_dir(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<HistoryConfig>(&contents)
                .map(|mut config| {
                    config.sanitize();
                    config
                })
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    Self::default()
                }),
            Err(_) => Self::default(),
        };
        config.data_dir = dir.to_path_buf();
        config
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Clamps values loaded from disk into their valid ranges.
    pub fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.min(MAX_DEBOUNCE_MS);
        self.max_undo_depth = self.max_undo_depth.max(1);
        let key = self.snapshot_key.trim();
        self.snapshot_key = if key.is_empty() {
            DEFAULT_SNAPSHOT_KEY.to_string()
        } else {
            key.to_string()
        };
    }
}

/// Resolves the data directory path.
///
/// Resolution order:
/// 1. `DRAFTKEEP_DATA_DIR` environment variable
/// 2. `draftkeep/` under the platform data directory
/// 3. `.data/` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DRAFTKEEP_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|dir| dir.join("draftkeep"))
        .unwrap_or_else(|| PathBuf::from(".data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HistoryConfig::default();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.max_undo_depth, 10_000);
        assert_eq!(config.snapshot_key, "current");
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_dir_never_writes() {
        let dir = TempDir::new().expect("create temp dir");
        let config = HistoryConfig::load_from_dir(dir.path());

        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_load_from_dir_reads_existing_file() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"snapshot_key": "draft", "data_dir": "/elsewhere"}"#,
        )
        .expect("write");

        let config = HistoryConfig::load_from_dir(dir.path());
        assert_eq!(config.snapshot_key, "draft");
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn test_sanitize_clamps_values() {
        let mut config = HistoryConfig {
            debounce_ms: 10 * MAX_DEBOUNCE_MS,
            max_undo_depth: 0,
            snapshot_key: "   ".to_string(),
            ..HistoryConfig::default()
        };
        config.sanitize();
        assert_eq!(config.debounce_ms, MAX_DEBOUNCE_MS);
        assert_eq!(config.max_undo_depth, 1);
        assert_eq!(config.snapshot_key, DEFAULT_SNAPSHOT_KEY);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = HistoryConfig::load_or_create(&path);
        assert!(path.exists());
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "debounce_ms": 250, "snapshot_key": " project " }"#)
            .expect("write");

        let config = HistoryConfig::load_or_create(&path);
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.snapshot_key, "project");
        assert_eq!(config.max_undo_depth, DEFAULT_MAX_UNDO_DEPTH);
    }

    #[test]
    fn test_broken_file_returns_defaults_untouched() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").expect("write");

        let config = HistoryConfig::load_or_create(&path);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{ not json");
    }

    #[test]
    fn test_resolve_data_dir_with_env_var() {
        // Save and restore env var
        let original = std::env::var("DRAFTKEEP_DATA_DIR").ok();
        std::env::set_var("DRAFTKEEP_DATA_DIR", "/custom/path");
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/custom/path"));
        // Restore
        match original {
            Some(val) => std::env::set_var("DRAFTKEEP_DATA_DIR", val),
            None => std::env::remove_var("DRAFTKEEP_DATA_DIR"),
        }
    }
}
