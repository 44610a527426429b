//! Configuration management with YAML support

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ArchiveError, Result};
use crate::store::{StoreOptions, Synchronous};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Upper bound on waiting for another writer's lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_synchronous")]
    pub synchronous: Synchronous,
}

/// Archive command behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Fall back to the payload's `session_id` field or file stem when no
    /// session id is passed explicitly
    #[serde(default = "default_enabled")]
    pub derive_session_id: bool,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/episode-archive/episodes.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_synchronous() -> Synchronous {
    Synchronous::Full
}

fn default_enabled() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            synchronous: default_synchronous(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            derive_session_id: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// An explicitly given path must exist and parse. Otherwise searches:
    /// 1. ./episode-archive.yaml (current directory)
    /// 2. ~/.config/episode-archive/episode-archive.yaml
    ///
    /// and falls back to defaults when neither exists.
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            let expanded = shellexpand::tilde(path).to_string();
            return Self::from_file(Path::new(&expanded));
        }

        let mut search_paths = vec![PathBuf::from("episode-archive.yaml")];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("episode-archive/episode-archive.yaml"));
        }

        for search_path in &search_paths {
            if search_path.exists() {
                return Self::from_file(search_path);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ArchiveError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            synchronous: self.database.synchronous,
        }
    }
}
