use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, StoreError};

/// Store configuration, usually read from `mailstore.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to the platform data dir.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// SQLite page cache size in KiB
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: u32,

    /// Retention window applied to accounts without their own setting.
    /// `None` keeps mail forever.
    #[serde(default)]
    pub default_retention_days: Option<u32>,

    /// Upper bound on conversations returned by a single search page
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailstore")
        .join("mail.db")
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_cache_size_kib() -> u32 {
    8_000
}

fn default_max_search_results() -> usize {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size_kib: default_cache_size_kib(),
            default_retention_days: None,
            max_search_results: default_max_search_results(),
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded store config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StoreError::Config("pool_size must be at least 1".into()));
        }
        if self.max_search_results == 0 {
            return Err(StoreError::Config(
                "max_search_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
