//! Configuration Module
//!
//! Cache configuration with serde-backed defaults and YAML file loading.

use crate::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

fn default_max_size_bytes() -> u64 {
    256 * 1024 * 1024 // 256 MiB
}

fn default_load_synchronously() -> bool {
    true
}

/// Configuration for an [`EntryStore`](crate::entry_store::EntryStore)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the cache files; created on open if absent
    pub directory: PathBuf,

    /// Eviction budget in bytes (default: 256 MiB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Block construction until existing files are fully indexed (default:
    /// true). When false, indexing runs on a background task and the cache
    /// is usable immediately with a partially-populated index.
    #[serde(default = "default_load_synchronously")]
    pub load_synchronously: bool,
}

impl CacheConfig {
    /// Configuration for `directory` with default budget and synchronous
    /// loading
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size_bytes: default_max_size_bytes(),
            load_synchronously: default_load_synchronously(),
        }
    }

    /// Load and validate configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::ConfigError(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        info!("Loaded cache configuration from {:?}", path);
        Ok(config)
    }

    /// Validate the configuration, returning a
    /// [`CacheError::ConfigError`] on the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(CacheError::ConfigError(
                "Cache directory must not be empty".to_string(),
            ));
        }
        if self.max_size_bytes == 0 {
            return Err(CacheError::ConfigError(
                "Cache max_size_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
