//! Error Module
//!
//! Defines error types and result types used throughout the part cache.

use thiserror::Error;

/// Main error type for the part cache
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// A requested part file is absent on disk.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A multi-part open found fewer readable parts than requested. The
    /// remnants of the entry have already been removed when this is returned.
    #[error("Incomplete entry: {0}")]
    IncompleteEntry(String),

    /// A rename step failed mid-commit. The commit's partial state has been
    /// rolled back; any prior content of the key was already removed and is
    /// not restored.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CacheError {
    fn from(err: serde_yaml::Error) -> Self {
        CacheError::ConfigError(err.to_string())
    }
}

/// Result type alias for the part cache
pub type Result<T> = std::result::Result<T, CacheError>;
