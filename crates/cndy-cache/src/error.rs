use std::path::PathBuf;

use cndy_types::Cluster;

/// Errors from cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No cache has been saved for this name and cluster yet.
    #[error("no cache named {name} for {env}")]
    NotFound { name: String, env: Cluster },

    /// The cache file exists but is not a valid cache record.
    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization failure while saving.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cache names become file names and may not contain path separators.
    #[error("invalid cache name: {0:?}")]
    InvalidName(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
