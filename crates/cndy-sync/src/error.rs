use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid item directory {dir}: {reason}")]
    InvalidItems { dir: PathBuf, reason: String },

    /// Flags, cache contents or settings that make the operation impossible.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cache error: {0}")]
    Cache(#[from] cndy_cache::CacheError),

    #[error("storage error: {0}")]
    Upload(#[from] cndy_storage::UploadError),

    #[error("ledger error: {0}")]
    Ledger(#[from] cndy_ledger::LedgerError),

    #[error("{0}")]
    Type(#[from] cndy_types::TypeError),

    #[error("invalid key list: {0}")]
    KeyList(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
