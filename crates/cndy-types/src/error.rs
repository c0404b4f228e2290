use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown cluster: {0} (expected devnet, testnet, mainnet-beta or localnet)")]
    UnknownCluster(String),

    #[error("config line name is {len} bytes, maximum is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("config line uri is {len} bytes, maximum is {max}")]
    UriTooLong { len: usize, max: usize },

    #[error("malformed config slot: {0}")]
    InvalidSlot(String),

    #[error("cache field {field} is already set to {existing}; refusing to overwrite with {attempted}")]
    ProgramFieldConflict {
        field: &'static str,
        existing: String,
        attempted: String,
    },

    #[error("invalid item metadata: {0}")]
    InvalidMetadata(String),

    #[error("item {0} has no content link")]
    MissingLink(u32),
}
