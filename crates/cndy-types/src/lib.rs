//! Foundation types for cndy.
//!
//! This crate holds the data model shared by every other cndy crate: the
//! items being uploaded, the persistent cache record that makes uploads
//! resumable, the fixed-size config line written on-chain, and the small
//! parsing helpers (cluster names, prices, go-live dates) the operator
//! supplies on the command line.
//!
//! # Key Types
//!
//! - [`ItemPair`] -- an asset file and its metadata file, identified by index
//! - [`ItemPayload`] -- the loaded bytes of one item, ready for upload
//! - [`CacheFile`] -- the local ledger of upload and registration status
//! - [`ConfigLine`] -- one on-chain config slot (name + content link)
//! - [`Manifest`] -- an item's metadata JSON
//! - [`Cluster`] -- the target ledger environment
//! - [`RetryPolicy`] -- bounded exponential backoff for uploads and submissions

pub mod cache;
pub mod cluster;
pub mod config_line;
pub mod error;
pub mod item;
pub mod manifest;
pub mod price;
pub mod retry;

pub use cache::{CacheCounts, CacheFile, CacheItem, ProgramInfo};
pub use cluster::Cluster;
pub use config_line::{ConfigLine, CONFIG_LINE_SIZE, MAX_NAME_LENGTH, MAX_URI_LENGTH};
pub use error::TypeError;
pub use item::{ItemIndex, ItemPair, ItemPayload};
pub use manifest::{Manifest, ManifestCreator};
pub use price::{parse_go_live_date, parse_price, LAMPORTS_DECIMALS};
pub use retry::{RetryBackoff, RetryPolicy};
