//! Storage uploaders for cndy.
//!
//! An uploader takes one item (asset bytes + metadata JSON), stores both with
//! a content-addressed backend, and returns the stable link of the metadata.
//! The metadata is rewritten to point at the stored asset before upload.
//!
//! # Backends
//!
//! All backends implement the [`StorageUploader`] trait:
//!
//! - [`StorageBackend`] -- the closed set of network backends (Arweave, IPFS
//!   via a pinning service, S3), chosen once from a validated
//!   [`StorageConfig`]
//! - [`InMemoryUploader`] -- content-addressed in-memory uploader with
//!   scripted failures, for tests and dry runs
//!
//! # Errors
//!
//! [`UploadError::is_retryable`] separates rate limits, network failures and
//! timeouts (retry after backoff) from rejected payloads and bad credentials
//! (never retried blindly).

pub mod backends;
pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use backends::StorageBackend;
pub use config::{StorageConfig, StorageKind, StorageOptions};
pub use error::{UploadError, UploadResult};
pub use memory::InMemoryUploader;
pub use traits::StorageUploader;
