//! Persistent cache for cndy uploads.
//!
//! The cache is the single local source of truth for resumability: it maps
//! every item index to its content link and whether that link has been
//! written on-chain, plus the program addresses created for the collection.
//! One cache exists per `(cache name, cluster)` pair.
//!
//! # Storage Backends
//!
//! All backends implement the [`CacheStore`] trait:
//!
//! - [`FileCacheStore`] -- JSON files under a cache directory
//! - [`InMemoryCacheStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A save either fully replaces the previous record or leaves it intact.
//!    Writes go to a temporary file in the same directory which is then
//!    renamed over the target.
//! 2. A missing cache is reported as [`CacheError::NotFound`]; callers that
//!    start a fresh run use [`CacheStore::load_or_seed`].
//! 3. One process owns a cache at a time. Running two invocations against the
//!    same cache name and cluster is unsupported and not detected.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use file::{FileCacheStore, DEFAULT_CACHE_DIR};
pub use memory::InMemoryCacheStore;
pub use traits::CacheStore;
