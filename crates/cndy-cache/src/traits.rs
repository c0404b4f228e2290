use cndy_types::{CacheFile, Cluster};

use crate::error::{CacheError, CacheResult};

/// Keyed store of [`CacheFile`] records.
///
/// Implementations must satisfy these invariants:
/// - `save` is atomic: a reader sees either the old record or the new one.
/// - `load` returns [`CacheError::NotFound`] for a key never saved, and never
///   fabricates an empty record on its own.
pub trait CacheStore: Send + Sync {
    /// Read the cache for `(name, env)`.
    fn load(&self, name: &str, env: Cluster) -> CacheResult<CacheFile>;

    /// Replace the cache for `(name, env)`.
    fn save(&self, name: &str, env: Cluster, cache: &CacheFile) -> CacheResult<()>;

    /// Read the cache, or an empty seed record if none has been saved yet.
    fn load_or_seed(&self, name: &str, env: Cluster) -> CacheResult<CacheFile> {
        match self.load(name, env) {
            Ok(cache) => Ok(cache),
            Err(CacheError::NotFound { .. }) => {
                tracing::debug!(name, %env, "no cache yet; starting from an empty record");
                Ok(CacheFile::seed())
            }
            Err(e) => Err(e),
        }
    }
}

impl<T: CacheStore + ?Sized> CacheStore for std::sync::Arc<T> {
    fn load(&self, name: &str, env: Cluster) -> CacheResult<CacheFile> {
        (**self).load(name, env)
    }

    fn save(&self, name: &str, env: Cluster, cache: &CacheFile) -> CacheResult<()> {
        (**self).save(name, env, cache)
    }
}
