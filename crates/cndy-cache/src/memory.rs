use std::collections::HashMap;
use std::sync::RwLock;

use cndy_types::{CacheFile, Cluster};

use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;

/// In-memory cache store.
///
/// Intended for tests and embedding. Records are cloned on load and save,
/// and every save is counted so tests can assert persistence points.
#[derive(Default)]
pub struct InMemoryCacheStore {
    records: RwLock<HashMap<(String, Cluster), CacheFile>>,
    saves: RwLock<usize>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already present.
    pub fn with_record(name: &str, env: Cluster, cache: CacheFile) -> Self {
        let store = Self::new();
        store
            .records
            .write()
            .expect("lock poisoned")
            .insert((name.to_string(), env), cache);
        store
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.read().expect("lock poisoned")
    }

    /// The current record, if any, without going through `load`.
    pub fn snapshot(&self, name: &str, env: Cluster) -> Option<CacheFile> {
        self.records
            .read()
            .expect("lock poisoned")
            .get(&(name.to_string(), env))
            .cloned()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn load(&self, name: &str, env: Cluster) -> CacheResult<CacheFile> {
        self.snapshot(name, env).ok_or_else(|| CacheError::NotFound {
            name: name.to_string(),
            env,
        })
    }

    fn save(&self, name: &str, env: Cluster, cache: &CacheFile) -> CacheResult<()> {
        self.records
            .write()
            .expect("lock poisoned")
            .insert((name.to_string(), env), cache.clone());
        *self.saves.write().expect("lock poisoned") += 1;
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.records.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryCacheStore")
            .field("record_count", &count)
            .field("saves", &self.save_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_counts() {
        let store = InMemoryCacheStore::new();
        assert!(matches!(
            store.load("a", Cluster::Devnet),
            Err(CacheError::NotFound { .. })
        ));

        let mut cache = CacheFile::seed();
        cache.set_link(0, "n", "l");
        store.save("a", Cluster::Devnet, &cache).unwrap();
        store.save("a", Cluster::Devnet, &cache).unwrap();

        assert_eq!(store.load("a", Cluster::Devnet).unwrap(), cache);
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn seeded_record() {
        let mut cache = CacheFile::seed();
        cache.set_config("u", "c").unwrap();
        let store = InMemoryCacheStore::with_record("a", Cluster::Testnet, cache.clone());
        assert_eq!(store.load_or_seed("a", Cluster::Testnet).unwrap(), cache);
        assert_eq!(store.load_or_seed("a", Cluster::Devnet).unwrap(), CacheFile::seed());
        assert_eq!(store.save_count(), 0);
    }
}
