use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cndy_types::{CacheFile, Cluster};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;

/// Directory cache files live in when none is configured.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// JSON-file cache store.
///
/// Each `(name, env)` pair maps to `<dir>/<env>-<name>`. Saves are written
/// to a temporary file in `dir`, synced, then renamed over the target, so an
/// interrupted save never leaves a torn record behind.
#[derive(Clone, Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for `(name, env)`.
    pub fn path_for(&self, name: &str, env: Cluster) -> CacheResult<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{env}-{name}")))
    }
}

impl Default for FileCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, name: &str, env: Cluster) -> CacheResult<CacheFile> {
        let path = self.path_for(name, env)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    name: name.to_string(),
                    env,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let cache = serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "cache loaded");
        Ok(cache)
    }

    fn save(&self, name: &str, env: Cluster, cache: &CacheFile) -> CacheResult<()> {
        let path = self.path_for(name, env)?;
        fs::create_dir_all(&self.dir)?;

        let payload = serde_json::to_vec(cache)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&payload)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;

        debug!(path = %path.display(), bytes = payload.len(), "cache saved");
        Ok(())
    }
}

fn validate_name(name: &str) -> CacheResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CacheFile {
        let mut cache = CacheFile::seed();
        cache.set_config("abcdef", "Config111").unwrap();
        cache.set_link(0, "Item 0", "https://arweave.net/0");
        cache.set_link(1, "Item 1", "https://arweave.net/1");
        cache.mark_on_chain(0).unwrap();
        cache
    }

    #[test]
    fn missing_cache_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        let err = store.load("temp", Cluster::Devnet).unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn load_or_seed_on_first_run() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path().join("nested"));
        let cache = store.load_or_seed("temp", Cluster::Devnet).unwrap();
        assert_eq!(cache, CacheFile::seed());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path().join(".cache"));
        let cache = sample();
        store.save("temp", Cluster::Devnet, &cache).unwrap();

        assert!(dir.path().join(".cache/devnet-temp").exists());
        assert_eq!(store.load("temp", Cluster::Devnet).unwrap(), cache);
        // Same name, different cluster, is a different cache.
        assert!(store.load("temp", Cluster::MainnetBeta).is_err());
    }

    #[test]
    fn save_replaces_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        let mut cache = sample();
        store.save("temp", Cluster::Devnet, &cache).unwrap();
        cache.mark_on_chain(1).unwrap();
        store.save("temp", Cluster::Devnet, &cache).unwrap();

        let loaded = store.load("temp", Cluster::Devnet).unwrap();
        assert!(loaded.is_on_chain(1));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary files must be renamed away");
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        fs::write(dir.path().join("devnet-temp"), b"{not json").unwrap();
        let err = store.load("temp", Cluster::Devnet).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
        // A corrupt cache is not silently replaced by a seed.
        assert!(store.load_or_seed("temp", Cluster::Devnet).is_err());
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let store = FileCacheStore::default();
        assert!(matches!(
            store.path_for("../escape", Cluster::Devnet),
            Err(CacheError::InvalidName(_))
        ));
        assert!(store.path_for("", Cluster::Devnet).is_err());
        assert_eq!(
            store.path_for("temp", Cluster::Testnet).unwrap(),
            PathBuf::from(".cache/testnet-temp")
        );
    }
}
