//! Discovery and loading of the item files in an asset directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cndy_types::{ItemIndex, ItemPair, ItemPayload, Manifest, TypeError, MAX_NAME_LENGTH};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{SyncError, SyncResult};

const ASSET_EXTENSION: &str = "png";
const METADATA_EXTENSION: &str = "json";

/// The items of one collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSet {
    pub dir: PathBuf,
    /// Pairs `0..pairs.len()`, in index order.
    pub pairs: Vec<ItemPair>,
    /// Number of config slots to allocate; at least `pairs.len()`.
    pub capacity: u32,
}

impl ItemSet {
    pub fn total(&self) -> u32 {
        self.pairs.len() as u32
    }

    pub fn pair(&self, index: ItemIndex) -> Option<&ItemPair> {
        self.pairs.get(index as usize)
    }
}

/// Find `<i>.png` / `<i>.json` pairs in `dir`.
///
/// `number` sets the config capacity and defaults to the number of pairs.
/// Fails when the asset and metadata counts differ, when `number` is
/// smaller than the asset count, or when indexes are not `0..n`.
pub fn discover(dir: &Path, number: Option<u32>) -> SyncResult<ItemSet> {
    let invalid = |reason: String| SyncError::InvalidItems {
        dir: dir.to_path_buf(),
        reason,
    };

    let mut assets: BTreeMap<ItemIndex, PathBuf> = BTreeMap::new();
    let mut metadata: BTreeMap<ItemIndex, PathBuf> = BTreeMap::new();
    let mut asset_count = 0usize;
    let mut metadata_count = 0usize;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| invalid(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let target = match ext.as_deref() {
            Some(ASSET_EXTENSION) => {
                asset_count += 1;
                &mut assets
            }
            Some(METADATA_EXTENSION) => {
                metadata_count += 1;
                &mut metadata
            }
            _ => continue,
        };
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let index: ItemIndex = stem
            .parse()
            .map_err(|_| invalid(format!("{} is not named <index>.{}", path.display(), ext.unwrap_or_default())))?;
        target.insert(index, path.to_path_buf());
    }

    if asset_count != metadata_count {
        return Err(invalid(format!(
            "number of png files ({asset_count}) is different than the number of json files ({metadata_count})"
        )));
    }
    let capacity = number.unwrap_or(asset_count as u32);
    if (capacity as usize) < asset_count {
        return Err(invalid(format!(
            "max number ({capacity}) cannot be smaller than the number of elements in the source folder ({asset_count})"
        )));
    }

    let mut pairs = Vec::with_capacity(asset_count);
    for index in 0..asset_count as ItemIndex {
        match (assets.get(&index), metadata.get(&index)) {
            (Some(asset), Some(meta)) => pairs.push(ItemPair::new(index, asset, meta)),
            (None, _) => return Err(invalid(format!("missing {index}.{ASSET_EXTENSION}"))),
            (_, None) => return Err(invalid(format!("missing {index}.{METADATA_EXTENSION}"))),
        }
    }

    debug!(dir = %dir.display(), items = pairs.len(), capacity, "items discovered");
    Ok(ItemSet {
        dir: dir.to_path_buf(),
        pairs,
        capacity,
    })
}

/// Read an item's files. Returns the payload and the item name from its
/// metadata. Fails before anything is uploaded when the name does not fit
/// in a config line.
pub async fn load_payload(pair: &ItemPair) -> SyncResult<(ItemPayload, String)> {
    let metadata = tokio::fs::read(&pair.metadata).await?;
    let name = Manifest::parse(&metadata)?.name()?.to_string();
    if name.len() > MAX_NAME_LENGTH {
        return Err(TypeError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LENGTH,
        }
        .into());
    }
    let asset = tokio::fs::read(&pair.asset).await?;
    Ok((
        ItemPayload {
            index: pair.index,
            asset_name: pair.asset_name(),
            asset,
            metadata,
        },
        name,
    ))
}

/// Parse an item's metadata file.
pub async fn load_manifest(pair: &ItemPair) -> SyncResult<Manifest> {
    let bytes = tokio::fs::read(&pair.metadata).await?;
    Ok(Manifest::parse(&bytes)?)
}
