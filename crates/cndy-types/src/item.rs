use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Zero-based position of an item in the collection.
pub type ItemIndex = u32;

/// An asset file and its metadata file.
///
/// Items are immutable once discovered; the full set is fixed before the
/// first upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPair {
    pub index: ItemIndex,
    pub asset: PathBuf,
    pub metadata: PathBuf,
}

impl ItemPair {
    pub fn new(index: ItemIndex, asset: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index,
            asset: asset.into(),
            metadata: metadata.into(),
        }
    }

    /// File name of the asset as it should appear to the storage backend.
    pub fn asset_name(&self) -> String {
        self.asset
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.png", self.index))
    }
}

/// The bytes of one item, read from disk and ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ItemPayload {
    pub index: ItemIndex,
    /// Name the asset is uploaded under (e.g. `0.png`).
    pub asset_name: String,
    pub asset: Vec<u8>,
    /// Raw metadata JSON.
    pub metadata: Vec<u8>,
}

impl std::fmt::Debug for ItemPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemPayload")
            .field("index", &self.index)
            .field("asset_name", &self.asset_name)
            .field("asset_len", &self.asset.len())
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_uses_file_name() {
        let pair = ItemPair::new(3, "/tmp/assets/3.png", "/tmp/assets/3.json");
        assert_eq!(pair.asset_name(), "3.png");
    }

    #[test]
    fn payload_debug_hides_bytes() {
        let payload = ItemPayload {
            index: 0,
            asset_name: "0.png".into(),
            asset: vec![1; 1024],
            metadata: b"{}".to_vec(),
        };
        let dbg = format!("{payload:?}");
        assert!(dbg.contains("asset_len: 1024"));
        assert!(!dbg.contains("[1, 1"));
    }
}
