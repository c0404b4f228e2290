use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::item::ItemIndex;

/// Program-level fields, written once when the on-chain objects are created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Address of the config account holding the config lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Address of the candy machine derived from `config` and `uuid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candy_machine: Option<String>,
}

/// Upload and registration status of one item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub on_chain: bool,
}

impl CacheItem {
    pub fn has_link(&self) -> bool {
        self.link.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Summary counts over a cache file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheCounts {
    pub items: usize,
    pub linked: usize,
    pub on_chain: usize,
}

/// The persistent record that makes an upload resumable.
///
/// Invariant: an item with `on_chain == true` always has a link, and that
/// link is what the config slot at the same index holds on-chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    #[serde(default)]
    pub program: ProgramInfo,
    #[serde(default)]
    pub items: BTreeMap<ItemIndex, CacheItem>,
}

impl CacheFile {
    /// An empty record, used on the first run for a cache name.
    pub fn seed() -> Self {
        Self::default()
    }

    pub fn item(&self, index: ItemIndex) -> Option<&CacheItem> {
        self.items.get(&index)
    }

    pub fn is_on_chain(&self, index: ItemIndex) -> bool {
        self.items.get(&index).is_some_and(|i| i.on_chain)
    }

    pub fn link(&self, index: ItemIndex) -> Option<&str> {
        self.items
            .get(&index)
            .and_then(|i| i.link.as_deref())
            .filter(|l| !l.is_empty())
    }

    /// Record a fresh upload. Any previous on-chain flag is cleared because
    /// the new link has not been written yet.
    pub fn set_link(&mut self, index: ItemIndex, name: impl Into<String>, link: impl Into<String>) {
        let item = self.items.entry(index).or_default();
        item.link = Some(link.into());
        item.name = name.into();
        item.on_chain = false;
    }

    /// Mark an item as registered on-chain. Fails if the item has no link.
    pub fn mark_on_chain(&mut self, index: ItemIndex) -> Result<(), TypeError> {
        match self.items.get_mut(&index) {
            Some(item) if item.has_link() => {
                item.on_chain = true;
                Ok(())
            }
            _ => Err(TypeError::MissingLink(index)),
        }
    }

    /// Clear the on-chain flag (the chain disagreed with the cache).
    pub fn reset_on_chain(&mut self, index: ItemIndex) {
        if let Some(item) = self.items.get_mut(&index) {
            item.on_chain = false;
        }
    }

    /// Record the config account and uuid. They are set once; setting the
    /// same values again is a no-op.
    pub fn set_config(&mut self, uuid: &str, config: &str) -> Result<(), TypeError> {
        set_once(&mut self.program.uuid, "uuid", uuid)?;
        set_once(&mut self.program.config, "config", config)
    }

    /// Record the candy machine address. Set once.
    pub fn set_candy_machine(&mut self, address: &str) -> Result<(), TypeError> {
        set_once(&mut self.program.candy_machine, "candyMachine", address)
    }

    /// Indexes in `0..total` that are not yet registered on-chain, ascending.
    pub fn remaining(&self, total: u32) -> Vec<ItemIndex> {
        (0..total).filter(|i| !self.is_on_chain(*i)).collect()
    }

    /// Indexes in `0..total` that still need an upload, ascending.
    pub fn missing_links(&self, total: u32) -> Vec<ItemIndex> {
        (0..total).filter(|i| self.link(*i).is_none()).collect()
    }

    /// Length of the contiguous on-chain prefix starting at index 0.
    pub fn committed_prefix(&self) -> u32 {
        let mut n = 0;
        while self.is_on_chain(n) {
            n += 1;
        }
        n
    }

    pub fn counts(&self) -> CacheCounts {
        CacheCounts {
            items: self.items.len(),
            linked: self.items.values().filter(|i| i.has_link()).count(),
            on_chain: self.items.values().filter(|i| i.on_chain).count(),
        }
    }
}

fn set_once(slot: &mut Option<String>, field: &'static str, value: &str) -> Result<(), TypeError> {
    match slot {
        Some(existing) if existing != value => Err(TypeError::ProgramFieldConflict {
            field,
            existing: existing.clone(),
            attempted: value.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value.to_string());
            Ok(())
        }
    }
}
