//! The reconciliation loop: one bounded pass that closes the gap between
//! the item directory, the cache and the on-chain config.
//!
//! A pass moves through `Scanning -> Working -> Scanning`, or straight
//! `Scanning -> Done` when nothing is left. The cache is saved after every
//! upload chunk and after every confirmed config-line transaction, so an
//! interrupted pass resumes from its last saved point.
//!
//! Config slots are append-only in index order: each registration step
//! writes the contiguous run of uploaded items that starts at the first
//! slot not yet on chain.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cndy_cache::CacheStore;
use cndy_ledger::{ConfigRegistry, ConfigSettings, Pubkey, CONFIG_LINES_PER_TX};
use cndy_storage::StorageUploader;
use cndy_types::{CacheFile, Cluster, ConfigLine, ItemIndex, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::items::{self, ItemSet};
use crate::scheduler::{plan, UploadScheduler};

/// How a pass learns which slots are already written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    /// Trust the cache's `onChain` flags. No extra RPC per pass.
    TrustCache,
    /// Read the config account at the start of each pass. The chain wins:
    /// written slots are adopted into the cache, flags for unwritten slots
    /// are cleared.
    #[default]
    VerifyOnChain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Scanning,
    Working,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
    pub index: ItemIndex,
    pub reason: String,
    /// A later pass may succeed where this one failed.
    pub retryable: bool,
}

/// What one pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub uploaded: usize,
    pub registered: usize,
    pub remaining: usize,
    pub failed: Vec<FailedItem>,
    /// `Done` if nothing remains, otherwise `Scanning`.
    pub state: PassState,
}

impl PassReport {
    fn done() -> Self {
        Self {
            uploaded: 0,
            registered: 0,
            remaining: 0,
            failed: Vec::new(),
            state: PassState::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == PassState::Done
    }

    fn made_progress(&self) -> bool {
        self.uploaded > 0 || self.registered > 0
    }

    /// No further pass can move this run forward: nothing changed and
    /// every failure is permanent.
    pub fn is_stuck(&self) -> bool {
        !self.is_done() && !self.made_progress() && !self.failed.iter().any(|f| f.retryable)
    }

    fn fail(&mut self, index: ItemIndex, reason: String, retryable: bool) {
        if self.failed.iter().any(|f| f.index == index) {
            return;
        }
        self.failed.push(FailedItem {
            index,
            reason,
            retryable,
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    /// Uploads in flight at once.
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub upload_timeout: Duration,
    pub consistency: Consistency,
    /// Stop a pass after this many upload chunks. `None` runs them all.
    pub max_chunks_per_pass: Option<usize>,
    pub is_mutable: bool,
    pub retain_authority: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            retry: RetryPolicy::default(),
            upload_timeout: Duration::from_secs(120),
            consistency: Consistency::default(),
            max_chunks_per_pass: None,
            is_mutable: true,
            retain_authority: true,
        }
    }
}

/// Drives uploads and config registration for one `(cache name, env)`.
pub struct Reconciler {
    cache: Arc<dyn CacheStore>,
    scheduler: UploadScheduler,
    registry: Arc<dyn ConfigRegistry>,
    cache_name: String,
    env: Cluster,
    settings: SyncSettings,
}

impl Reconciler {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        uploader: Arc<dyn StorageUploader>,
        registry: Arc<dyn ConfigRegistry>,
        cache_name: impl Into<String>,
        env: Cluster,
        settings: SyncSettings,
    ) -> Self {
        let scheduler = UploadScheduler::new(uploader, settings.retry.clone(), settings.upload_timeout);
        Self {
            cache,
            scheduler,
            registry,
            cache_name: cache_name.into(),
            env,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one pass.
    ///
    /// Upload failures are reported per item and never stop the pass. A
    /// ledger failure aborts the pass with [`SyncError::Ledger`]; everything
    /// saved before it is kept.
    pub async fn run_pass(&self, items: &ItemSet) -> SyncResult<PassReport> {
        let total = items.total();

        // Scanning
        let mut cache = self.cache.load_or_seed(&self.cache_name, self.env)?;
        if let Some((&last, _)) = cache.items.last_key_value() {
            if last >= total {
                return Err(SyncError::Configuration(format!(
                    "cache {} has item {last} but {} holds only {total} items",
                    self.cache_name,
                    items.dir.display()
                )));
            }
        }
        if self.settings.consistency == Consistency::VerifyOnChain {
            if let Some(config) = config_address(&cache)? {
                let lines = self.registry.committed_lines(&config).await?;
                if adopt_chain(&mut cache, &lines, total)? > 0 {
                    self.save(&cache)?;
                }
            }
        }
        let remaining = cache.remaining(total);
        if remaining.is_empty() {
            debug!(cache = %self.cache_name, "nothing remaining");
            return Ok(PassReport::done());
        }
        info!(
            cache = %self.cache_name,
            env = %self.env,
            remaining = remaining.len(),
            uploader = self.scheduler.uploader_name(),
            "pass started"
        );

        // Working
        let config = self.ensure_config(&mut cache, items).await?;
        let mut report = PassReport {
            uploaded: 0,
            registered: 0,
            remaining: remaining.len(),
            failed: Vec::new(),
            state: PassState::Working,
        };

        let chunks = plan(&cache.missing_links(total), self.settings.chunk_size);
        let limit = self.settings.max_chunks_per_pass.unwrap_or(usize::MAX);
        if chunks.is_empty() {
            self.register_prefix(&mut cache, &config, total, &mut report).await?;
        }
        for chunk in chunks.iter().take(limit) {
            self.upload_chunk(&mut cache, items, chunk, &mut report).await?;
            self.register_prefix(&mut cache, &config, total, &mut report).await?;
        }

        // Re-scan
        report.remaining = cache.remaining(total).len();
        report.state = if report.remaining == 0 {
            PassState::Done
        } else {
            PassState::Scanning
        };
        info!(
            cache = %self.cache_name,
            uploaded = report.uploaded,
            registered = report.registered,
            remaining = report.remaining,
            failed = report.failed.len(),
            "pass finished"
        );
        Ok(report)
    }

    /// Run passes until `Done`, `max_passes` (unbounded when `None`), or
    /// a pass that is [stuck](PassReport::is_stuck). Passes that made no
    /// progress but hit retryable failures are followed by a backoff sleep.
    /// `on_pass` sees each report as it completes.
    pub async fn run_until_done(
        &self,
        items: &ItemSet,
        max_passes: Option<usize>,
        mut on_pass: impl FnMut(usize, &PassReport),
    ) -> SyncResult<PassReport> {
        let limit = max_passes.unwrap_or(usize::MAX).max(1);
        let mut idle = self.settings.retry.backoff();
        let mut pass = 0;
        loop {
            pass += 1;
            let report = self.run_pass(items).await?;
            on_pass(pass, &report);
            if report.is_done() || report.is_stuck() || pass >= limit {
                return Ok(report);
            }
            if report.made_progress() {
                idle = self.settings.retry.backoff();
            } else {
                let delay = idle.next_delay();
                info!(pass, ?delay, failed = report.failed.len(), "no progress, waiting before next pass");
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn ensure_config(&self, cache: &mut CacheFile, items: &ItemSet) -> SyncResult<Pubkey> {
        if let Some(config) = config_address(cache)? {
            return Ok(config);
        }
        let first = items
            .pair(0)
            .ok_or_else(|| SyncError::Configuration("no items to register".into()))?;
        let manifest = items::load_manifest(first).await?;
        let creators = manifest
            .creators()?
            .into_iter()
            .map(|c| {
                Pubkey::from_str(&c.address)
                    .map(|address| (address, c.share))
                    .map_err(|e| SyncError::Configuration(format!("creator address {}: {e}", c.address)))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        let settings = ConfigSettings {
            symbol: manifest.symbol().to_string(),
            seller_fee_basis_points: manifest.seller_fee_basis_points()?,
            creators,
            max_number_of_lines: items.capacity,
            is_mutable: self.settings.is_mutable,
            retain_authority: self.settings.retain_authority,
        };

        let created = self.registry.create_config(&settings).await?;
        cache.set_config(&created.uuid, &created.address.to_string())?;
        self.save(cache)?;
        info!(config = %created.address, uuid = %created.uuid, capacity = items.capacity, "config recorded");
        Ok(created.address)
    }

    async fn upload_chunk(
        &self,
        cache: &mut CacheFile,
        items: &ItemSet,
        chunk: &[ItemIndex],
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let mut payloads = Vec::with_capacity(chunk.len());
        let mut names = Vec::with_capacity(chunk.len());
        for &index in chunk {
            let Some(pair) = items.pair(index) else {
                continue;
            };
            match items::load_payload(pair).await {
                Ok((payload, name)) => {
                    payloads.push(payload);
                    names.push((index, name));
                }
                Err(e) => {
                    warn!(index, error = %e, "item unreadable");
                    report.fail(index, e.to_string(), false);
                }
            }
        }

        for outcome in self.scheduler.run_chunk(&payloads).await {
            match outcome.result {
                Ok(link) => {
                    let name = names
                        .iter()
                        .find(|(i, _)| *i == outcome.index)
                        .map(|(_, n)| n.clone())
                        .unwrap_or_default();
                    if let Err(e) = ConfigLine::new(name.as_str(), link.as_str()) {
                        warn!(index = outcome.index, %link, error = %e, "link cannot be registered");
                        report.fail(outcome.index, e.to_string(), false);
                        continue;
                    }
                    cache.set_link(outcome.index, name, link);
                    report.uploaded += 1;
                }
                Err(e) => report.fail(outcome.index, e.to_string(), e.is_retryable()),
            }
        }
        self.save(cache)
    }

    /// Write the uploaded run starting at the committed prefix, at most
    /// [`CONFIG_LINES_PER_TX`] lines per transaction. The run ends at the
    /// first item without a link, already on chain, or that cannot be
    /// stored as a config line.
    async fn register_prefix(
        &self,
        cache: &mut CacheFile,
        config: &Pubkey,
        total: u32,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let start = cache.committed_prefix();
        let mut run = Vec::new();
        for index in start..total {
            if cache.is_on_chain(index) {
                break;
            }
            let Some(item) = cache.item(index) else {
                break;
            };
            let Some(link) = item.link.as_deref() else {
                break;
            };
            match ConfigLine::new(item.name.as_str(), link) {
                Ok(line) => run.push(line),
                Err(e) => {
                    warn!(index, error = %e, "cached item cannot be registered");
                    report.fail(index, e.to_string(), false);
                    break;
                }
            }
        }

        let mut batch_start = start;
        for lines in run.chunks(CONFIG_LINES_PER_TX) {
            self.registry.append_lines(config, batch_start, lines).await?;
            let batch_end = batch_start + lines.len() as u32;
            for i in batch_start..batch_end {
                cache.mark_on_chain(i)?;
            }
            self.save(cache)?;
            debug!(%config, start = batch_start, count = lines.len(), "config lines registered");
            report.registered += lines.len();
            batch_start = batch_end;
        }
        Ok(())
    }

    fn save(&self, cache: &CacheFile) -> SyncResult<()> {
        self.cache.save(&self.cache_name, self.env, cache)?;
        Ok(())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("cache_name", &self.cache_name)
            .field("env", &self.env)
            .field("scheduler", &self.scheduler)
            .field("settings", &self.settings)
            .finish()
    }
}

/// The config address recorded in the cache, if any.
pub fn config_address(cache: &CacheFile) -> SyncResult<Option<Pubkey>> {
    cache
        .program
        .config
        .as_deref()
        .map(|c| {
            Pubkey::from_str(c).map_err(|e| SyncError::Configuration(format!("cached config address {c}: {e}")))
        })
        .transpose()
}

/// Make the cache agree with the chain for `0..total`. Returns the number
/// of items changed.
fn adopt_chain(cache: &mut CacheFile, lines: &[Option<ConfigLine>], total: u32) -> SyncResult<usize> {
    let mut changed = 0;
    for index in 0..total {
        match lines.get(index as usize).cloned().flatten() {
            Some(line) => {
                if cache.is_on_chain(index) && cache.link(index) == Some(line.uri.as_str()) {
                    continue;
                }
                cache.set_link(index, line.name, line.uri);
                cache.mark_on_chain(index)?;
                changed += 1;
            }
            None if cache.is_on_chain(index) => {
                cache.reset_on_chain(index);
                changed += 1;
            }
            None => {}
        }
    }
    if changed > 0 {
        info!(changed, "cache updated from on-chain config");
    }
    Ok(changed)
}

/// Outcome of [`verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Items whose slot matches the cache.
    pub verified: usize,
    /// Items whose `onChain` flag was cleared.
    pub reset: Vec<ItemIndex>,
}

/// Compare every cached item with its on-chain slot. Mismatching items get
/// their `onChain` flag cleared so the next upload re-registers them.
pub async fn verify(
    store: &dyn CacheStore,
    cache_name: &str,
    env: Cluster,
    registry: &dyn ConfigRegistry,
) -> SyncResult<VerifyReport> {
    let mut cache = store.load(cache_name, env)?;
    let config = config_address(&cache)?
        .ok_or_else(|| SyncError::Configuration(format!("cache {cache_name} has no config account")))?;
    let lines = registry.committed_lines(&config).await?;

    let mut report = VerifyReport::default();
    let indexes: Vec<ItemIndex> = cache.items.keys().copied().collect();
    for index in indexes {
        let expected = cache.item(index).cloned().unwrap_or_default();
        let matches = match lines.get(index as usize).cloned().flatten() {
            Some(line) => expected.link.as_deref() == Some(line.uri.as_str()) && expected.name == line.name,
            None => false,
        };
        if matches {
            report.verified += 1;
        } else {
            warn!(index, name = %expected.name, "slot does not match cache");
            cache.reset_on_chain(index);
            report.reset.push(index);
        }
    }
    store.save(cache_name, env, &cache)?;
    info!(%config, verified = report.verified, reset = report.reset.len(), "verification finished");
    Ok(report)
}
