//! Optional TOML settings file. Every field has a default; flags given on
//! the command line win over the file.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use cndy_ledger::{Pubkey, SubmitPolicy, CANDY_MACHINE_PROGRAM_ID, DEFAULT_SECONDARY_PROGRAM_ID};
use cndy_storage::{StorageKind, StorageOptions};
use cndy_sync::{Consistency, SweepSettings, SyncSettings};
use cndy_types::{parse_price, RetryPolicy, LAMPORTS_DECIMALS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub upload: UploadSection,
    pub retry: RetryPolicy,
    pub ledger: LedgerSection,
    pub storage: StorageSection,
    pub sweep: SweepSection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSection {
    pub chunk_size: usize,
    pub upload_timeout_secs: u64,
    pub consistency: Consistency,
    pub max_chunks_per_pass: Option<usize>,
}

impl Default for UploadSection {
    fn default() -> Self {
        let defaults = SyncSettings::default();
        Self {
            chunk_size: defaults.chunk_size,
            upload_timeout_secs: defaults.upload_timeout.as_secs(),
            consistency: defaults.consistency,
            max_chunks_per_pass: defaults.max_chunks_per_pass,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    pub rpc_url: Option<String>,
    pub program_id: Option<String>,
    pub confirm_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        let defaults = SubmitPolicy::default();
        Self {
            rpc_url: None,
            program_id: None,
            confirm_timeout_secs: defaults.confirm_timeout.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub kind: Option<StorageKind>,
    pub request_timeout_secs: u64,
    #[serde(flatten)]
    pub options: StorageOptions,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: None,
            request_timeout_secs: 60,
            options: StorageOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    /// Decimal SOL.
    pub min_balance: String,
    pub program: Option<String>,
    pub secondary_program: Option<String>,
    pub split_percent: u8,
    pub split_recipient: Option<String>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            min_balance: "10".into(),
            program: None,
            secondary_program: None,
            split_percent: 0,
            split_recipient: None,
        }
    }
}

impl Settings {
    /// Read `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn sync_settings(&self, is_mutable: bool, retain_authority: bool) -> SyncSettings {
        SyncSettings {
            chunk_size: self.upload.chunk_size,
            retry: self.retry.clone(),
            upload_timeout: Duration::from_secs(self.upload.upload_timeout_secs),
            consistency: self.upload.consistency,
            max_chunks_per_pass: self.upload.max_chunks_per_pass,
            is_mutable,
            retain_authority,
        }
    }

    pub fn submit_policy(&self) -> SubmitPolicy {
        SubmitPolicy {
            retry: self.retry.clone(),
            confirm_timeout: Duration::from_secs(self.ledger.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.ledger.poll_interval_ms),
        }
    }

    pub fn program_id(&self) -> anyhow::Result<Pubkey> {
        pubkey_or(self.ledger.program_id.as_deref(), CANDY_MACHINE_PROGRAM_ID)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.request_timeout_secs)
    }

    /// Sweep settings from the file, overridden by whatever flags were given.
    pub fn sweep_settings(
        &self,
        min_balance: Option<&str>,
        split_recipient: Option<Pubkey>,
        split_percent: Option<u8>,
        dry_run: bool,
    ) -> anyhow::Result<SweepSettings> {
        let min_balance = min_balance.unwrap_or(&self.sweep.min_balance);
        let split_recipient = match split_recipient {
            Some(r) => Some(r),
            None => self
                .sweep
                .split_recipient
                .as_deref()
                .map(|r| Pubkey::from_str(r).with_context(|| format!("sweep split recipient {r}")))
                .transpose()?,
        };
        Ok(SweepSettings {
            min_balance_lamports: parse_price(min_balance, LAMPORTS_DECIMALS)?,
            program: pubkey_or(self.sweep.program.as_deref(), CANDY_MACHINE_PROGRAM_ID)?,
            secondary_program: pubkey_or(self.sweep.secondary_program.as_deref(), DEFAULT_SECONDARY_PROGRAM_ID)?,
            split_percent: split_percent.unwrap_or(self.sweep.split_percent),
            split_recipient,
            dry_run,
        })
    }
}

fn pubkey_or(value: Option<&str>, default: Pubkey) -> anyhow::Result<Pubkey> {
    match value {
        Some(v) => Pubkey::from_str(v).with_context(|| format!("invalid address {v}")),
        None => Ok(default),
    }
}
