use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use cndy_types::ConfigLine;
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;

use crate::client::{LedgerClient, SignatureStatus};
use crate::error::{LedgerError, LedgerResult};
use crate::program::uuid_from_config;
use crate::registry::{check_batch, ConfigRegistry, ConfigSettings, CreatedConfig};

/// Scripted result of one `send_transaction` call.
#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// Accepted and confirmed.
    Land,
    /// Refused before reaching the ledger.
    Fail(LedgerError),
    /// Lands and confirms, but the caller sees `error`.
    LandThenFail(LedgerError),
    /// Accepted but never confirms.
    Stall,
    /// Accepted and pending; lands when the next transaction is sent.
    LandLate,
    /// Accepted, then dropped: never confirms and its blockhash expires.
    Drop,
}

#[derive(Default)]
struct ClientState {
    accounts: HashMap<Pubkey, Account>,
    script: VecDeque<SendOutcome>,
    sent: Vec<Transaction>,
    landed: Vec<Signature>,
    statuses: HashMap<Signature, SignatureStatus>,
    late: Vec<Signature>,
    expired: HashSet<Hash>,
    rent_per_byte: u64,
}

/// In-memory [`LedgerClient`] with scripted send outcomes. Transactions
/// are recorded, not executed.
pub struct InMemoryLedgerClient {
    inner: RwLock<ClientState>,
}

impl InMemoryLedgerClient {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ClientState {
                rent_per_byte: 6_960,
                ..Default::default()
            }),
        }
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.accounts.insert(address, account);
    }

    /// Give `address` a system-owned account holding `lamports`.
    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.set_account(
            address,
            Account {
                lamports,
                data: Vec::new(),
                owner: system_program::ID,
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    /// Queue the outcome of the next send. Unscripted sends land.
    pub fn script(&self, outcome: SendOutcome) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.script.push_back(outcome);
    }

    /// Every transaction handed to `send_transaction`, in order.
    pub fn sent(&self) -> Vec<Transaction> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.sent.clone()
    }

    /// Signatures of transactions that landed.
    pub fn landed(&self) -> Vec<Signature> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.landed.clone()
    }
}

impl Default for InMemoryLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryLedgerClient")
            .field("accounts", &inner.accounts.len())
            .field("sent", &inner.sent.len())
            .field("landed", &inner.landed.len())
            .finish()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedgerClient {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.accounts.get(address).cloned())
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.accounts.get(address).map(|a| a.lamports).unwrap_or(0))
    }

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash> {
        Ok(Hash::new_unique())
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(!inner.expired.contains(blockhash))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok((128 + data_len as u64) * inner.rent_per_byte)
    }

    async fn send_transaction(&self, tx: &Transaction) -> LedgerResult<Signature> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let sig = tx.signatures.first().copied().unwrap_or_default();
        inner.sent.push(tx.clone());
        for late in std::mem::take(&mut inner.late) {
            inner.landed.push(late);
            inner.statuses.insert(late, SignatureStatus::Confirmed);
        }
        if inner.statuses.get(&sig) == Some(&SignatureStatus::Confirmed) {
            return Err(LedgerError::AlreadyProcessed);
        }
        match inner.script.pop_front().unwrap_or(SendOutcome::Land) {
            SendOutcome::Land => {
                inner.landed.push(sig);
                inner.statuses.insert(sig, SignatureStatus::Confirmed);
                Ok(sig)
            }
            SendOutcome::Fail(e) => Err(e),
            SendOutcome::LandThenFail(e) => {
                inner.landed.push(sig);
                inner.statuses.insert(sig, SignatureStatus::Confirmed);
                Err(e)
            }
            SendOutcome::Stall => {
                inner.statuses.insert(sig, SignatureStatus::Pending);
                Ok(sig)
            }
            SendOutcome::LandLate => {
                inner.statuses.insert(sig, SignatureStatus::Pending);
                inner.late.push(sig);
                Ok(sig)
            }
            SendOutcome::Drop => {
                inner.statuses.insert(sig, SignatureStatus::Pending);
                inner.expired.insert(tx.message.recent_blockhash);
                Ok(sig)
            }
        }
    }

    async fn signature_status(&self, signature: &Signature) -> LedgerResult<SignatureStatus> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }
}

/// Scripted fault for the next registry write.
#[derive(Clone, Debug)]
pub enum RegistryFault {
    /// The write fails without touching the ledger.
    Before(LedgerError),
    /// The write is applied, then the caller sees `error`.
    After(LedgerError),
}

struct ConfigState {
    capacity: u32,
    lines: Vec<Option<ConfigLine>>,
}

#[derive(Default)]
struct RegistryState {
    configs: HashMap<Pubkey, ConfigState>,
    faults: VecDeque<RegistryFault>,
    create_count: usize,
    append_count: usize,
    slot_writes: HashMap<u32, usize>,
}

/// In-memory [`ConfigRegistry`] that applies writes directly and counts
/// them.
pub struct InMemoryRegistry {
    inner: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryState::default()),
        }
    }

    /// Fault the next write (create or append).
    pub fn inject(&self, fault: RegistryFault) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.faults.push_back(fault);
    }

    /// Config accounts created.
    pub fn create_count(&self) -> usize {
        let inner = self.inner.read().expect("lock poisoned");
        inner.create_count
    }

    /// Append transactions applied.
    pub fn append_count(&self) -> usize {
        let inner = self.inner.read().expect("lock poisoned");
        inner.append_count
    }

    /// How many times slot `index` was written across all configs.
    pub fn slot_writes(&self, index: u32) -> usize {
        let inner = self.inner.read().expect("lock poisoned");
        inner.slot_writes.get(&index).copied().unwrap_or(0)
    }

    pub fn lines(&self, config: &Pubkey) -> Vec<Option<ConfigLine>> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .configs
            .get(config)
            .map(|c| c.lines.clone())
            .unwrap_or_default()
    }

    /// Overwrite a slot directly, as another writer would.
    pub fn tamper(&self, config: &Pubkey, index: u32, line: Option<ConfigLine>) {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(cfg) = inner.configs.get_mut(config) {
            let i = index as usize;
            if cfg.lines.len() <= i {
                cfg.lines.resize(i + 1, None);
            }
            cfg.lines[i] = line;
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryRegistry")
            .field("configs", &inner.configs.len())
            .field("append_count", &inner.append_count)
            .finish()
    }
}

#[async_trait]
impl ConfigRegistry for InMemoryRegistry {
    async fn create_config(&self, settings: &ConfigSettings) -> LedgerResult<CreatedConfig> {
        settings.validate()?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let fault = inner.faults.pop_front();
        if let Some(RegistryFault::Before(e)) = &fault {
            return Err(e.clone());
        }

        let address = Pubkey::new_unique();
        inner.configs.insert(
            address,
            ConfigState {
                capacity: settings.max_number_of_lines,
                lines: Vec::new(),
            },
        );
        inner.create_count += 1;

        match fault {
            Some(RegistryFault::After(e)) => Err(e),
            _ => Ok(CreatedConfig {
                address,
                uuid: uuid_from_config(&address),
            }),
        }
    }

    async fn committed_lines(&self, config: &Pubkey) -> LedgerResult<Vec<Option<ConfigLine>>> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .configs
            .get(config)
            .map(|c| c.lines.clone())
            .ok_or(LedgerError::AccountNotFound(*config))
    }

    async fn append_lines(&self, config: &Pubkey, start: u32, lines: &[ConfigLine]) -> LedgerResult<()> {
        check_batch(lines)?;
        for line in lines {
            line.validate()?;
        }
        let mut inner = self.inner.write().expect("lock poisoned");
        let fault = inner.faults.pop_front();
        if let Some(RegistryFault::Before(e)) = &fault {
            return Err(e.clone());
        }

        let cfg = inner
            .configs
            .get_mut(config)
            .ok_or(LedgerError::AccountNotFound(*config))?;
        let end = start as usize + lines.len();
        if end > cfg.capacity as usize {
            return Err(LedgerError::Rejected(format!(
                "lines {start}..{end} exceed config capacity {}",
                cfg.capacity
            )));
        }
        if cfg.lines.len() < end {
            cfg.lines.resize(end, None);
        }
        for (offset, line) in lines.iter().enumerate() {
            cfg.lines[start as usize + offset] = Some(line.clone());
        }
        inner.append_count += 1;
        for offset in 0..lines.len() as u32 {
            *inner.slot_writes.entry(start + offset).or_insert(0) += 1;
        }

        match fault {
            Some(RegistryFault::After(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(lines: u32) -> ConfigSettings {
        ConfigSettings {
            symbol: String::new(),
            seller_fee_basis_points: 0,
            creators: Vec::new(),
            max_number_of_lines: lines,
            is_mutable: true,
            retain_authority: true,
        }
    }

    fn line(i: u32) -> ConfigLine {
        ConfigLine::new(format!("#{i}"), format!("mem://{i}")).unwrap()
    }

    #[tokio::test]
    async fn registry_appends_and_reads_back() {
        let reg = InMemoryRegistry::new();
        let cfg = reg.create_config(&settings(4)).await.unwrap();
        assert_eq!(cfg.uuid.len(), 6);
        reg.append_lines(&cfg.address, 0, &[line(0), line(1)]).await.unwrap();
        reg.append_lines(&cfg.address, 2, &[line(2)]).await.unwrap();

        let lines = reg.committed_lines(&cfg.address).await.unwrap();
        assert_eq!(lines, vec![Some(line(0)), Some(line(1)), Some(line(2))]);
        assert_eq!(reg.append_count(), 2);
    }

    #[tokio::test]
    async fn registry_enforces_capacity() {
        let reg = InMemoryRegistry::new();
        let cfg = reg.create_config(&settings(2)).await.unwrap();
        let err = reg
            .append_lines(&cfg.address, 1, &[line(1), line(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert_eq!(reg.append_count(), 0);
    }

    #[tokio::test]
    async fn fault_after_apply_still_writes() {
        let reg = InMemoryRegistry::new();
        let cfg = reg.create_config(&settings(2)).await.unwrap();
        reg.inject(RegistryFault::After(LedgerError::Transient("lost response".into())));
        assert!(reg.append_lines(&cfg.address, 0, &[line(0)]).await.is_err());
        assert_eq!(reg.lines(&cfg.address), vec![Some(line(0))]);
    }

    #[tokio::test]
    async fn unknown_config() {
        let reg = InMemoryRegistry::new();
        let missing = Pubkey::new_unique();
        assert_eq!(
            reg.committed_lines(&missing).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
    }

    #[tokio::test]
    async fn client_scripts_run_in_order() {
        let client = InMemoryLedgerClient::new();
        client.script(SendOutcome::Fail(LedgerError::Transient("busy".into())));
        let tx = Transaction::default();
        assert!(client.send_transaction(&tx).await.is_err());
        assert!(client.send_transaction(&tx).await.is_ok());
        assert_eq!(client.sent().len(), 2);
        assert_eq!(client.landed().len(), 1);
    }
}
