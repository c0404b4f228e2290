use async_trait::async_trait;
use cndy_types::ConfigLine;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::program::instructions::{self, ConfigData, Creator};
use crate::program::{accounts, config_account_size, uuid_from_config, CONFIG_LINES_PER_TX, MAX_CREATORS};
use crate::submitter::TransactionSubmitter;

/// Collection-wide settings written when the config account is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSettings {
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    /// `(address, share)` pairs; shares sum to 100.
    pub creators: Vec<(Pubkey, u8)>,
    pub max_number_of_lines: u32,
    pub is_mutable: bool,
    pub retain_authority: bool,
}

impl ConfigSettings {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.creators.len() > MAX_CREATORS {
            return Err(LedgerError::Configuration(format!(
                "at most {MAX_CREATORS} creators are allowed, got {}",
                self.creators.len()
            )));
        }
        if !self.creators.is_empty() {
            let total: u32 = self.creators.iter().map(|(_, s)| *s as u32).sum();
            if total != 100 {
                return Err(LedgerError::Configuration(format!(
                    "creator shares must sum to 100, got {total}"
                )));
            }
        }
        if self.seller_fee_basis_points > 10_000 {
            return Err(LedgerError::Configuration(
                "seller_fee_basis_points must not exceed 10000".into(),
            ));
        }
        Ok(())
    }
}

/// A config account created on-chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedConfig {
    pub address: Pubkey,
    pub uuid: String,
}

/// The on-chain registry of config lines.
#[async_trait]
pub trait ConfigRegistry: Send + Sync {
    /// Create a config account sized for `settings.max_number_of_lines`.
    async fn create_config(&self, settings: &ConfigSettings) -> LedgerResult<CreatedConfig>;

    /// The written slots of `config`, in index order. Slots below the
    /// reported count that were never written are `None`.
    async fn committed_lines(&self, config: &Pubkey) -> LedgerResult<Vec<Option<ConfigLine>>>;

    /// Write `lines` at slots `start..start + lines.len()` in one
    /// transaction. At most [`CONFIG_LINES_PER_TX`] lines.
    async fn append_lines(&self, config: &Pubkey, start: u32, lines: &[ConfigLine]) -> LedgerResult<()>;
}

/// Reject batches one transaction cannot carry.
pub fn check_batch(lines: &[ConfigLine]) -> LedgerResult<()> {
    if lines.is_empty() {
        return Err(LedgerError::Configuration("empty config line batch".into()));
    }
    if lines.len() > CONFIG_LINES_PER_TX {
        return Err(LedgerError::Configuration(format!(
            "{} config lines exceed the per-transaction limit of {CONFIG_LINES_PER_TX}",
            lines.len()
        )));
    }
    Ok(())
}

/// [`ConfigRegistry`] backed by the candy machine program.
#[derive(Debug)]
pub struct CandyMachineRegistry {
    submitter: TransactionSubmitter,
    program_id: Pubkey,
}

impl CandyMachineRegistry {
    pub fn new(submitter: TransactionSubmitter, program_id: Pubkey) -> Self {
        Self {
            submitter,
            program_id,
        }
    }

    pub fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }
}

#[async_trait]
impl ConfigRegistry for CandyMachineRegistry {
    async fn create_config(&self, settings: &ConfigSettings) -> LedgerResult<CreatedConfig> {
        settings.validate()?;
        let payer = self.submitter.payer();
        let config = Keypair::new();
        let address = config.pubkey();
        let uuid = uuid_from_config(&address);

        let size = config_account_size(settings.max_number_of_lines);
        let lamports = self
            .submitter
            .client()
            .get_minimum_balance_for_rent_exemption(size)
            .await?;

        let data = ConfigData {
            uuid: uuid.clone(),
            symbol: settings.symbol.clone(),
            seller_fee_basis_points: settings.seller_fee_basis_points,
            creators: settings
                .creators
                .iter()
                .map(|(address, share)| Creator {
                    address: address.to_bytes(),
                    verified: true,
                    share: *share,
                })
                .collect(),
            max_supply: 0,
            is_mutable: settings.is_mutable,
            retain_authority: settings.retain_authority,
            max_number_of_lines: settings.max_number_of_lines,
        };
        let ixs = [
            system_instruction::create_account(&payer, &address, lamports, size as u64, &self.program_id),
            instructions::initialize_config(&self.program_id, &address, &payer, &payer, &data)?,
        ];

        let sig = self.submitter.submit(&ixs, &[&config]).await?;
        info!(config = %address, %uuid, %sig, size, "config account created");
        Ok(CreatedConfig { address, uuid })
    }

    async fn committed_lines(&self, config: &Pubkey) -> LedgerResult<Vec<Option<ConfigLine>>> {
        let account = self
            .submitter
            .client()
            .get_account(config)
            .await?
            .ok_or(LedgerError::AccountNotFound(*config))?;
        if account.owner != self.program_id {
            return Err(LedgerError::InvalidAccountData(format!(
                "config {config} is owned by {}, not the candy machine program",
                account.owner
            )));
        }
        accounts::parse_config_lines(&account.data)
    }

    async fn append_lines(&self, config: &Pubkey, start: u32, lines: &[ConfigLine]) -> LedgerResult<()> {
        check_batch(lines)?;
        let payer = self.submitter.payer();
        let ix = instructions::add_config_lines(&self.program_id, config, &payer, start, lines)?;
        let sig = self.submitter.submit(&[ix], &[]).await?;
        debug!(%config, start, count = lines.len(), %sig, "config lines written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConfigSettings {
        ConfigSettings {
            symbol: "CNDY".into(),
            seller_fee_basis_points: 500,
            creators: vec![(Pubkey::new_unique(), 60), (Pubkey::new_unique(), 40)],
            max_number_of_lines: 3,
            is_mutable: true,
            retain_authority: true,
        }
    }

    #[test]
    fn settings_validation() {
        assert!(settings().validate().is_ok());

        let mut s = settings();
        s.creators[0].1 = 10;
        assert!(s.validate().unwrap_err().to_string().contains("sum to 100"));

        let mut s = settings();
        s.creators = (0..6).map(|_| (Pubkey::new_unique(), 0)).collect();
        assert!(s.validate().is_err());

        let mut s = settings();
        s.creators.clear();
        assert!(s.validate().is_ok());
    }

    #[tokio::test]
    async fn candy_machine_registry_round_trip() {
        use std::sync::Arc;
        use std::time::Duration;

        use cndy_types::RetryPolicy;
        use solana_sdk::account::Account;

        use crate::memory::InMemoryLedgerClient;
        use crate::program::CANDY_MACHINE_PROGRAM_ID;
        use crate::submitter::SubmitPolicy;

        let client = Arc::new(InMemoryLedgerClient::new());
        let submitter = TransactionSubmitter::new(
            client.clone(),
            Arc::new(Keypair::new()),
            SubmitPolicy {
                retry: RetryPolicy::immediate(2),
                confirm_timeout: Duration::ZERO,
                poll_interval: Duration::ZERO,
            },
        );
        let registry = CandyMachineRegistry::new(submitter, CANDY_MACHINE_PROGRAM_ID);

        let created = registry.create_config(&settings()).await.unwrap();
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.instructions.len(), 2);
        // payer + the new config account
        assert_eq!(sent[0].signatures.len(), 2);

        assert!(matches!(
            registry.committed_lines(&created.address).await,
            Err(LedgerError::AccountNotFound(_))
        ));

        let first = ConfigLine::new("#0", "https://arweave.net/0").unwrap();
        let mut data = vec![0u8; config_account_size(3)];
        accounts::write_config_lines(&mut data, 0, &[first.clone()]).unwrap();
        client.set_account(
            created.address,
            Account {
                lamports: 1,
                data,
                owner: CANDY_MACHINE_PROGRAM_ID,
                executable: false,
                rent_epoch: 0,
            },
        );
        assert_eq!(
            registry.committed_lines(&created.address).await.unwrap(),
            vec![Some(first.clone())]
        );

        registry
            .append_lines(&created.address, 1, &[first.clone()])
            .await
            .unwrap();
        assert_eq!(client.sent().len(), 2);

        let too_many = vec![first; CONFIG_LINES_PER_TX + 1];
        assert!(registry.append_lines(&created.address, 1, &too_many).await.is_err());
        assert_eq!(client.sent().len(), 2);
    }

    #[test]
    fn batch_limits() {
        let line = ConfigLine::new("a", "b").unwrap();
        assert!(check_batch(&[]).is_err());
        assert!(check_batch(&vec![line.clone(); CONFIG_LINES_PER_TX]).is_ok());
        assert!(check_batch(&vec![line; CONFIG_LINES_PER_TX + 1]).is_err());
    }
}
