//! Candy machine lifecycle: create, update, mint, withdraw, and the
//! multi-deployment sweep.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use cndy_cache::CacheStore;
use cndy_ledger::program::accounts::{parse_config_header, CandyMachineAccount};
use cndy_ledger::program::instructions::{self, CandyMachineData, InitializeCandyMachineAccounts, MintNftAccounts, SweepWithdraw};
use cndy_ledger::program::{candy_machine_address, master_edition_address, metadata_address, token};
use cndy_ledger::{
    LedgerError, Pubkey, Signature, TransactionSubmitter, CANDY_MACHINE_PROGRAM_ID, DEFAULT_SECONDARY_PROGRAM_ID,
};
use cndy_types::{parse_price, CacheFile, Cluster, LAMPORTS_DECIMALS};
use serde::Deserialize;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::reconcile::config_address;

/// Options of `create_candy_machine`.
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// Decimal price in SOL, or in the SPL token when `spl_token` is set.
    pub price: String,
    pub spl_token: Option<Pubkey>,
    /// Token account receiving SPL payments.
    pub spl_token_account: Option<Pubkey>,
    /// Account receiving SOL payments. Defaults to the operator wallet.
    pub sol_treasury: Option<Pubkey>,
    pub go_live_date: Option<i64>,
}

impl CreateOptions {
    /// Reject contradictory payment flags before touching the network.
    pub fn validate(&self) -> SyncResult<()> {
        if self.spl_token.is_some() || self.spl_token_account.is_some() {
            if self.sol_treasury.is_some() {
                return Err(SyncError::Configuration(
                    "if spl-token-account or spl-token is set then sol-treasury-account cannot be set".into(),
                ));
            }
            if self.spl_token.is_none() {
                return Err(SyncError::Configuration(
                    "if spl-token-account is set, spl-token must also be set".into(),
                ));
            }
            if self.spl_token_account.is_none() {
                return Err(SyncError::Configuration(
                    "if spl-token is set, spl-token-account must also be set".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedCandyMachine {
    pub address: Pubkey,
    /// Treasury receiving mint payments.
    pub wallet: Pubkey,
    /// Price in base units of the payment currency.
    pub price: u64,
    pub items_available: u64,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawReport {
    pub candy_machine: Pubkey,
    pub lamports: u64,
    /// `None` for a dry run.
    pub signature: Option<Signature>,
}

/// One deployment: a cache record plus the program it was created with.
pub struct Deployment {
    cache: Arc<dyn CacheStore>,
    cache_name: String,
    env: Cluster,
    submitter: Arc<TransactionSubmitter>,
    program_id: Pubkey,
}

impl Deployment {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        cache_name: impl Into<String>,
        env: Cluster,
        submitter: Arc<TransactionSubmitter>,
        program_id: Pubkey,
    ) -> Self {
        Self {
            cache,
            cache_name: cache_name.into(),
            env,
            submitter,
            program_id,
        }
    }

    /// Create the candy machine for a fully registered cache and record its
    /// address.
    pub async fn create_candy_machine(&self, opts: &CreateOptions) -> SyncResult<CreatedCandyMachine> {
        opts.validate()?;
        let mut cache = self.cache.load(&self.cache_name, self.env)?;
        if let Some(existing) = &cache.program.candy_machine {
            return Err(SyncError::Configuration(format!(
                "cache {} already has candy machine {existing}",
                self.cache_name
            )));
        }
        let (config, uuid) = self.config_of(&cache)?;
        let counts = cache.counts();
        if counts.items == 0 || counts.on_chain != counts.items {
            return Err(SyncError::Configuration(format!(
                "only {} of {} items are registered; finish the upload first",
                counts.on_chain, counts.items
            )));
        }

        let payer = self.submitter.payer();
        let (wallet, price, token_mint) = match (opts.spl_token, opts.spl_token_account) {
            (Some(mint), Some(account)) => {
                let decimals = self.check_spl_treasury(&mint, &account).await?;
                (account, parse_price(&opts.price, decimals)?, Some(mint))
            }
            _ => (
                opts.sol_treasury.unwrap_or(payer),
                parse_price(&opts.price, LAMPORTS_DECIMALS)?,
                None,
            ),
        };

        let (candy_machine, bump) = candy_machine_address(&config, &uuid, &self.program_id);
        let data = CandyMachineData {
            uuid,
            price,
            items_available: counts.items as u64,
            go_live_date: opts.go_live_date,
        };
        let ix = instructions::initialize_candy_machine(
            &self.program_id,
            &InitializeCandyMachineAccounts {
                candy_machine,
                wallet,
                config,
                authority: payer,
                payer,
                token_mint,
            },
            bump,
            &data,
        )?;
        let signature = self.submitter.submit(&[ix], &[]).await?;

        cache.set_candy_machine(&candy_machine.to_string())?;
        self.cache.save(&self.cache_name, self.env, &cache)?;
        info!(%candy_machine, %wallet, price, items = data.items_available, %signature, "candy machine created");
        Ok(CreatedCandyMachine {
            address: candy_machine,
            wallet,
            price,
            items_available: data.items_available,
            signature,
        })
    }

    /// Change the price and/or go-live date. The price is read in the
    /// candy machine's payment currency.
    pub async fn update_candy_machine(&self, price: Option<&str>, go_live_date: Option<i64>) -> SyncResult<Signature> {
        if price.is_none() && go_live_date.is_none() {
            return Err(SyncError::Configuration("nothing to update: give a price or a go-live date".into()));
        }
        let candy_machine = self.candy_machine()?;
        let price = match price {
            Some(p) => {
                let account = self.fetch_candy_machine(&candy_machine).await?;
                let decimals = match account.token_mint() {
                    Some(mint) => self.mint_decimals(&mint).await?,
                    None => LAMPORTS_DECIMALS,
                };
                Some(parse_price(p, decimals)?)
            }
            None => None,
        };

        let ix = instructions::update_candy_machine(
            &self.program_id,
            &candy_machine,
            &self.submitter.payer(),
            price,
            go_live_date,
        )?;
        let signature = self.submitter.submit(&[ix], &[]).await?;
        info!(%candy_machine, ?price, ?go_live_date, %signature, "candy machine updated");
        Ok(signature)
    }

    /// Mint one token to the operator wallet. Returns the new mint.
    pub async fn mint_one(&self) -> SyncResult<Pubkey> {
        let candy_machine = self.candy_machine()?;
        let account = self.fetch_candy_machine(&candy_machine).await?;
        if account.token_mint().is_some() {
            return Err(SyncError::Configuration(
                "minting from a candy machine priced in an SPL token is not supported".into(),
            ));
        }
        if account.items_redeemed >= account.items_available {
            return Err(SyncError::Configuration(format!(
                "candy machine {candy_machine} is sold out ({} of {})",
                account.items_redeemed, account.items_available
            )));
        }

        let payer = self.submitter.payer();
        let mint = Keypair::new();
        let mint_address = mint.pubkey();
        let rent = self
            .submitter
            .client()
            .get_minimum_balance_for_rent_exemption(token::MINT_LEN)
            .await?;
        let ata = token::associated_token_address(&payer, &mint_address);
        let ixs = [
            system_instruction::create_account(&payer, &mint_address, rent, token::MINT_LEN as u64, &token::TOKEN_PROGRAM_ID),
            token::initialize_mint(&mint_address, &payer, 0),
            token::create_associated_token_account(&payer, &payer, &mint_address),
            token::mint_to(&mint_address, &ata, &payer, 1),
            instructions::mint_nft(
                &self.program_id,
                &MintNftAccounts {
                    config: account.config(),
                    candy_machine,
                    payer,
                    wallet: account.wallet(),
                    mint: mint_address,
                    metadata: metadata_address(&mint_address),
                    master_edition: master_edition_address(&mint_address),
                },
            )?,
        ];
        let signature = self.submitter.submit(&ixs, &[&mint]).await?;
        info!(%candy_machine, mint = %mint_address, %signature, "token minted");
        Ok(mint_address)
    }

    /// Withdraw the candy machine's funds to the operator.
    pub async fn withdraw(&self, dry_run: bool) -> SyncResult<WithdrawReport> {
        let candy_machine = self.candy_machine()?;
        let lamports = self.submitter.client().get_balance(&candy_machine).await?;
        if dry_run {
            info!(%candy_machine, lamports, "dry run: withdrawal not sent");
            return Ok(WithdrawReport {
                candy_machine,
                lamports,
                signature: None,
            });
        }
        let ix = instructions::withdraw_funds(&self.program_id, &candy_machine, &self.submitter.payer())?;
        let signature = self.submitter.submit(&[ix], &[]).await?;
        info!(%candy_machine, lamports, %signature, "funds withdrawn");
        Ok(WithdrawReport {
            candy_machine,
            lamports,
            signature: Some(signature),
        })
    }

    fn config_of(&self, cache: &CacheFile) -> SyncResult<(Pubkey, String)> {
        let config = config_address(cache)?
            .ok_or_else(|| SyncError::Configuration(format!("cache {} has no config account", self.cache_name)))?;
        let uuid = cache
            .program
            .uuid
            .clone()
            .ok_or_else(|| SyncError::Configuration(format!("cache {} has no uuid", self.cache_name)))?;
        Ok((config, uuid))
    }

    fn candy_machine(&self) -> SyncResult<Pubkey> {
        let cache = self.cache.load(&self.cache_name, self.env)?;
        let address = cache.program.candy_machine.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!(
                "cache {} has no candy machine; run create first",
                self.cache_name
            ))
        })?;
        Pubkey::from_str(address)
            .map_err(|e| SyncError::Configuration(format!("cached candy machine address {address}: {e}")))
    }

    async fn fetch_candy_machine(&self, address: &Pubkey) -> SyncResult<CandyMachineAccount> {
        let account = self
            .submitter
            .client()
            .get_account(address)
            .await?
            .ok_or(LedgerError::AccountNotFound(*address))?;
        Ok(CandyMachineAccount::parse(&account.data)?)
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> SyncResult<u8> {
        let account = self
            .submitter
            .client()
            .get_account(mint)
            .await?
            .ok_or(LedgerError::AccountNotFound(*mint))?;
        let info = token::parse_mint(&account.data)?;
        if !info.is_initialized {
            return Err(SyncError::Configuration(format!("the specified spl-token {mint} is not initialized")));
        }
        Ok(info.decimals)
    }

    /// Check the mint and token account of an SPL treasury. Returns the
    /// mint's decimals.
    async fn check_spl_treasury(&self, mint: &Pubkey, account: &Pubkey) -> SyncResult<u8> {
        let decimals = self.mint_decimals(mint).await?;
        let data = self
            .submitter
            .client()
            .get_account(account)
            .await?
            .ok_or(LedgerError::AccountNotFound(*account))?
            .data;
        let info = token::parse_token_account(&data)?;
        if !info.is_initialized {
            return Err(SyncError::Configuration(format!(
                "the specified spl-token-account {account} is not initialized"
            )));
        }
        if info.mint != *mint {
            return Err(SyncError::Configuration(format!(
                "the spl-token-account's mint ({}) does not match specified spl-token {mint}",
                info.mint
            )));
        }
        Ok(decimals)
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("cache_name", &self.cache_name)
            .field("env", &self.env)
            .field("program_id", &self.program_id)
            .finish()
    }
}

// Sweep

#[derive(Deserialize)]
struct KeyList {
    result: Vec<KeyListEntry>,
}

#[derive(Deserialize)]
struct KeyListEntry {
    pubkey: String,
    account: KeyListAccount,
}

#[derive(Deserialize)]
struct KeyListAccount {
    lamports: u64,
}

/// A config account named in a key list, with its balance at listing time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListedConfig {
    pub address: Pubkey,
    pub lamports: u64,
}

/// Parse a key list of the form
/// `{"result": [{"pubkey": "...", "account": {"lamports": N, ...}}, ...]}`,
/// the shape of a `getProgramAccounts` RPC response.
pub fn parse_key_list(json: &str) -> SyncResult<Vec<ListedConfig>> {
    let list: KeyList = serde_json::from_str(json).map_err(|e| SyncError::KeyList(e.to_string()))?;
    list.result
        .into_iter()
        .map(|entry| {
            let address = Pubkey::from_str(&entry.pubkey)
                .map_err(|e| SyncError::KeyList(format!("{}: {e}", entry.pubkey)))?;
            Ok(ListedConfig {
                address,
                lamports: entry.account.lamports,
            })
        })
        .collect()
}

pub fn read_key_list(path: &Path) -> SyncResult<Vec<ListedConfig>> {
    let json = std::fs::read_to_string(path)?;
    parse_key_list(&json)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepSettings {
    /// Configs at or below this balance are skipped.
    pub min_balance_lamports: u64,
    /// Program that executes the withdrawal.
    pub program: Pubkey,
    /// Program owning the swept configs and candy machines.
    pub secondary_program: Pubkey,
    /// Share of each withdrawal forwarded to `split_recipient`, 0..=100.
    pub split_percent: u8,
    pub split_recipient: Option<Pubkey>,
    pub dry_run: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min_balance_lamports: 10 * LAMPORTS_PER_SOL,
            program: CANDY_MACHINE_PROGRAM_ID,
            secondary_program: DEFAULT_SECONDARY_PROGRAM_ID,
            split_percent: 0,
            split_recipient: None,
            dry_run: false,
        }
    }
}

impl SweepSettings {
    pub fn validate(&self) -> SyncResult<()> {
        if self.split_percent > 100 {
            return Err(SyncError::Configuration(format!(
                "split percentage must be between 0 and 100, got {}",
                self.split_percent
            )));
        }
        if self.split_percent > 0 && self.split_recipient.is_none() {
            return Err(SyncError::Configuration(
                "a split percentage needs a recipient address".into(),
            ));
        }
        Ok(())
    }

    /// The part of `withdrawn` forwarded to the split recipient.
    pub fn split_amount(&self, withdrawn: u64) -> u64 {
        (withdrawn as u128 * self.split_percent as u128 / 100) as u64
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweptConfig {
    pub config: Pubkey,
    pub candy_machine: Pubkey,
    pub listed_lamports: u64,
    /// Operator balance gained by the withdrawal; 0 for a dry run.
    pub withdrawn: u64,
    pub split: u64,
    pub signature: Option<Signature>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub swept: Vec<SweptConfig>,
    /// Configs at or below the balance threshold.
    pub skipped: usize,
    pub failed: Vec<(Pubkey, String)>,
}

/// Withdraw from every listed config above the balance threshold. A failing
/// deployment is logged and recorded, and the sweep moves on.
pub async fn sweep(
    submitter: &TransactionSubmitter,
    listed: &[ListedConfig],
    settings: &SweepSettings,
) -> SyncResult<SweepReport> {
    settings.validate()?;
    let mut report = SweepReport::default();
    for entry in listed {
        if entry.lamports <= settings.min_balance_lamports {
            report.skipped += 1;
            continue;
        }
        match sweep_one(submitter, entry, settings).await {
            Ok(swept) => report.swept.push(swept),
            Err(e) => {
                warn!(config = %entry.address, error = %e, "sweep failed for config");
                report.failed.push((entry.address, e.to_string()));
            }
        }
    }
    info!(
        swept = report.swept.len(),
        skipped = report.skipped,
        failed = report.failed.len(),
        dry_run = settings.dry_run,
        "sweep finished"
    );
    Ok(report)
}

async fn sweep_one(
    submitter: &TransactionSubmitter,
    entry: &ListedConfig,
    settings: &SweepSettings,
) -> SyncResult<SweptConfig> {
    let client = submitter.client();
    let account = client
        .get_account(&entry.address)
        .await?
        .ok_or(LedgerError::AccountNotFound(entry.address))?;
    let header = parse_config_header(&account.data)?;
    let (candy_machine, candy_machine_bump) =
        candy_machine_address(&entry.address, &header.uuid, &settings.secondary_program);
    let (candy_machine_secondary, secondary_bump) =
        candy_machine_address(&entry.address, &header.uuid, &settings.program);

    let mut swept = SweptConfig {
        config: entry.address,
        candy_machine,
        listed_lamports: entry.lamports,
        withdrawn: 0,
        split: 0,
        signature: None,
    };
    if settings.dry_run {
        info!(config = %entry.address, %candy_machine, lamports = entry.lamports, "dry run: would withdraw");
        return Ok(swept);
    }

    let operator = submitter.payer();
    let before = client.get_balance(&operator).await?;
    let ix = instructions::sweep_withdraw_funds(
        &settings.program,
        &SweepWithdraw {
            operator,
            config: entry.address,
            authority: header.authority,
            secondary_program: settings.secondary_program,
            candy_machine,
            candy_machine_secondary,
            secondary_bump,
            candy_machine_bump,
            uuid: header.uuid.clone(),
        },
    )?;
    let signature = submitter.submit(&[ix], &[]).await?;
    let after = client.get_balance(&operator).await?;
    swept.withdrawn = after.saturating_sub(before);
    swept.signature = Some(signature);
    info!(config = %entry.address, withdrawn = swept.withdrawn, %signature, "config swept");

    if let Some(recipient) = settings.split_recipient {
        let split = settings.split_amount(swept.withdrawn);
        if split > 0 {
            let sig = submitter
                .submit(&[system_instruction::transfer(&operator, &recipient, split)], &[])
                .await?;
            info!(%recipient, lamports = split, %sig, "split forwarded");
            swept.split = split;
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cndy_cache::InMemoryCacheStore;
    use cndy_ledger::{InMemoryLedgerClient, SubmitPolicy};
    use cndy_types::RetryPolicy;
    use solana_sdk::account::Account;

    const NAME: &str = "temp";
    const ENV: Cluster = Cluster::Devnet;

    fn submitter(client: Arc<InMemoryLedgerClient>) -> Arc<TransactionSubmitter> {
        Arc::new(TransactionSubmitter::new(
            client,
            Arc::new(Keypair::new()),
            SubmitPolicy {
                retry: RetryPolicy::immediate(2),
                confirm_timeout: Duration::ZERO,
                poll_interval: Duration::ZERO,
            },
        ))
    }

    fn registered_cache(items: u32) -> (CacheFile, Pubkey) {
        let config = Pubkey::new_unique();
        let mut cache = CacheFile::seed();
        cache
            .set_config(&config.to_string()[..6], &config.to_string())
            .unwrap();
        for i in 0..items {
            cache.set_link(i, format!("Item #{i}"), format!("mem://{i}"));
            cache.mark_on_chain(i).unwrap();
        }
        (cache, config)
    }

    fn program_account(data: Vec<u8>, owner: Pubkey) -> Account {
        Account {
            lamports: 1_000_000,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn borsh_string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    fn candy_machine_data(wallet: &Pubkey, config: &Pubkey, token_mint: Option<&Pubkey>, redeemed: u64) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(Pubkey::new_unique().as_ref());
        data.extend_from_slice(wallet.as_ref());
        match token_mint {
            Some(mint) => {
                data.push(1);
                data.extend_from_slice(mint.as_ref());
            }
            None => data.push(0),
        }
        data.extend_from_slice(config.as_ref());
        borsh_string(&mut data, "abcdef");
        data.extend_from_slice(&1_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&3u64.to_le_bytes());
        data.push(0);
        data.push(254);
        data.extend_from_slice(&redeemed.to_le_bytes());
        data
    }

    fn config_data(authority: &Pubkey, uuid: &str) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(authority.as_ref());
        borsh_string(&mut data, uuid);
        data
    }

    fn mint_data(decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; token::MINT_LEN];
        data[44] = decimals;
        data[45] = 1;
        data
    }

    fn token_account_data(mint: &Pubkey, owner: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; token::TOKEN_ACCOUNT_LEN];
        data[..32].copy_from_slice(mint.as_ref());
        data[32..64].copy_from_slice(owner.as_ref());
        data[108] = 1;
        data
    }

    fn deployment(cache: CacheFile, client: Arc<InMemoryLedgerClient>) -> (Deployment, Arc<InMemoryCacheStore>) {
        let store = Arc::new(InMemoryCacheStore::with_record(NAME, ENV, cache));
        let deployment = Deployment::new(store.clone(), NAME, ENV, submitter(client), CANDY_MACHINE_PROGRAM_ID);
        (deployment, store)
    }

    #[test]
    fn payment_flags_are_validated_up_front() {
        let mint = Some(Pubkey::new_unique());
        let account = Some(Pubkey::new_unique());
        let treasury = Some(Pubkey::new_unique());

        let ok = CreateOptions {
            price: "1".into(),
            spl_token: mint,
            spl_token_account: account,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let both = CreateOptions {
            sol_treasury: treasury,
            ..ok.clone()
        };
        assert!(both.validate().unwrap_err().to_string().contains("sol-treasury-account cannot be set"));

        let no_mint = CreateOptions {
            spl_token: None,
            ..ok.clone()
        };
        assert!(no_mint.validate().unwrap_err().to_string().contains("spl-token must also be set"));

        let no_account = CreateOptions {
            spl_token_account: None,
            ..ok
        };
        assert!(no_account.validate().unwrap_err().to_string().contains("spl-token-account must also be set"));
    }

    #[tokio::test]
    async fn create_records_candy_machine() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let (cache, config) = registered_cache(3);
        let (deployment, store) = deployment(cache, client.clone());

        let created = deployment
            .create_candy_machine(&CreateOptions {
                price: "0.5".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.price, LAMPORTS_PER_SOL / 2);
        assert_eq!(created.items_available, 3);

        let uuid = config.to_string()[..6].to_string();
        let (expected, _) = candy_machine_address(&config, &uuid, &CANDY_MACHINE_PROGRAM_ID);
        assert_eq!(created.address, expected);
        let cached = store.snapshot(NAME, ENV).unwrap();
        assert_eq!(cached.program.candy_machine, Some(expected.to_string()));
        assert_eq!(client.sent().len(), 1);

        // set once
        let again = deployment
            .create_candy_machine(&CreateOptions {
                price: "1".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(again, Err(SyncError::Configuration(_))));
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn create_needs_a_fully_registered_cache() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let (mut cache, _) = registered_cache(3);
        cache.reset_on_chain(2);
        let (deployment, _) = deployment(cache, client.clone());

        let err = deployment
            .create_candy_machine(&CreateOptions {
                price: "1".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only 2 of 3"));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn create_with_spl_treasury_scales_price() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let mint = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        client.set_account(mint, program_account(mint_data(6), token::TOKEN_PROGRAM_ID));
        client.set_account(
            account,
            program_account(token_account_data(&mint, &Pubkey::new_unique()), token::TOKEN_PROGRAM_ID),
        );
        let (cache, _) = registered_cache(1);
        let (deployment, _) = deployment(cache, client.clone());

        let created = deployment
            .create_candy_machine(&CreateOptions {
                price: "1.5".into(),
                spl_token: Some(mint),
                spl_token_account: Some(account),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.price, 1_500_000);
        assert_eq!(created.wallet, account);
        // the mint rides along as a remaining account
        let sent = client.sent();
        assert!(sent[0].message.account_keys.contains(&mint));
    }

    #[tokio::test]
    async fn create_rejects_mismatched_token_account() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let mint = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        client.set_account(mint, program_account(mint_data(6), token::TOKEN_PROGRAM_ID));
        client.set_account(
            account,
            program_account(
                token_account_data(&Pubkey::new_unique(), &Pubkey::new_unique()),
                token::TOKEN_PROGRAM_ID,
            ),
        );
        let (cache, _) = registered_cache(1);
        let (deployment, _) = deployment(cache, client.clone());

        let err = deployment
            .create_candy_machine(&CreateOptions {
                price: "1".into(),
                spl_token: Some(mint),
                spl_token_account: Some(account),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
        assert!(client.sent().is_empty());
    }

    fn created_cache(candy_machine: &Pubkey) -> CacheFile {
        let (mut cache, _) = registered_cache(3);
        cache.set_candy_machine(&candy_machine.to_string()).unwrap();
        cache
    }

    #[tokio::test]
    async fn update_requires_a_change() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let (deployment, _) = deployment(created_cache(&Pubkey::new_unique()), client.clone());
        assert!(matches!(
            deployment.update_candy_machine(None, None).await,
            Err(SyncError::Configuration(_))
        ));

        deployment.update_candy_machine(None, Some(1_640_995_200)).await.unwrap();
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn update_price_reads_candy_machine() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let cm = Pubkey::new_unique();
        let (deployment, _) = deployment(created_cache(&cm), client.clone());

        // no candy machine account on chain yet
        let err = deployment.update_candy_machine(Some("2"), None).await.unwrap_err();
        assert!(matches!(err, SyncError::Ledger(LedgerError::AccountNotFound(_))));

        client.set_account(
            cm,
            program_account(
                candy_machine_data(&Pubkey::new_unique(), &Pubkey::new_unique(), None, 0),
                CANDY_MACHINE_PROGRAM_ID,
            ),
        );
        deployment.update_candy_machine(Some("2"), None).await.unwrap();
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn mint_one_builds_mint_transaction() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let cm = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();
        client.set_account(
            cm,
            program_account(candy_machine_data(&wallet, &Pubkey::new_unique(), None, 1), CANDY_MACHINE_PROGRAM_ID),
        );
        let (deployment, _) = deployment(created_cache(&cm), client.clone());

        let mint = deployment.mint_one().await.unwrap();
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.instructions.len(), 5);
        // payer + mint
        assert_eq!(sent[0].signatures.len(), 2);
        assert!(sent[0].message.account_keys.contains(&mint));
        assert!(sent[0].message.account_keys.contains(&wallet));
    }

    #[tokio::test]
    async fn mint_one_refuses_sold_out_and_spl() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let cm = Pubkey::new_unique();
        let (deployment, _) = deployment(created_cache(&cm), client.clone());

        client.set_account(
            cm,
            program_account(
                candy_machine_data(&Pubkey::new_unique(), &Pubkey::new_unique(), None, 3),
                CANDY_MACHINE_PROGRAM_ID,
            ),
        );
        assert!(deployment.mint_one().await.unwrap_err().to_string().contains("sold out"));

        client.set_account(
            cm,
            program_account(
                candy_machine_data(&Pubkey::new_unique(), &Pubkey::new_unique(), Some(&Pubkey::new_unique()), 0),
                CANDY_MACHINE_PROGRAM_ID,
            ),
        );
        assert!(matches!(deployment.mint_one().await, Err(SyncError::Configuration(_))));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn withdraw_and_dry_run() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let cm = Pubkey::new_unique();
        client.set_balance(cm, 5 * LAMPORTS_PER_SOL);
        let (deployment, _) = deployment(created_cache(&cm), client.clone());

        let dry = deployment.withdraw(true).await.unwrap();
        assert_eq!(dry.lamports, 5 * LAMPORTS_PER_SOL);
        assert!(dry.signature.is_none());
        assert!(client.sent().is_empty());

        let real = deployment.withdraw(false).await.unwrap();
        assert!(real.signature.is_some());
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn withdraw_without_candy_machine_fails() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let (cache, _) = registered_cache(1);
        let (deployment, _) = deployment(cache, client);
        assert!(matches!(deployment.withdraw(false).await, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn key_list_parsing() {
        let a = Pubkey::new_unique();
        let json = format!(
            r#"{{"jsonrpc": "2.0", "id": 1, "result": [
                {{"pubkey": "{a}", "account": {{"lamports": 12000000000, "owner": "x", "data": []}}}}
            ]}}"#
        );
        let listed = parse_key_list(&json).unwrap();
        assert_eq!(
            listed,
            vec![ListedConfig {
                address: a,
                lamports: 12_000_000_000
            }]
        );

        assert!(matches!(parse_key_list(r#"{"result": [{"pubkey": "nope", "account": {"lamports": 1}}]}"#), Err(SyncError::KeyList(_))));
        assert!(matches!(parse_key_list("[]"), Err(SyncError::KeyList(_))));
    }

    #[test]
    fn key_list_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, r#"{"result": []}"#).unwrap();
        assert!(read_key_list(&path).unwrap().is_empty());
        assert!(matches!(read_key_list(&dir.path().join("missing.json")), Err(SyncError::Io(_))));
    }

    #[test]
    fn sweep_settings_validation_and_split() {
        let mut settings = SweepSettings::default();
        assert_eq!(settings.min_balance_lamports, 10 * LAMPORTS_PER_SOL);
        assert!(settings.validate().is_ok());

        settings.split_percent = 101;
        settings.split_recipient = Some(Pubkey::new_unique());
        assert!(settings.validate().is_err());

        settings.split_percent = 10;
        assert!(settings.validate().is_ok());
        assert_eq!(settings.split_amount(1_000), 100);
        assert_eq!(settings.split_amount(u64::MAX), u64::MAX / 10);

        settings.split_recipient = None;
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn sweep_selects_by_threshold_and_continues_past_failures() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let sub = submitter(client.clone());
        let rich = Pubkey::new_unique();
        let poor = Pubkey::new_unique();
        let missing = Pubkey::new_unique();
        client.set_account(
            rich,
            program_account(config_data(&Pubkey::new_unique(), "abcdef"), DEFAULT_SECONDARY_PROGRAM_ID),
        );
        let listed = [
            ListedConfig { address: rich, lamports: 11 * LAMPORTS_PER_SOL },
            ListedConfig { address: poor, lamports: 10 * LAMPORTS_PER_SOL },
            ListedConfig { address: missing, lamports: 20 * LAMPORTS_PER_SOL },
        ];

        let report = sweep(&sub, &listed, &SweepSettings::default()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.swept.len(), 1);
        assert_eq!(report.swept[0].config, rich);
        assert!(report.swept[0].signature.is_some());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, missing);
        assert_eq!(client.sent().len(), 1);

        let (expected, _) = candy_machine_address(&rich, "abcdef", &DEFAULT_SECONDARY_PROGRAM_ID);
        assert_eq!(report.swept[0].candy_machine, expected);
    }

    #[tokio::test]
    async fn sweep_dry_run_sends_nothing() {
        let client = Arc::new(InMemoryLedgerClient::new());
        let sub = submitter(client.clone());
        let config = Pubkey::new_unique();
        client.set_account(
            config,
            program_account(config_data(&Pubkey::new_unique(), "uvwxyz"), DEFAULT_SECONDARY_PROGRAM_ID),
        );
        let settings = SweepSettings {
            dry_run: true,
            min_balance_lamports: 0,
            ..SweepSettings::default()
        };

        let report = sweep(&sub, &[ListedConfig { address: config, lamports: 1 }], &settings)
            .await
            .unwrap();
        assert_eq!(report.swept.len(), 1);
        assert!(report.swept[0].signature.is_none());
        assert!(client.sent().is_empty());
    }
}
