use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::{LedgerError, LedgerResult};

/// What the node knows about a submitted signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Unknown to the node, or not yet at the requested commitment.
    Pending,
    Confirmed,
    /// Landed but failed; carries the on-chain reason.
    Failed(String),
}

/// Read/send boundary to a ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>>;

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64>;

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash>;

    /// Whether a transaction signed with `blockhash` can still land.
    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64>;

    /// Submit a signed transaction without waiting for confirmation.
    async fn send_transaction(&self, tx: &Transaction) -> LedgerResult<Signature>;

    async fn signature_status(&self, signature: &Signature) -> LedgerResult<SignatureStatus>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for std::sync::Arc<T> {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        (**self).get_account(address).await
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        (**self).get_balance(address).await
    }

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash> {
        (**self).get_latest_blockhash().await
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool> {
        (**self).is_blockhash_valid(blockhash).await
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        (**self).get_minimum_balance_for_rent_exemption(data_len).await
    }

    async fn send_transaction(&self, tx: &Transaction) -> LedgerResult<Signature> {
        (**self).send_transaction(tx).await
    }

    async fn signature_status(&self, signature: &Signature) -> LedgerResult<SignatureStatus> {
        (**self).signature_status(signature).await
    }
}

/// [`LedgerClient`] over the JSON-RPC API of a ledger node.
pub struct RpcLedgerClient {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcLedgerClient {
    /// Connect to `url` at `confirmed` commitment.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_commitment(url, CommitmentConfig::confirmed())
    }

    pub fn with_commitment(url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(url.into(), commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.rpc.url())
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        let resp = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(resp.value)
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        Ok(self.rpc.get_balance(address).await?)
    }

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash> {
        Ok(self.rpc.get_latest_blockhash().await?)
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool> {
        Ok(self.rpc.is_blockhash_valid(blockhash, self.commitment).await?)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        Ok(self
            .rpc
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }

    async fn send_transaction(&self, tx: &Transaction) -> LedgerResult<Signature> {
        Ok(self.rpc.send_transaction(tx).await?)
    }

    async fn signature_status(&self, signature: &Signature) -> LedgerResult<SignatureStatus> {
        let resp = self.rpc.get_signature_statuses(&[*signature]).await?;
        let Some(status) = resp.value.into_iter().next().flatten() else {
            return Ok(SignatureStatus::Pending);
        };
        if let Some(err) = &status.err {
            return Ok(match LedgerError::from_transaction_error(err) {
                LedgerError::AlreadyProcessed => SignatureStatus::Confirmed,
                other => SignatureStatus::Failed(other.to_string()),
            });
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Pending)
        }
    }
}
