use std::sync::Arc;
use std::time::Duration;

use cndy_types::RetryPolicy;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{LedgerClient, SignatureStatus};
use crate::error::{LedgerError, LedgerResult};

/// Tunables for [`TransactionSubmitter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitPolicy {
    pub retry: RetryPolicy,
    /// How long to wait for a sent transaction to confirm.
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Builds, signs, sends and confirms transactions for one payer.
///
/// Transient failures are retried up to the policy's attempt bound. A
/// retry re-sends the same signed transaction while its blockhash is still
/// valid and signs a new one only after it has expired, so at most one
/// signed copy can ever land. Every signature sent is checked before each
/// retry; one that landed ends the call.
pub struct TransactionSubmitter {
    client: Arc<dyn LedgerClient>,
    payer: Arc<Keypair>,
    policy: SubmitPolicy,
}

impl TransactionSubmitter {
    pub fn new(client: Arc<dyn LedgerClient>, payer: Arc<Keypair>, policy: SubmitPolicy) -> Self {
        Self { client, payer, policy }
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy.retry
    }

    /// Submit `instructions` in one transaction, signed by the payer and
    /// `extra_signers`, and wait for confirmation.
    pub async fn submit(
        &self,
        instructions: &[Instruction],
        extra_signers: &[&Keypair],
    ) -> LedgerResult<Signature> {
        let attempts = self.policy.retry.attempts();
        let mut backoff = self.policy.retry.backoff();
        let mut sent: Vec<Signature> = Vec::new();
        let mut current: Option<Transaction> = None;
        let mut last_error = LedgerError::Transient("no attempt made".into());

        for attempt in 1..=attempts {
            if let Some(sig) = self.find_landed(&sent).await? {
                info!(%sig, attempt, "earlier submission landed");
                return Ok(sig);
            }

            let reusable = match &current {
                Some(tx) => self.still_valid(tx).await,
                None => false,
            };
            let tx = match current.take() {
                Some(tx) if reusable => tx,
                stale => {
                    if stale.is_some() {
                        debug!(attempt, "blockhash expired, signing again");
                    }
                    match self.fresh(instructions, extra_signers).await {
                        Ok(tx) => tx,
                        Err(e) if e.is_retryable() => {
                            warn!(attempt, max = attempts, error = %e, "cannot fetch blockhash");
                            last_error = e;
                            if attempt < attempts {
                                tokio::time::sleep(backoff.next_delay()).await;
                            }
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            let sig = tx.signatures[0];
            if !sent.contains(&sig) {
                sent.push(sig);
            }
            match self.send_and_confirm(&tx).await {
                Ok(()) => {
                    debug!(%sig, "transaction confirmed");
                    return Ok(sig);
                }
                Err(e) if e.is_retryable() => {
                    warn!(%sig, attempt, max = attempts, error = %e, "transaction attempt failed");
                    current = Some(tx);
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // The last attempt may have landed while we gave up on it.
        if let Some(sig) = self.find_landed(&sent).await? {
            return Ok(sig);
        }
        Err(last_error)
    }

    /// The first of `sent` that landed. A landed failure is a rejection.
    async fn find_landed(&self, sent: &[Signature]) -> LedgerResult<Option<Signature>> {
        for sig in sent {
            match self.client.signature_status(sig).await {
                Ok(SignatureStatus::Confirmed) => return Ok(Some(*sig)),
                Ok(SignatureStatus::Failed(reason)) => return Err(LedgerError::Rejected(reason)),
                Ok(SignatureStatus::Pending) => {}
                Err(e) => debug!(%sig, error = %e, "status check failed"),
            }
        }
        Ok(None)
    }

    /// Whether `tx` can still land. An unanswered check counts as valid:
    /// re-sending the same transaction never applies it twice.
    async fn still_valid(&self, tx: &Transaction) -> bool {
        match self.client.is_blockhash_valid(&tx.message.recent_blockhash).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!(error = %e, "blockhash check failed");
                true
            }
        }
    }

    async fn fresh(&self, instructions: &[Instruction], extra: &[&Keypair]) -> LedgerResult<Transaction> {
        let blockhash = self.client.get_latest_blockhash().await?;
        self.sign(instructions, extra, blockhash)
    }

    fn sign(
        &self,
        instructions: &[Instruction],
        extra: &[&Keypair],
        blockhash: Hash,
    ) -> LedgerResult<Transaction> {
        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(extra.len() + 1);
        signers.push(self.payer.as_ref());
        signers.extend(extra.iter().map(|k| *k as &dyn Signer));

        let mut tx = Transaction::new_with_payer(instructions, Some(&self.payer.pubkey()));
        tx.try_sign(&signers, blockhash)
            .map_err(|e| LedgerError::Configuration(format!("cannot sign transaction: {e}")))?;
        Ok(tx)
    }

    async fn send_and_confirm(&self, tx: &Transaction) -> LedgerResult<()> {
        let sig = tx.signatures[0];
        match self.client.send_transaction(tx).await {
            Ok(_) => {}
            Err(LedgerError::AlreadyProcessed) => {
                debug!(%sig, "node reports transaction already processed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.confirm(sig).await
    }

    async fn confirm(&self, sig: Signature) -> LedgerResult<()> {
        let started = Instant::now();
        loop {
            match self.client.signature_status(&sig).await? {
                SignatureStatus::Confirmed => return Ok(()),
                SignatureStatus::Failed(reason) => return Err(LedgerError::Rejected(reason)),
                SignatureStatus::Pending => {}
            }
            if started.elapsed() >= self.policy.confirm_timeout {
                return Err(LedgerError::Timeout {
                    signature: sig.to_string(),
                    waited_ms: self.policy.confirm_timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    fn poll_interval(&self) -> Duration {
        self.policy.poll_interval.min(self.policy.confirm_timeout)
    }
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("payer", &self.payer.pubkey())
            .field("policy", &self.policy)
            .finish()
    }
}
