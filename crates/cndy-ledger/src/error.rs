use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::TransactionError;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// RPC connectivity, rate limiting or an expired blockhash. Safe to retry.
    #[error("transient ledger error: {0}")]
    Transient(String),

    /// A submitted transaction was not confirmed in time. It may still land.
    #[error("confirmation of {signature} timed out after {waited_ms} ms")]
    Timeout { signature: String, waited_ms: u64 },

    /// The ledger refused the transaction. Retrying the same transaction
    /// fails the same way.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The node has already seen this exact transaction.
    #[error("transaction already processed")]
    AlreadyProcessed,

    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("invalid account data: {0}")]
    InvalidAccountData(String),

    /// Bad input detected before anything was sent.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transient(_) | LedgerError::Timeout { .. })
    }

    /// Classify a transaction-level failure reported by the node.
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::AlreadyProcessed => LedgerError::AlreadyProcessed,
            TransactionError::BlockhashNotFound
            | TransactionError::ClusterMaintenance
            | TransactionError::WouldExceedMaxBlockCostLimit
            | TransactionError::WouldExceedAccountDataBlockLimit => {
                LedgerError::Transient(err.to_string())
            }
            other => LedgerError::Rejected(other.to_string()),
        }
    }
}

impl From<ClientError> for LedgerError {
    fn from(e: ClientError) -> Self {
        if let Some(tx_err) = e.get_transaction_error() {
            return LedgerError::from_transaction_error(&tx_err);
        }
        match e.kind() {
            ClientErrorKind::SigningError(s) => LedgerError::Configuration(s.to_string()),
            _ => LedgerError::Transient(e.to_string()),
        }
    }
}

impl From<cndy_types::TypeError> for LedgerError {
    fn from(e: cndy_types::TypeError) -> Self {
        LedgerError::Configuration(e.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::InvalidAccountData(e.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::InstructionError;

    #[test]
    fn transaction_error_classes() {
        assert_eq!(
            LedgerError::from_transaction_error(&TransactionError::AlreadyProcessed),
            LedgerError::AlreadyProcessed
        );
        assert!(LedgerError::from_transaction_error(&TransactionError::BlockhashNotFound)
            .is_retryable());

        let fatal = LedgerError::from_transaction_error(&TransactionError::InstructionError(
            0,
            InstructionError::Custom(0x8f),
        ));
        assert!(matches!(fatal, LedgerError::Rejected(_)));
        assert!(!fatal.is_retryable());
        assert!(!LedgerError::from_transaction_error(&TransactionError::InsufficientFundsForFee)
            .is_retryable());
    }

    #[test]
    fn timeouts_are_retryable() {
        let e = LedgerError::Timeout {
            signature: "sig".into(),
            waited_ms: 30_000,
        };
        assert!(e.is_retryable());
        assert!(!LedgerError::AlreadyProcessed.is_retryable());
        assert!(!LedgerError::Configuration("x".into()).is_retryable());
    }
}
