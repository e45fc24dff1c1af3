//! Error types for txledger

use thiserror::Error;

/// Failures of the transaction ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input (empty hash, non-positive amount). Never retried.
    #[error("Invalid transaction: {0}")]
    Validation(String),

    /// The stored record for this hash is already terminal.
    #[error("Transaction {hash} exists and is not pending (status: {status})")]
    Conflict { hash: String, status: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LedgerError {
    /// Transient infrastructure faults are the only ones worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::StoreUnavailable(format!("Store task failed: {}", err))
    }
}

/// Failures talking to the chain node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("Invalid account identifier: {0}")]
    InvalidAccount(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

/// Failures of the balance gateway. Each lookup side has its own variant so the
/// caller can tell which source broke.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Failed to get native balance: {0}")]
    NativeBalance(ChainError),

    #[error("Failed to get token balance: {0}")]
    TokenBalance(ChainError),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_faults_are_retryable() {
        assert!(LedgerError::StoreUnavailable("busy".into()).is_retryable());
        assert!(!LedgerError::Validation("empty hash".into()).is_retryable());
        assert!(!LedgerError::Cancelled.is_retryable());
        assert!(!LedgerError::Conflict {
            hash: "0xabc".into(),
            status: "confirmed".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_conflict_message_names_hash_and_status() {
        let err = LedgerError::Conflict {
            hash: "0xabc".into(),
            status: "failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Transaction 0xabc exists and is not pending (status: failed)"
        );
    }

    #[test]
    fn test_gateway_error_identifies_side() {
        let err = GatewayError::TokenBalance(ChainError::Transport("timeout".into()));
        assert!(err.to_string().starts_with("Failed to get token balance"));
    }
}
