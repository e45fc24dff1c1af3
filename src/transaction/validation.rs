/// Validation logic for ledger input separated from type definitions
use crate::error::LedgerError;
use crate::transaction::types::{NewTransaction, MAX_AMOUNT_SCALE};
use rust_decimal::Decimal;

/// Length of an account identifier: `0x` followed by 20 hex-encoded bytes.
const ACCOUNT_ID_LEN: usize = 42;

/// Shortest signed payload the chain will accept.
const MIN_SIGNED_PAYLOAD_LEN: usize = 10;

impl NewTransaction {
    /// Stateless checks the ledger enforces itself. Address format is the
    /// caller's job; only the conflict key and the amount are checked here.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.hash.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Transaction hash cannot be empty".to_string(),
            ));
        }

        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "Amount must be positive, got {}",
                self.amount
            )));
        }

        if self.amount.normalize().scale() > MAX_AMOUNT_SCALE {
            return Err(LedgerError::Validation(format!(
                "Amount {} has more than {} fractional digits",
                self.amount, MAX_AMOUNT_SCALE
            )));
        }

        Ok(())
    }
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_account_id(s: &str) -> bool {
    if s.len() != ACCOUNT_ID_LEN {
        return false;
    }
    match s.strip_prefix("0x") {
        Some(body) => {
            let mut bytes = [0u8; 20];
            hex::decode_to_slice(body, &mut bytes).is_ok()
        }
        None => false,
    }
}

/// Loose shape check for a signed transaction payload before it is forwarded.
pub fn is_signed_payload(s: &str) -> bool {
    s.starts_with("0x") && s.len() >= MIN_SIGNED_PAYLOAD_LEN
}
