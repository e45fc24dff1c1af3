//! Transaction ledger records split into types and validation

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{is_account_id, is_signed_payload};
