/// Transaction ledger types
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed number of records returned by one ledger query.
pub const PAGE_SIZE: usize = 100;

/// Maximum fractional digits an amount may carry.
pub const MAX_AMOUNT_SCALE: u32 = 18;

/// Settlement status of a ledger record. `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A transaction as handed to the ledger for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub hash: String,
    pub sender: String,
    pub receiver: String,
    pub amount: Decimal,
    pub status: TxStatus,
}

impl NewTransaction {
    /// A freshly submitted transaction; status starts out `pending`.
    pub fn pending(
        hash: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            hash: hash.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            status: TxStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: TxStatus) -> Self {
        self.status = status;
        self
    }
}

/// A stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub hash: String,
    pub sender: String,
    pub receiver: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No row existed for the hash; one was created.
    Inserted(TransactionRecord),
    /// A pending row existed; its status was rewritten.
    Updated(TransactionRecord),
}

impl Admission {
    pub fn inserted(&self) -> bool {
        matches!(self, Admission::Inserted(_))
    }

    pub fn record(&self) -> &TransactionRecord {
        match self {
            Admission::Inserted(record) | Admission::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> TransactionRecord {
        match self {
            Admission::Inserted(record) | Admission::Updated(record) => record,
        }
    }
}

/// Optional exact-match filters for ledger queries. Present filters are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub sender: Option<String>,
    pub receiver: Option<String>,
}

impl TransactionFilter {
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.sender.as_deref().map_or(true, |s| record.sender == s)
            && self.receiver.as_deref().map_or(true, |r| record.receiver == r)
    }
}
