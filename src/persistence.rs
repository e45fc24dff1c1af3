//! Ledger persistence layer for txledger
//!
//! [`Database`] keeps the ledger in SQLite; [`InMemoryLedger`] gives the same
//! admission and query semantics without a file, for tests and ephemeral runs.

use crate::error::LedgerError;
use crate::transaction::{
    Admission, NewTransaction, TransactionFilter, TransactionRecord, TxStatus, PAGE_SIZE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a writer waits on a locked database file before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage contract for the transaction ledger.
///
/// `admit` is the only mutation path. For a given hash it inserts a new row,
/// rewrites the status of a still-pending row, or refuses with
/// [`LedgerError::Conflict`] once the row is terminal.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn admit(
        &self,
        tx: NewTransaction,
        cancel: &CancellationToken,
    ) -> Result<Admission, LedgerError>;

    /// One page (at most [`PAGE_SIZE`] rows) of matching records in `id` order.
    async fn query(
        &self,
        filter: TransactionFilter,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    async fn find_by_hash(
        &self,
        hash: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TransactionRecord>, LedgerError>;
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_busy_timeout(path: &str, busy_timeout: Duration) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(busy_timeout).map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to set busy timeout: {}", e))
        })?;

        // amount is TEXT so that numeric affinity never coerces it to REAL
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                amount TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'confirmed', 'failed'))
            )",
            [],
        )
        .map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to create transactions table: {}", e))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_sender ON transactions (sender)",
            [],
        )
        .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to create sender index: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_receiver ON transactions (receiver)",
            [],
        )
        .map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to create receiver index: {}", e))
        })?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Total number of stored records, regardless of status.
    pub fn count(&self) -> Result<u64, LedgerError> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, LedgerError> {
    conn.lock()
        .map_err(|_| LedgerError::StoreUnavailable("Mutex poisoned".to_string()))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let amount: String = row.get(4)?;
    let amount = Decimal::from_str_exact(&amount)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let millis: i64 = row.get(5)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, millis))?;

    let status: String = row.get(6)?;
    let status = TxStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;

    Ok(TransactionRecord {
        id: row.get(0)?,
        hash: row.get(1)?,
        sender: row.get(2)?,
        receiver: row.get(3)?,
        amount,
        timestamp,
        status,
    })
}

fn select_by_hash(conn: &Connection, hash: &str) -> rusqlite::Result<Option<TransactionRecord>> {
    conn.query_row(
        "SELECT id, hash, sender, receiver, amount, timestamp, status
         FROM transactions WHERE hash = ?1",
        params![hash],
        record_from_row,
    )
    .optional()
}

/// Runs one admission inside a single IMMEDIATE transaction.
fn admit_blocking(
    conn: &Mutex<Connection>,
    tx: &NewTransaction,
    cancel: &CancellationToken,
) -> Result<Admission, LedgerError> {
    let mut conn = lock(conn)?;
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }

    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let admission = stage_admission(&db_tx, tx)?;
    commit_unless_cancelled(db_tx, cancel)?;
    Ok(admission)
}

/// Writes the admission without committing. Both writes are guarded in SQL
/// (insert only if the hash is absent, update only while the row is still
/// pending), so a row that turned terminal is never overwritten.
fn stage_admission(db_tx: &Transaction<'_>, tx: &NewTransaction) -> Result<Admission, LedgerError> {
    let inserted = db_tx.execute(
        "INSERT INTO transactions (hash, sender, receiver, amount, timestamp, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (hash) DO NOTHING",
        params![
            tx.hash,
            tx.sender,
            tx.receiver,
            tx.amount.to_string(),
            Utc::now().timestamp_millis(),
            tx.status.as_str(),
        ],
    )? == 1;

    if !inserted {
        let updated = db_tx.execute(
            "UPDATE transactions SET status = ?1 WHERE hash = ?2 AND status = 'pending'",
            params![tx.status.as_str(), tx.hash],
        )?;

        if updated == 0 {
            let status: String = db_tx.query_row(
                "SELECT status FROM transactions WHERE hash = ?1",
                params![tx.hash],
                |row| row.get(0),
            )?;
            return Err(LedgerError::Conflict {
                hash: tx.hash.clone(),
                status,
            });
        }
    }

    let record = select_by_hash(db_tx, &tx.hash)?.ok_or_else(|| {
        LedgerError::StoreUnavailable(format!("Row for {} vanished during admission", tx.hash))
    })?;

    Ok(if inserted {
        Admission::Inserted(record)
    } else {
        Admission::Updated(record)
    })
}

/// Commit is the point of no return; a token cancelled before it rolls the
/// staged writes back when `db_tx` drops.
fn commit_unless_cancelled(db_tx: Transaction<'_>, cancel: &CancellationToken) -> Result<(), LedgerError> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }
    db_tx.commit()?;
    Ok(())
}

fn query_blocking(
    conn: &Mutex<Connection>,
    filter: &TransactionFilter,
    offset: u64,
) -> Result<Vec<TransactionRecord>, LedgerError> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare_cached(
        "SELECT id, hash, sender, receiver, amount, timestamp, status
         FROM transactions
         WHERE (?1 IS NULL OR sender = ?1) AND (?2 IS NULL OR receiver = ?2)
         ORDER BY id ASC
         LIMIT ?3 OFFSET ?4",
    )?;

    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let rows = stmt.query_map(
        params![filter.sender, filter.receiver, PAGE_SIZE as i64, offset],
        record_from_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Awaits a blocking read, giving up as soon as the caller cancels. Reads
/// have no side effects, so the abandoned task is simply left to finish.
async fn run_read<T, F>(cancel: &CancellationToken, work: F) -> Result<T, LedgerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }
    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LedgerError::Cancelled),
        joined = handle => joined?,
    }
}

#[async_trait]
impl LedgerStore for Database {
    async fn admit(
        &self,
        tx: NewTransaction,
        cancel: &CancellationToken,
    ) -> Result<Admission, LedgerError> {
        tx.validate()?;
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let conn = Arc::clone(&self.conn);
        let token = cancel.clone();
        let hash = tx.hash.clone();
        let status = tx.status;

        // The write always runs to its commit-or-rollback decision; the token is
        // consulted inside so a cancelled admission never commits.
        let result = tokio::task::spawn_blocking(move || admit_blocking(&conn, &tx, &token)).await?;

        match &result {
            Ok(admission) => debug!(
                hash = %hash,
                status = %status,
                inserted = admission.inserted(),
                "ledger.admit"
            ),
            Err(e) => debug!(hash = %hash, status = %status, error = %e, "ledger.admit rejected"),
        }
        result
    }

    async fn query(
        &self,
        filter: TransactionFilter,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let conn = Arc::clone(&self.conn);
        run_read(cancel, move || query_blocking(&conn, &filter, offset)).await
    }

    async fn find_by_hash(
        &self,
        hash: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let conn = Arc::clone(&self.conn);
        let hash = hash.to_string();
        run_read(cancel, move || {
            let conn = lock(&conn)?;
            Ok(select_by_hash(&conn, &hash)?)
        })
        .await
    }
}

/// Simple in-memory ledger useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    records: Arc<Mutex<Vec<TransactionRecord>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<TransactionRecord>>, LedgerError> {
        self.records
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable("Mutex poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn admit(
        &self,
        tx: NewTransaction,
        cancel: &CancellationToken,
    ) -> Result<Admission, LedgerError> {
        tx.validate()?;
        let mut records = self.lock()?;
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        match records.iter_mut().find(|r| r.hash == tx.hash) {
            Some(existing) if existing.status.is_terminal() => Err(LedgerError::Conflict {
                hash: tx.hash,
                status: existing.status.to_string(),
            }),
            Some(existing) => {
                existing.status = tx.status;
                Ok(Admission::Updated(existing.clone()))
            }
            None => {
                let record = TransactionRecord {
                    id: records.len() as i64 + 1,
                    hash: tx.hash,
                    sender: tx.sender,
                    receiver: tx.receiver,
                    amount: tx.amount,
                    timestamp: Utc::now(),
                    status: tx.status,
                };
                records.push(record.clone());
                Ok(Admission::Inserted(record))
            }
        }
    }

    async fn query(
        &self,
        filter: TransactionFilter,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        let records = self.lock()?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(records
            .iter()
            .filter(|r| filter.matches(r))
            .skip(offset)
            .take(PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn find_by_hash(
        &self,
        hash: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        Ok(self.lock()?.iter().find(|r| r.hash == hash).cloned())
    }
}
