//! Storage collaborator interfaces and the atomic unit-of-work runner.
//!
//! The engine never talks to a database directly. It opens a [`UnitOfWork`]
//! from a [`Store`], performs reads and writes through the store traits, and
//! either commits or rolls back everything at once.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Charge, Direction, EntryStatus, LedgerEntry, Money, Payable};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("constraint violated: {0}")]
    Conflict(String),

    #[error("record {0} disappeared during update")]
    Missing(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Filter for ledger sums. `None` fields match everything; dates are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub direction: Option<Direction>,
    pub status: Option<EntryStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl LedgerFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.direction.is_none_or(|d| entry.direction == d)
            && self.status.is_none_or(|s| entry.status == s)
            && self.from.is_none_or(|from| entry.effective_date >= from)
            && self.to.is_none_or(|to| entry.effective_date <= to)
    }
}

#[async_trait]
pub trait ChargeStore: Send {
    async fn create_charge(&mut self, charge: &Charge) -> Result<(), StoreError>;

    /// Inside a unit of work the row stays locked until commit or rollback.
    async fn find_charge(&mut self, charge_id: Uuid) -> Result<Option<Charge>, StoreError>;

    async fn update_charge(&mut self, charge: &Charge) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send {
    async fn create_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn find_entry(&mut self, entry_id: Uuid) -> Result<Option<LedgerEntry>, StoreError>;

    /// Entries linked to `charge_id` with the given status and direction,
    /// earliest created first.
    async fn find_for_charge(
        &mut self,
        charge_id: Uuid,
        status: EntryStatus,
        direction: Direction,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn sum_entries(&mut self, filter: &LedgerFilter) -> Result<Money, StoreError>;
}

#[async_trait]
pub trait PayableStore: Send {
    async fn create_payable(&mut self, payable: &Payable) -> Result<(), StoreError>;

    /// Inside a unit of work the row stays locked until commit or rollback.
    async fn find_payable(&mut self, payable_id: Uuid) -> Result<Option<Payable>, StoreError>;

    async fn update_payable(&mut self, payable: &Payable) -> Result<(), StoreError>;

    /// Active pending payables due strictly before `today`.
    async fn find_overdue_candidates(&mut self, today: NaiveDate) -> Result<Vec<Payable>, StoreError>;

    /// Active payables due within `[from, to]`, ordered by due date.
    async fn find_by_date_range(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Payable>, StoreError>;
}

/// All store operations scoped to one all-or-nothing transaction.
/// Dropping a unit of work without committing discards its writes.
#[async_trait]
pub trait UnitOfWork: ChargeStore + LedgerStore + PayableStore {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Read-only unit of work that sees one consistent snapshot.
    async fn begin_snapshot(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// Run `op` inside one unit of work: commit if it succeeds, roll back if it fails.
///
/// ```ignore
/// let charge = run_atomic(store, |tx| Box::pin(async move {
///     let charge = tx.find_charge(id).await?;
///     ...
/// })).await?;
/// ```
pub async fn run_atomic<T, F>(store: &dyn Store, op: F) -> Result<T, EngineError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn UnitOfWork) -> BoxFuture<'t, Result<T, EngineError>> + Send,
{
    let tx = store.begin().await?;
    finish(tx, op).await
}

/// Same as [`run_atomic`] over a read-only snapshot.
pub async fn run_snapshot<T, F>(store: &dyn Store, op: F) -> Result<T, EngineError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn UnitOfWork) -> BoxFuture<'t, Result<T, EngineError>> + Send,
{
    let tx = store.begin_snapshot().await?;
    finish(tx, op).await
}

async fn finish<T, F>(mut tx: Box<dyn UnitOfWork>, op: F) -> Result<T, EngineError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn UnitOfWork) -> BoxFuture<'t, Result<T, EngineError>> + Send,
{
    match op(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; transaction is abandoned");
            }
            Err(err)
        }
    }
}
