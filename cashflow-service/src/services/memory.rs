//! In-process store.
//!
//! Units of work run one at a time against a private copy of the tables and
//! publish it on commit, so every unit of work is serializable. Faults can be
//! injected per operation to exercise rollback paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{
    ChargeStore, LedgerFilter, LedgerStore, PayableStore, Store, StoreError, UnitOfWork,
};
use crate::models::{Charge, Direction, EntryStatus, LedgerEntry, Money, Payable, PayableStatus};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Begin,
    CreateCharge,
    UpdateCharge,
    CreateEntry,
    UpdateEntry,
    CreatePayable,
    UpdatePayable,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    charges: HashMap<Uuid, Charge>,
    /// Insertion order is creation order.
    entries: Vec<LedgerEntry>,
    payables: HashMap<Uuid, Payable>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Mutex<Vec<StoreOp>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(op);
        }
    }

    /// Insert records directly, bypassing the engine. Useful for seeding
    /// legacy data that did not go through schedule generation.
    pub async fn seed_charge(&self, charge: Charge) {
        self.tables.lock().await.charges.insert(charge.charge_id, charge);
    }

    pub async fn seed_entry(&self, entry: LedgerEntry) {
        self.tables.lock().await.entries.push(entry);
    }

    pub async fn seed_payable(&self, payable: Payable) {
        self.tables.lock().await.payables.insert(payable.payable_id, payable);
    }

    pub async fn charge(&self, charge_id: Uuid) -> Option<Charge> {
        self.tables.lock().await.charges.get(&charge_id).cloned()
    }

    pub async fn payable(&self, payable_id: Uuid) -> Option<Payable> {
        self.tables.lock().await.payables.get(&payable_id).cloned()
    }

    /// Every committed entry, in creation order.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.tables.lock().await.entries.clone()
    }

    pub async fn entries_for_charge(&self, charge_id: Uuid) -> Vec<LedgerEntry> {
        self.tables
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.charge_id == Some(charge_id))
            .cloned()
            .collect()
    }

    pub async fn payables(&self) -> Vec<Payable> {
        let mut payables: Vec<Payable> =
            self.tables.lock().await.payables.values().cloned().collect();
        payables.sort_by_key(|p| (p.due_date, p.sequence));
        payables
    }

    fn check(faults: &Mutex<Vec<StoreOp>>, op: StoreOp) -> Result<(), StoreError> {
        let mut faults = faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault registry poisoned".to_string()))?;
        if let Some(pos) = faults.iter().position(|f| *f == op) {
            faults.remove(pos);
            return Err(StoreError::Unavailable(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Mutex<Vec<StoreOp>>>,
}

impl MemoryUnitOfWork {
    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        MemoryStore::check(&self.faults, op)
    }

    /// Mirrors the unique index on confirmed (charge, direction) pairs.
    fn confirms_twice(&self, entry: &LedgerEntry) -> bool {
        entry.status == EntryStatus::Confirmed
            && entry.charge_id.is_some()
            && self.working.entries.iter().any(|e| {
                e.entry_id != entry.entry_id
                    && e.charge_id == entry.charge_id
                    && e.direction == entry.direction
                    && e.status == EntryStatus::Confirmed
            })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Self::check(&self.faults, StoreOp::Begin)?;
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn begin_snapshot(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        self.begin().await
    }
}

#[async_trait]
impl ChargeStore for MemoryUnitOfWork {
    async fn create_charge(&mut self, charge: &Charge) -> Result<(), StoreError> {
        self.check(StoreOp::CreateCharge)?;
        if self.working.charges.contains_key(&charge.charge_id) {
            return Err(StoreError::Conflict(format!(
                "charge {} already exists",
                charge.charge_id
            )));
        }
        self.working.charges.insert(charge.charge_id, charge.clone());
        Ok(())
    }

    async fn find_charge(&mut self, charge_id: Uuid) -> Result<Option<Charge>, StoreError> {
        Ok(self.working.charges.get(&charge_id).cloned())
    }

    async fn update_charge(&mut self, charge: &Charge) -> Result<(), StoreError> {
        self.check(StoreOp::UpdateCharge)?;
        match self.working.charges.get_mut(&charge.charge_id) {
            Some(stored) => {
                *stored = charge.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(charge.charge_id)),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryUnitOfWork {
    async fn create_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.check(StoreOp::CreateEntry)?;
        if self.confirms_twice(entry) {
            return Err(StoreError::Conflict(format!(
                "charge {:?} already has a confirmed {} entry",
                entry.charge_id, entry.direction
            )));
        }
        self.working.entries.push(entry.clone());
        Ok(())
    }

    async fn find_entry(&mut self, entry_id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .working
            .entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned())
    }

    async fn find_for_charge(
        &mut self,
        charge_id: Uuid,
        status: EntryStatus,
        direction: Direction,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .working
            .entries
            .iter()
            .filter(|e| {
                e.charge_id == Some(charge_id) && e.status == status && e.direction == direction
            })
            .cloned()
            .collect())
    }

    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.check(StoreOp::UpdateEntry)?;
        if self.confirms_twice(entry) {
            return Err(StoreError::Conflict(format!(
                "charge {:?} already has a confirmed {} entry",
                entry.charge_id, entry.direction
            )));
        }
        match self
            .working
            .entries
            .iter_mut()
            .find(|e| e.entry_id == entry.entry_id)
        {
            Some(stored) => {
                *stored = entry.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(entry.entry_id)),
        }
    }

    async fn sum_entries(&mut self, filter: &LedgerFilter) -> Result<Money, StoreError> {
        Money::sum(
            self.working
                .entries
                .iter()
                .filter(|e| filter.matches(e))
                .map(|e| e.amount),
        )
        .map_err(|e| StoreError::InvalidRecord(e.to_string()))
    }
}

#[async_trait]
impl PayableStore for MemoryUnitOfWork {
    async fn create_payable(&mut self, payable: &Payable) -> Result<(), StoreError> {
        self.check(StoreOp::CreatePayable)?;
        if self.working.payables.contains_key(&payable.payable_id) {
            return Err(StoreError::Conflict(format!(
                "payable {} already exists",
                payable.payable_id
            )));
        }
        self.working
            .payables
            .insert(payable.payable_id, payable.clone());
        Ok(())
    }

    async fn find_payable(&mut self, payable_id: Uuid) -> Result<Option<Payable>, StoreError> {
        Ok(self.working.payables.get(&payable_id).cloned())
    }

    async fn update_payable(&mut self, payable: &Payable) -> Result<(), StoreError> {
        self.check(StoreOp::UpdatePayable)?;
        match self.working.payables.get_mut(&payable.payable_id) {
            Some(stored) => {
                *stored = payable.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(payable.payable_id)),
        }
    }

    async fn find_overdue_candidates(&mut self, today: NaiveDate) -> Result<Vec<Payable>, StoreError> {
        let mut candidates: Vec<Payable> = self
            .working
            .payables
            .values()
            .filter(|p| p.active && p.status == PayableStatus::Pending && p.due_date < today)
            .cloned()
            .collect();
        candidates.sort_by_key(|p| p.due_date);
        Ok(candidates)
    }

    async fn find_by_date_range(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Payable>, StoreError> {
        let mut payables: Vec<Payable> = self
            .working
            .payables
            .values()
            .filter(|p| p.active && p.due_date >= from && p.due_date <= to)
            .cloned()
            .collect();
        payables.sort_by_key(|p| (p.due_date, p.sequence));
        Ok(payables)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork {
            mut guard,
            working,
            faults,
        } = *self;
        MemoryStore::check(&faults, StoreOp::Commit)?;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
