//! Services module for cashflow-service.

pub mod calendar;
pub mod clock;
pub mod database;
pub mod engine;
pub mod memory;
pub mod metrics;
mod payables;
pub mod plan_generator;
mod reconciliation;
pub mod recurring;
mod reports;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use engine::CashflowEngine;
pub use memory::{MemoryStore, StoreOp};
pub use metrics::{get_metrics, init_metrics};
pub use store::{run_atomic, run_snapshot, LedgerFilter, Store, StoreError, UnitOfWork};
