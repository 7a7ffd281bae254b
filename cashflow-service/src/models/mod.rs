//! Domain models for cashflow-service.

#![allow(clippy::should_implement_trait)]

mod charge;
mod entry;
mod money;
mod payable;
mod plan;
mod report;

pub use charge::{Charge, ChargeOwner, ChargeStatus, LineItem, PaymentMethod};
pub use entry::{Direction, EntryStatus, LedgerEntry};
pub use money::Money;
pub use payable::{Cadence, Payable, PayableChanges, PayableSpec, PayableStatus};
pub use plan::{ChargeSpec, PaymentMode, PlannedCharge, SaleSpec, ScheduledInstallment};
pub use report::{CashFlowSummary, CategoryTotals};
