//! Cashflow Service - Receivable schedules, recurring payables and payment
//! reconciliation against the cash-flow ledger.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
