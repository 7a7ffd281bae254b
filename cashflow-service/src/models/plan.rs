//! Transient inputs and outputs of schedule generation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Charge, ChargeOwner, LedgerEntry, LineItem, Money, PaymentMethod};

/// One caller-supplied installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub amount: Money,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    SinglePayment,
    /// `schedule`, when present, overrides `count`.
    Installments {
        count: u32,
        schedule: Option<Vec<ScheduledInstallment>>,
    },
    DownPaymentPlusInstallments {
        down_payment: Money,
        count: u32,
        schedule: Option<Vec<ScheduledInstallment>>,
    },
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePayment => "single_payment",
            Self::Installments { .. } => "installments",
            Self::DownPaymentPlusInstallments { .. } => "down_payment_plus_installments",
        }
    }
}

/// A sold service to be turned into charges and ledger entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleSpec {
    pub owner: ChargeOwner,
    pub amount: Money,
    pub description: String,
    pub mode: PaymentMode,
    /// Method recorded on the charges that are paid at sale time.
    pub method: PaymentMethod,
    pub metadata: Option<serde_json::Value>,
}

/// A charge with the ledger entry created alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCharge {
    pub charge: Charge,
    pub entry: LedgerEntry,
}

/// Direct invoicing input: a pending charge built from line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSpec {
    pub owner: ChargeOwner,
    pub description: String,
    pub line_items: Vec<LineItem>,
    pub discount: Money,
    pub due_date: NaiveDate,
    pub metadata: Option<serde_json::Value>,
}
