use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::money::Money;

/// Ledger totals for a period, read from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub confirmed_inflow: Money,
    pub confirmed_outflow: Money,
    pub forecast_inflow: Money,
    pub forecast_outflow: Money,
    /// Confirmed inflow minus confirmed outflow, in minor units.
    pub net_confirmed: i64,
}

/// Payable amounts of one category, split by status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: String,
    pub pending: Money,
    pub overdue: Money,
    pub paid: Money,
    pub count: usize,
}

impl CategoryTotals {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            pending: Money::ZERO,
            overdue: Money::ZERO,
            paid: Money::ZERO,
            count: 0,
        }
    }

    pub fn total(&self) -> Result<Money, crate::error::EngineError> {
        Money::sum([self.pending, self.overdue, self.paid])
    }
}
