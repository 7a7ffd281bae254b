//! Cash-flow ledger entry model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;
use crate::error::{EngineError, Entity};

/// Entry direction (cash in or cash out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "inflow",
            Self::Outflow => "outflow",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inflow" => Some(Self::Inflow),
            "outflow" => Some(Self::Outflow),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Forecast,
    Confirmed,
    Canceled,
    /// Matched against a bank statement by a later, external step.
    Reconciled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Confirmed => "confirmed",
            Self::Canceled => "canceled",
            Self::Reconciled => "reconciled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "forecast" => Some(Self::Forecast),
            "confirmed" => Some(Self::Confirmed),
            "canceled" => Some(Self::Canceled),
            "reconciled" => Some(Self::Reconciled),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub direction: Direction,
    pub amount: Money,
    pub description: String,
    pub status: EntryStatus,
    pub effective_date: NaiveDate,
    pub charge_id: Option<Uuid>,
    /// Recurring series the entry came from, if any.
    pub schedule_id: Option<Uuid>,
    pub payable_id: Option<Uuid>,
    pub category: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        direction: Direction,
        status: EntryStatus,
        amount: Money,
        description: impl Into<String>,
        effective_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            entry_id: Uuid::new_v4(),
            direction,
            amount,
            description: description.into(),
            status,
            effective_date,
            charge_id: None,
            schedule_id: None,
            payable_id: None,
            category: None,
            metadata: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Expected inflow for a pending charge.
    pub fn forecast_inflow(
        charge_id: Uuid,
        amount: Money,
        description: impl Into<String>,
        effective_date: NaiveDate,
    ) -> Self {
        let mut entry = Self::new(
            Direction::Inflow,
            EntryStatus::Forecast,
            amount,
            description,
            effective_date,
        );
        entry.charge_id = Some(charge_id);
        entry
    }

    /// Inflow that already happened, for a charge paid on creation.
    pub fn confirmed_inflow(
        charge_id: Uuid,
        amount: Money,
        description: impl Into<String>,
        effective_date: NaiveDate,
    ) -> Self {
        let mut entry = Self::new(
            Direction::Inflow,
            EntryStatus::Confirmed,
            amount,
            description,
            effective_date,
        );
        entry.charge_id = Some(charge_id);
        entry
    }

    pub fn confirmed_outflow(
        payable_id: Uuid,
        amount: Money,
        description: impl Into<String>,
        effective_date: NaiveDate,
    ) -> Self {
        let mut entry = Self::new(
            Direction::Outflow,
            EntryStatus::Confirmed,
            amount,
            description,
            effective_date,
        );
        entry.payable_id = Some(payable_id);
        entry
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// forecast -> confirmed, effective on the payment date.
    pub fn confirm(&mut self, effective_date: NaiveDate) -> Result<(), EngineError> {
        self.transition(EntryStatus::Confirmed)?;
        self.effective_date = effective_date;
        Ok(())
    }

    /// forecast -> canceled.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        self.transition(EntryStatus::Canceled)
    }

    fn transition(&mut self, to: EntryStatus) -> Result<(), EngineError> {
        if self.status != EntryStatus::Forecast {
            return Err(EngineError::InvalidTransition {
                entity: Entity::LedgerEntry,
                id: self.entry_id,
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        self.status = to;
        self.updated_utc = Utc::now();
        Ok(())
    }
}
