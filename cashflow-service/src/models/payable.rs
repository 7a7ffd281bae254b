//! Payable model: an obligation the business owes, optionally recurring.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;
use crate::error::{EngineError, Entity};

/// Repetition interval of a payable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    OneOff,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Cadence {
    /// Calendar months per step; `None` for one-off.
    pub fn months(&self) -> Option<u32> {
        match self {
            Self::OneOff => None,
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Semiannual => Some(6),
            Self::Annual => Some(12),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.months().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneOff => "one_off",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Annual => "annual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "one_off" => Some(Self::OneOff),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannual" => Some(Self::Semiannual),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayableStatus {
    Pending,
    Overdue,
    Paid { paid_on: NaiveDate },
}

impl PayableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Overdue => "overdue",
            Self::Paid { .. } => "paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payable {
    pub payable_id: Uuid,
    pub description: String,
    pub amount: Money,
    pub category: String,
    pub due_date: NaiveDate,
    pub cadence: Cadence,
    pub status: PayableStatus,
    /// Soft-delete flag.
    pub active: bool,
    /// Shared by every occurrence expanded from the same template.
    pub series_id: Option<Uuid>,
    /// 0 for the template, k for the k-th expanded occurrence.
    pub sequence: u32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a payable (and its recurring occurrences).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayableSpec {
    pub description: String,
    pub amount: Money,
    pub category: String,
    pub first_due_date: NaiveDate,
    /// Unset means one-off.
    pub cadence: Option<Cadence>,
}

/// Partial update of an unpaid payable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayableChanges {
    pub description: Option<String>,
    pub amount: Option<Money>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl Payable {
    pub fn payment_date(&self) -> Option<NaiveDate> {
        match self.status {
            PayableStatus::Paid { paid_on } => Some(paid_on),
            _ => None,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.status, PayableStatus::Paid { .. })
    }

    /// pending | overdue -> paid. Deactivated payables cannot be paid.
    pub fn pay(&mut self, paid_on: NaiveDate) -> Result<(), EngineError> {
        if self.is_paid() {
            return Err(EngineError::AlreadyPaid {
                entity: Entity::Payable,
                id: self.payable_id,
            });
        }
        self.ensure_active()?;
        self.status = PayableStatus::Paid { paid_on };
        self.updated_utc = Utc::now();
        Ok(())
    }

    /// pending -> overdue when the due date is strictly before `today`.
    /// Returns whether the status changed.
    pub fn mark_overdue_if_late(&mut self, today: NaiveDate) -> bool {
        if self.status == PayableStatus::Pending && self.active && self.due_date < today {
            self.status = PayableStatus::Overdue;
            self.updated_utc = Utc::now();
            return true;
        }
        false
    }

    pub fn apply(&mut self, changes: PayableChanges) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        self.ensure_active()?;
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(amount) = changes.amount {
            self.amount = amount;
        }
        if let Some(category) = changes.category {
            self.category = category;
        }
        if let Some(due_date) = changes.due_date {
            self.due_date = due_date;
            // A moved due date is re-evaluated by the next sweep.
            if self.status == PayableStatus::Overdue {
                self.status = PayableStatus::Pending;
            }
        }
        self.updated_utc = Utc::now();
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        self.active = false;
        self.updated_utc = Utc::now();
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), EngineError> {
        if self.is_paid() {
            return Err(EngineError::Immutable {
                entity: Entity::Payable,
                id: self.payable_id,
            });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if !self.active {
            return Err(EngineError::Inactive {
                entity: Entity::Payable,
                id: self.payable_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payable(due: NaiveDate) -> Payable {
        let now = Utc::now();
        Payable {
            payable_id: Uuid::new_v4(),
            description: "Office rent".to_string(),
            amount: Money::from_minor(150_000).unwrap(),
            category: "rent".to_string(),
            due_date: due,
            cadence: Cadence::OneOff,
            status: PayableStatus::Pending,
            active: true,
            series_id: None,
            sequence: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn overdue_only_when_strictly_late() {
        let mut p = payable(date(2024, 5, 10));
        assert!(!p.mark_overdue_if_late(date(2024, 5, 10)));
        assert!(p.mark_overdue_if_late(date(2024, 5, 11)));
        assert_eq!(p.status, PayableStatus::Overdue);
        assert!(!p.mark_overdue_if_late(date(2024, 5, 12)));
    }

    #[test]
    fn inactive_payables_never_go_overdue() {
        let mut p = payable(date(2024, 5, 10));
        p.deactivate().unwrap();
        assert!(!p.mark_overdue_if_late(date(2024, 6, 1)));
    }

    #[test]
    fn inactive_payables_cannot_be_paid_or_edited() {
        let mut p = payable(date(2024, 5, 10));
        p.deactivate().unwrap();

        assert!(matches!(
            p.pay(date(2024, 5, 10)),
            Err(EngineError::Inactive { .. })
        ));
        assert!(matches!(
            p.apply(PayableChanges {
                description: Some("Office rent (May)".to_string()),
                ..Default::default()
            }),
            Err(EngineError::Inactive { .. })
        ));
        assert_eq!(p.status, PayableStatus::Pending);
        assert_eq!(p.description, "Office rent");
    }

    #[test]
    fn paid_payables_are_immutable() {
        let mut p = payable(date(2024, 5, 10));
        p.pay(date(2024, 5, 9)).unwrap();
        assert!(matches!(
            p.pay(date(2024, 5, 9)),
            Err(EngineError::AlreadyPaid { .. })
        ));
        assert!(matches!(
            p.apply(PayableChanges {
                amount: Some(Money::ZERO),
                ..Default::default()
            }),
            Err(EngineError::Immutable { .. })
        ));
        assert!(matches!(p.deactivate(), Err(EngineError::Immutable { .. })));
        assert!(p.active);
    }

    #[test]
    fn cadence_months() {
        assert_eq!(Cadence::OneOff.months(), None);
        assert_eq!(Cadence::Monthly.months(), Some(1));
        assert_eq!(Cadence::Quarterly.months(), Some(3));
        assert_eq!(Cadence::Semiannual.months(), Some(6));
        assert_eq!(Cadence::Annual.months(), Some(12));
        assert_eq!(Cadence::from_str("semiannual"), Some(Cadence::Semiannual));
    }
}
