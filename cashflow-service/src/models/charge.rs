//! Charge model: a billable event owed by a client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;
use crate::error::{EngineError, Entity};

/// Who owes the charge. Exactly one kind of client per charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChargeOwner {
    Client(Uuid),
    OccasionalClient(Uuid),
}

impl ChargeOwner {
    pub fn client_id(&self) -> Option<Uuid> {
        match self {
            Self::Client(id) => Some(*id),
            Self::OccasionalClient(_) => None,
        }
    }

    pub fn occasional_client_id(&self) -> Option<Uuid> {
        match self {
            Self::Client(_) => None,
            Self::OccasionalClient(id) => Some(*id),
        }
    }

    /// Rebuild from the two nullable columns; both or neither set is invalid.
    pub fn from_columns(client_id: Option<Uuid>, occasional_client_id: Option<Uuid>) -> Option<Self> {
        match (client_id, occasional_client_id) {
            (Some(id), None) => Some(Self::Client(id)),
            (None, Some(id)) => Some(Self::OccasionalClient(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Pix,
    BankTransfer,
    Boleto,
    CreditCard,
    DebitCard,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Pix => "pix",
            Self::BankTransfer => "bank_transfer",
            Self::Boleto => "boleto",
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Check => "check",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "pix" => Some(Self::Pix),
            "bank_transfer" => Some(Self::BankTransfer),
            "boleto" => Some(Self::Boleto),
            "credit_card" => Some(Self::CreditCard),
            "debit_card" => Some(Self::DebitCard),
            "check" => Some(Self::Check),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn total(&self) -> Result<Money, EngineError> {
        self.unit_price.multiply(self.quantity.into())
    }
}

/// Charge lifecycle. Payment data exists only on `Paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Overdue,
    Paid {
        paid_on: NaiveDate,
        method: PaymentMethod,
    },
    Canceled {
        reason: String,
    },
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Overdue => "overdue",
            Self::Paid { .. } => "paid",
            Self::Canceled { .. } => "canceled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: Uuid,
    pub owner: ChargeOwner,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub due_date: NaiveDate,
    pub status: ChargeStatus,
    pub metadata: Option<serde_json::Value>,
    pub line_items: Vec<LineItem>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Charge {
    /// New pending charge. Fails when the discount exceeds the subtotal.
    pub fn new(
        owner: ChargeOwner,
        subtotal: Money,
        discount: Money,
        due_date: NaiveDate,
    ) -> Result<Self, EngineError> {
        let total = subtotal.subtract(discount)?;
        let now = Utc::now();
        Ok(Self {
            charge_id: Uuid::new_v4(),
            owner,
            subtotal,
            discount,
            total,
            due_date,
            status: ChargeStatus::Pending,
            metadata: None,
            line_items: Vec::new(),
            created_utc: now,
            updated_utc: now,
        })
    }

    pub fn payment_date(&self) -> Option<NaiveDate> {
        match self.status {
            ChargeStatus::Paid { paid_on, .. } => Some(paid_on),
            _ => None,
        }
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        match self.status {
            ChargeStatus::Paid { method, .. } => Some(method),
            _ => None,
        }
    }

    /// pending | overdue -> paid.
    pub fn pay(&mut self, paid_on: NaiveDate, method: PaymentMethod) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.status = ChargeStatus::Paid { paid_on, method };
        self.updated_utc = Utc::now();
        Ok(())
    }

    /// pending | overdue -> canceled.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.status = ChargeStatus::Canceled {
            reason: reason.into(),
        };
        self.updated_utc = Utc::now();
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        match self.status {
            ChargeStatus::Pending | ChargeStatus::Overdue => Ok(()),
            ChargeStatus::Paid { .. } => Err(EngineError::AlreadyPaid {
                entity: Entity::Charge,
                id: self.charge_id,
            }),
            ChargeStatus::Canceled { .. } => Err(EngineError::AlreadyCanceled {
                entity: Entity::Charge,
                id: self.charge_id,
            }),
        }
    }
}
