//! Engine error taxonomy and its mapping onto the shared boundary error.

use service_core::error::{AppError, ErrorResponse};
use thiserror::Error;
use uuid::Uuid;

use crate::services::store::StoreError;

/// Kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Charge,
    LedgerEntry,
    Payable,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::LedgerEntry => "ledger entry",
            Self::Payable => "payable",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Uuid },

    #[error("{entity} {id} is already paid")]
    AlreadyPaid { entity: Entity, id: Uuid },

    #[error("{entity} {id} is already canceled")]
    AlreadyCanceled { entity: Entity, id: Uuid },

    #[error("Charge {charge_id} has {candidates} forecast entries")]
    ReconciliationAmbiguous { charge_id: Uuid, candidates: usize },

    #[error("Cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: Entity,
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("{entity} {id} is paid and can no longer be changed")]
    Immutable { entity: Entity, id: Uuid },

    #[error("{entity} {id} has been deactivated")]
    Inactive { entity: Entity, id: Uuid },

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidPlan(_) => "invalid_plan",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyPaid { .. } => "already_paid",
            Self::AlreadyCanceled { .. } => "already_canceled",
            Self::ReconciliationAmbiguous { .. } => "reconciliation_ambiguous",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Immutable { .. } => "immutable",
            Self::Inactive { .. } => "inactive",
            Self::StorageFailure(_) => "storage_failure",
        }
    }

    /// Render for a transport boundary: status class from [`AppError`], code from here.
    pub fn to_response(self) -> ErrorResponse {
        let code = self.code();
        AppError::from(self).to_response(code)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InvalidAmount(_) | EngineError::InvalidPlan(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            EngineError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(message)),
            EngineError::AlreadyPaid { .. }
            | EngineError::AlreadyCanceled { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::Immutable { .. }
            | EngineError::Inactive { .. } => AppError::Conflict(anyhow::anyhow!(message)),
            EngineError::ReconciliationAmbiguous { .. } => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
            EngineError::StorageFailure(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn maps_to_boundary_status_classes() {
        let id = Uuid::new_v4();
        let cases = [
            (EngineError::InvalidAmount("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::InvalidPlan("x".into()), StatusCode::BAD_REQUEST),
            (
                EngineError::NotFound {
                    entity: Entity::Charge,
                    id,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::AlreadyPaid {
                    entity: Entity::Charge,
                    id,
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Inactive {
                    entity: Entity::Payable,
                    id,
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::StorageFailure(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn response_carries_stable_code() {
        let body = EngineError::AlreadyPaid {
            entity: Entity::Payable,
            id: Uuid::nil(),
        }
        .to_response();
        assert_eq!(body.code, "already_paid");
        assert!(body.error.contains("already paid"));
    }
}
