//! Payable lifecycle: creation with recurrence, edits, soft delete and the
//! overdue sweep.

use chrono::NaiveDate;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::engine::CashflowEngine;
use super::metrics::record_overdue_swept;
use super::recurring::expand;
use super::store::{run_atomic, run_snapshot};
use crate::error::{EngineError, Entity};
use crate::models::{Payable, PayableChanges, PayableSpec};

impl CashflowEngine {
    /// Create a payable and, for recurring cadences, its future occurrences.
    #[instrument(skip(self, spec), fields(category = %spec.category, cadence = ?spec.cadence))]
    pub async fn expand_recurring_payable(
        &self,
        spec: PayableSpec,
    ) -> Result<Vec<Payable>, EngineError> {
        let result = match validate_spec(&spec).and_then(|_| expand(&spec)) {
            Ok(payables) => {
                run_atomic(self.store.as_ref(), move |tx| {
                    Box::pin(async move {
                        for payable in &payables {
                            tx.create_payable(payable).await?;
                        }
                        Ok::<_, EngineError>(payables)
                    })
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Ok(payables) = &result {
            info!(occurrences = payables.len(), "Payable created");
        }
        Self::observe("expand_recurring_payable", result)
    }

    /// Edit an unpaid payable.
    #[instrument(skip(self, changes), fields(payable_id = %payable_id))]
    pub async fn update_payable(
        &self,
        payable_id: Uuid,
        changes: PayableChanges,
    ) -> Result<Payable, EngineError> {
        if changes.amount.is_some_and(|amount| amount.is_zero()) {
            return Self::observe(
                "update_payable",
                Err(EngineError::InvalidAmount(
                    "payable amount must be greater than zero".to_string(),
                )),
            );
        }

        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut payable = tx.find_payable(payable_id).await?.ok_or(EngineError::NotFound {
                    entity: Entity::Payable,
                    id: payable_id,
                })?;
                payable.apply(changes)?;
                tx.update_payable(&payable).await?;
                Ok::<_, EngineError>(payable)
            })
        })
        .await;

        Self::observe("update_payable", result)
    }

    /// Soft delete an unpaid payable.
    #[instrument(skip(self), fields(payable_id = %payable_id))]
    pub async fn deactivate_payable(&self, payable_id: Uuid) -> Result<Payable, EngineError> {
        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut payable = tx.find_payable(payable_id).await?.ok_or(EngineError::NotFound {
                    entity: Entity::Payable,
                    id: payable_id,
                })?;
                payable.deactivate()?;
                tx.update_payable(&payable).await?;
                Ok::<_, EngineError>(payable)
            })
        })
        .await;

        if result.is_ok() {
            info!("Payable deactivated");
        }
        Self::observe("deactivate_payable", result)
    }

    /// Move every active pending payable due before `today` to overdue.
    /// Returns how many changed; a second run on the same day changes none.
    #[instrument(skip(self))]
    pub async fn sweep_overdue(&self, today: NaiveDate) -> Result<usize, EngineError> {
        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let candidates = tx.find_overdue_candidates(today).await?;
                let mut swept = 0usize;
                for mut payable in candidates {
                    if payable.mark_overdue_if_late(today) {
                        tx.update_payable(&payable).await?;
                        swept += 1;
                    }
                }
                Ok::<_, EngineError>(swept)
            })
        })
        .await;

        if let Ok(swept) = result {
            record_overdue_swept(swept as u64);
            if swept > 0 {
                info!(swept = swept, "Payables marked overdue");
            } else {
                debug!("No payables to mark overdue");
            }
        }
        Self::observe("sweep_overdue", result)
    }

    /// Active payables due within `[from, to]`, with statuses brought up to date.
    #[instrument(skip(self))]
    pub async fn payables_in_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Payable>, EngineError> {
        self.sweep_overdue(self.clock.today()).await?;

        let result = run_snapshot(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let payables = tx.find_by_date_range(from, to).await?;
                Ok::<_, EngineError>(payables)
            })
        })
        .await;

        Self::observe("payables_in_period", result)
    }
}

fn validate_spec(spec: &PayableSpec) -> Result<(), EngineError> {
    if spec.amount.is_zero() {
        return Err(EngineError::InvalidAmount(
            "payable amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
