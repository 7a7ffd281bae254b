//! Payment reconciliation.
//!
//! Paying a charge confirms its forecast inflow, or records a fallback inflow
//! when there is none. Paying a payable records its outflow. Status change and
//! ledger write always commit together.

use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::engine::CashflowEngine;
use super::metrics::{record_ambiguous, record_fallback};
use super::store::{run_atomic, UnitOfWork};
use crate::error::{EngineError, Entity};
use crate::models::{Charge, Direction, EntryStatus, LedgerEntry, Payable, PaymentMethod};

impl CashflowEngine {
    /// Mark a charge paid and confirm its inflow exactly once.
    #[instrument(skip(self), fields(charge_id = %charge_id))]
    pub async fn pay_charge(
        &self,
        charge_id: Uuid,
        paid_on: NaiveDate,
        method: PaymentMethod,
    ) -> Result<Charge, EngineError> {
        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                // Locks the charge row until commit
                let mut charge = tx.find_charge(charge_id).await?.ok_or(EngineError::NotFound {
                    entity: Entity::Charge,
                    id: charge_id,
                })?;
                charge.pay(paid_on, method)?;
                tx.update_charge(&charge).await?;

                confirm_inflow(&mut *tx, &charge, paid_on).await?;
                Ok::<_, EngineError>(charge)
            })
        })
        .await;

        if let Ok(charge) = &result {
            info!(total = %charge.total, method = method.as_str(), "Charge paid");
        }
        Self::observe("pay_charge", result)
    }

    /// Mark a payable paid and record its outflow.
    #[instrument(skip(self), fields(payable_id = %payable_id))]
    pub async fn pay_payable(
        &self,
        payable_id: Uuid,
        paid_on: NaiveDate,
    ) -> Result<Payable, EngineError> {
        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut payable =
                    tx.find_payable(payable_id)
                        .await?
                        .ok_or(EngineError::NotFound {
                            entity: Entity::Payable,
                            id: payable_id,
                        })?;
                payable.pay(paid_on)?;
                tx.update_payable(&payable).await?;

                let mut entry = LedgerEntry::confirmed_outflow(
                    payable.payable_id,
                    payable.amount,
                    payable.description.clone(),
                    paid_on,
                );
                entry.schedule_id = payable.series_id;
                entry.category = Some(payable.category.clone());
                tx.create_entry(&entry).await?;

                Ok::<_, EngineError>(payable)
            })
        })
        .await;

        if let Ok(payable) = &result {
            info!(amount = %payable.amount, category = %payable.category, "Payable paid");
        }
        Self::observe("pay_payable", result)
    }
}

/// Confirm the earliest forecast inflow of a just-paid charge, or write a
/// tagged fallback inflow for the charge total when none exists.
async fn confirm_inflow(
    tx: &mut dyn UnitOfWork,
    charge: &Charge,
    paid_on: NaiveDate,
) -> Result<LedgerEntry, EngineError> {
    let mut forecasts = tx
        .find_for_charge(charge.charge_id, EntryStatus::Forecast, Direction::Inflow)
        .await?
        .into_iter();

    if let Some(mut entry) = forecasts.next() {
        let skipped = forecasts.len();
        if skipped > 0 {
            let ambiguity = EngineError::ReconciliationAmbiguous {
                charge_id: charge.charge_id,
                candidates: skipped + 1,
            };
            warn!(
                error = %ambiguity,
                code = ambiguity.code(),
                entry_id = %entry.entry_id,
                "Several forecast entries for charge; confirming the earliest"
            );
            record_ambiguous();
        }

        entry.confirm(paid_on)?;
        entry.description = receipt_label(&entry.description);
        tx.update_entry(&entry).await?;
        return Ok(entry);
    }

    let confirmed = tx
        .find_for_charge(charge.charge_id, EntryStatus::Confirmed, Direction::Inflow)
        .await?;
    if let Some(existing) = confirmed.into_iter().next() {
        warn!(
            charge_id = %charge.charge_id,
            entry_id = %existing.entry_id,
            "Charge already has a confirmed inflow; no fallback written"
        );
        return Ok(existing);
    }

    let entry = LedgerEntry::confirmed_inflow(
        charge.charge_id,
        charge.total,
        receipt_label(&format!("Charge {}", charge.charge_id)),
        paid_on,
    )
    .with_metadata(json!({
        "fallback": true,
        "reason": "no forecast entry found for charge",
    }));
    warn!(
        charge_id = %charge.charge_id,
        entry_id = %entry.entry_id,
        amount = %charge.total,
        "No forecast entry for paid charge; writing fallback inflow"
    );
    tx.create_entry(&entry).await?;
    record_fallback();
    Ok(entry)
}

fn receipt_label(description: &str) -> String {
    format!("{} (received)", description)
}
