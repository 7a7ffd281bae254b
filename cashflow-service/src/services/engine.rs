//! Engine entry points for sales and direct charges.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use super::clock::Clock;
use super::metrics::record_operation;
use super::plan_generator::build_plan;
use super::store::{run_atomic, Store};
use crate::error::{EngineError, Entity};
use crate::models::{
    Charge, ChargeSpec, Direction, EntryStatus, LedgerEntry, LineItem, Money, PlannedCharge,
    SaleSpec,
};

/// Schedule generation and reconciliation over an injected store.
#[derive(Clone)]
pub struct CashflowEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CashflowEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record the outcome of an operation and pass it through.
    pub(crate) fn observe<T>(
        operation: &str,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match &result {
            Ok(_) => record_operation(operation, "success"),
            Err(e) => record_operation(operation, e.code()),
        }
        result
    }

    /// Persist the charges and ledger entries for a sale in one unit of work.
    #[instrument(skip(self, sale), fields(mode = sale.mode.as_str(), amount = %sale.amount))]
    pub async fn generate_plan(&self, sale: SaleSpec) -> Result<Vec<PlannedCharge>, EngineError> {
        let today = self.clock.today();
        let result = match build_plan(&sale, today) {
            Ok(plan) => {
                run_atomic(self.store.as_ref(), move |tx| {
                    Box::pin(async move {
                        for planned in &plan {
                            tx.create_charge(&planned.charge).await?;
                            tx.create_entry(&planned.entry).await?;
                        }
                        Ok::<_, EngineError>(plan)
                    })
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Ok(plan) = &result {
            info!(charges = plan.len(), "Payment plan generated");
        }
        Self::observe("generate_plan", result)
    }

    /// Direct invoicing: one pending charge built from line items, with its
    /// forecast inflow on the due date.
    #[instrument(skip(self, spec), fields(due_date = %spec.due_date))]
    pub async fn create_charge(&self, spec: ChargeSpec) -> Result<PlannedCharge, EngineError> {
        let result = match charge_from_spec(spec) {
            Ok(planned) => {
                run_atomic(self.store.as_ref(), move |tx| {
                    Box::pin(async move {
                        tx.create_charge(&planned.charge).await?;
                        tx.create_entry(&planned.entry).await?;
                        Ok::<_, EngineError>(planned)
                    })
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Ok(planned) = &result {
            info!(charge_id = %planned.charge.charge_id, total = %planned.charge.total, "Charge created");
        }
        Self::observe("create_charge", result)
    }

    /// Cancel an open charge together with its forecast inflows.
    #[instrument(skip(self, reason))]
    pub async fn cancel_charge(
        &self,
        charge_id: Uuid,
        reason: String,
    ) -> Result<Charge, EngineError> {
        let result = run_atomic(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut charge = tx.find_charge(charge_id).await?.ok_or(EngineError::NotFound {
                    entity: Entity::Charge,
                    id: charge_id,
                })?;
                charge.cancel(reason)?;
                tx.update_charge(&charge).await?;

                let forecasts = tx
                    .find_for_charge(charge_id, EntryStatus::Forecast, Direction::Inflow)
                    .await?;
                for mut entry in forecasts {
                    entry.cancel()?;
                    tx.update_entry(&entry).await?;
                }
                Ok::<_, EngineError>(charge)
            })
        })
        .await;

        if result.is_ok() {
            info!(charge_id = %charge_id, "Charge canceled");
        }
        Self::observe("cancel_charge", result)
    }
}

fn charge_from_spec(spec: ChargeSpec) -> Result<PlannedCharge, EngineError> {
    let subtotal = Money::sum(
        spec.line_items
            .iter()
            .map(LineItem::total)
            .collect::<Result<Vec<_>, _>>()?,
    )?;

    let mut charge = Charge::new(spec.owner, subtotal, spec.discount, spec.due_date)?;
    if charge.total.is_zero() {
        return Err(EngineError::InvalidAmount(
            "charge total must be greater than zero".to_string(),
        ));
    }
    charge.line_items = spec.line_items;
    charge.metadata = spec.metadata.clone();

    let mut entry = LedgerEntry::forecast_inflow(
        charge.charge_id,
        charge.total,
        spec.description,
        charge.due_date,
    );
    entry.metadata = spec.metadata;

    Ok(PlannedCharge { charge, entry })
}
