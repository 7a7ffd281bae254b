//! Read-only ledger and payable projections.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::instrument;

use super::engine::CashflowEngine;
use super::store::{run_snapshot, LedgerFilter};
use crate::error::EngineError;
use crate::models::{
    CashFlowSummary, CategoryTotals, Direction, EntryStatus, Money, Payable, PayableStatus,
};

impl CashflowEngine {
    /// Sum of ledger entry amounts matching `filter`.
    #[instrument(skip(self))]
    pub async fn ledger_total(&self, filter: LedgerFilter) -> Result<Money, EngineError> {
        let result = run_snapshot(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let total = tx.sum_entries(&filter).await?;
                Ok::<_, EngineError>(total)
            })
        })
        .await;

        Self::observe("ledger_total", result)
    }

    /// Confirmed and forecast totals in both directions for `[from, to]`.
    #[instrument(skip(self))]
    pub async fn cash_flow_summary(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CashFlowSummary, EngineError> {
        let result = run_snapshot(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let filter = |direction, status| LedgerFilter {
                    direction: Some(direction),
                    status: Some(status),
                    from: Some(from),
                    to: Some(to),
                };

                let confirmed_inflow = tx
                    .sum_entries(&filter(Direction::Inflow, EntryStatus::Confirmed))
                    .await?;
                let confirmed_outflow = tx
                    .sum_entries(&filter(Direction::Outflow, EntryStatus::Confirmed))
                    .await?;
                let forecast_inflow = tx
                    .sum_entries(&filter(Direction::Inflow, EntryStatus::Forecast))
                    .await?;
                let forecast_outflow = tx
                    .sum_entries(&filter(Direction::Outflow, EntryStatus::Forecast))
                    .await?;

                Ok::<_, EngineError>(CashFlowSummary {
                    from,
                    to,
                    confirmed_inflow,
                    confirmed_outflow,
                    forecast_inflow,
                    forecast_outflow,
                    net_confirmed: confirmed_inflow.signed_difference(confirmed_outflow),
                })
            })
        })
        .await;

        Self::observe("cash_flow_summary", result)
    }

    /// Payables due in `[from, to]` grouped by category, after an overdue sweep.
    /// Categories come back in alphabetical order.
    #[instrument(skip(self))]
    pub async fn payables_by_category(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategoryTotals>, EngineError> {
        let result = match self.payables_in_period(from, to).await {
            Ok(payables) => group_by_category(&payables),
            Err(e) => Err(e),
        };

        Self::observe("payables_by_category", result)
    }
}

fn group_by_category(payables: &[Payable]) -> Result<Vec<CategoryTotals>, EngineError> {
    let mut groups: BTreeMap<&str, CategoryTotals> = BTreeMap::new();

    for payable in payables {
        let totals = groups
            .entry(payable.category.as_str())
            .or_insert_with(|| CategoryTotals::new(payable.category.as_str()));
        let bucket = match payable.status {
            PayableStatus::Pending => &mut totals.pending,
            PayableStatus::Overdue => &mut totals.overdue,
            PayableStatus::Paid { .. } => &mut totals.paid,
        };
        *bucket = bucket.add(payable.amount)?;
        totals.count += 1;
    }

    Ok(groups.into_values().collect())
}
