//! Expansion of a recurring payable into its future occurrences.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::calendar::next_cadence_date;
use crate::error::EngineError;
use crate::models::{Cadence, Payable, PayableSpec, PayableStatus};

/// Occurrences materialized after the template of a recurring payable.
pub const RECURRENCE_HORIZON: u32 = 12;

/// The template payable followed by [`RECURRENCE_HORIZON`] occurrences for
/// recurring cadences, or just the template for one-off (and unset) cadences.
pub fn expand(spec: &PayableSpec) -> Result<Vec<Payable>, EngineError> {
    if spec.cadence.is_none() {
        debug!(description = %spec.description, "No cadence given, treating payable as one-off");
    }
    let cadence = spec.cadence.unwrap_or_default();
    let series_id = cadence.is_recurring().then(Uuid::new_v4);

    let steps = if cadence.is_recurring() {
        RECURRENCE_HORIZON
    } else {
        0
    };

    (0..=steps)
        .map(|k| {
            let due_date = next_cadence_date(spec.first_due_date, cadence, k)?;
            Ok(occurrence(spec, cadence, series_id, k, due_date))
        })
        .collect()
}

fn occurrence(
    spec: &PayableSpec,
    cadence: Cadence,
    series_id: Option<Uuid>,
    sequence: u32,
    due_date: chrono::NaiveDate,
) -> Payable {
    let now = Utc::now();
    Payable {
        payable_id: Uuid::new_v4(),
        description: spec.description.clone(),
        amount: spec.amount,
        category: spec.category.clone(),
        due_date,
        cadence,
        status: PayableStatus::Pending,
        active: true,
        series_id,
        sequence,
        created_utc: now,
        updated_utc: now,
    }
}
