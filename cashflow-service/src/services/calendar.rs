//! Due-date arithmetic for cadences and installment splits.
//!
//! All dates are UTC calendar dates. Adding months clamps to the last valid
//! day of the target month (Jan 31 + 1 month = Feb 28/29).

use chrono::{Months, NaiveDate};

use crate::error::EngineError;
use crate::models::{Cadence, Money, ScheduledInstallment};

/// `base` plus `months` calendar months, clamped to month end.
pub fn add_months(base: NaiveDate, months: u32) -> Result<NaiveDate, EngineError> {
    base.checked_add_months(Months::new(months)).ok_or_else(|| {
        EngineError::InvalidPlan(format!("{} + {} months is out of range", base, months))
    })
}

/// `base` advanced by `n` cadence periods. One-off cadences never move.
pub fn next_cadence_date(base: NaiveDate, cadence: Cadence, n: u32) -> Result<NaiveDate, EngineError> {
    match cadence.months() {
        None => Ok(base),
        Some(step) => {
            let months = step.checked_mul(n).ok_or_else(|| {
                EngineError::InvalidPlan(format!("{} x {} periods overflows", cadence, n))
            })?;
            add_months(base, months)
        }
    }
}

/// Split `total` into `count` monthly shares due `start_offset_months`,
/// `start_offset_months + 1`, ... months after `created_on`.
///
/// Every share but the last is `total / count` rounded half-up; the last one
/// absorbs the difference so the shares always sum to `total`. When rounding
/// up would leave the last share zero or negative, the shares are truncated
/// instead.
///
/// A total smaller than `count` minor units cannot give every share a
/// positive amount and is rejected.
pub fn equal_installments(
    total: Money,
    count: u32,
    start_offset_months: u32,
    created_on: NaiveDate,
) -> Result<Vec<ScheduledInstallment>, EngineError> {
    if count < 1 {
        return Err(EngineError::InvalidPlan(
            "installment count must be at least 1".to_string(),
        ));
    }
    if total.minor() < i64::from(count) {
        return Err(EngineError::InvalidPlan(format!(
            "{} cannot be split into {} non-zero installments",
            total, count
        )));
    }

    let leading = i64::from(count - 1);
    let mut share = total.divide(count)?;
    if share.minor() * leading >= total.minor() {
        share = Money::from_minor(total.minor() / i64::from(count))?;
    }
    let last = Money::from_minor(total.minor() - share.minor() * leading)?;

    (0..count)
        .map(|i| {
            let amount = if i + 1 == count { last } else { share };
            let due_date = add_months(created_on, start_offset_months + i)?;
            Ok(ScheduledInstallment { amount, due_date })
        })
        .collect()
}
