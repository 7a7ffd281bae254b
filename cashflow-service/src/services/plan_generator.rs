//! Turns a sale into scheduled charges and their ledger entries.
//!
//! Paid-at-sale charges get a confirmed inflow dated `today`; every pending
//! charge gets a forecast inflow dated at its own due date. The output is in
//! persistence order and its charge totals always sum to the sale amount.

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use super::calendar::equal_installments;
use crate::error::EngineError;
use crate::models::{
    Charge, LedgerEntry, Money, PaymentMode, PlannedCharge, SaleSpec, ScheduledInstallment,
};

/// Shared context for every charge of one plan.
struct PlanContext<'a> {
    plan_id: Uuid,
    sale: &'a SaleSpec,
    today: NaiveDate,
}

#[derive(Clone, Copy)]
enum Kind {
    Single,
    DownPayment,
    Installment { number: usize, of: usize },
}

impl PlanContext<'_> {
    fn label(&self, kind: Kind) -> String {
        match kind {
            Kind::Single => self.sale.description.clone(),
            Kind::DownPayment => format!("{} - down payment", self.sale.description),
            Kind::Installment { number, of } => {
                format!("{} - installment {}/{}", self.sale.description, number, of)
            }
        }
    }

    fn metadata(&self, kind: Kind) -> serde_json::Value {
        let mut metadata = json!({
            "plan_id": self.plan_id,
            "mode": self.sale.mode.as_str(),
        });
        match kind {
            Kind::Single => metadata["kind"] = json!("single_payment"),
            Kind::DownPayment => metadata["kind"] = json!("down_payment"),
            Kind::Installment { number, of } => {
                metadata["kind"] = json!("installment");
                metadata["installment"] = json!(number);
                metadata["installments"] = json!(of);
            }
        }
        if let Some(extra) = &self.sale.metadata {
            metadata["sale"] = extra.clone();
        }
        metadata
    }

    fn charge(&self, amount: Money, due_date: NaiveDate, kind: Kind) -> Result<Charge, EngineError> {
        let mut charge = Charge::new(self.sale.owner, amount, Money::ZERO, due_date)?;
        charge.metadata = Some(self.metadata(kind));
        Ok(charge)
    }

    /// Charge settled at sale time, with its confirmed receipt.
    fn paid(&self, amount: Money, due_date: NaiveDate, kind: Kind) -> Result<PlannedCharge, EngineError> {
        let mut charge = self.charge(amount, due_date, kind)?;
        charge.pay(self.today, self.sale.method)?;
        let entry = LedgerEntry::confirmed_inflow(
            charge.charge_id,
            amount,
            self.label(kind),
            self.today,
        )
        .with_metadata(self.metadata(kind));
        Ok(PlannedCharge { charge, entry })
    }

    /// Charge still owed, with its forecast inflow.
    fn pending(&self, installment: ScheduledInstallment, kind: Kind) -> Result<PlannedCharge, EngineError> {
        let charge = self.charge(installment.amount, installment.due_date, kind)?;
        let entry = LedgerEntry::forecast_inflow(
            charge.charge_id,
            installment.amount,
            self.label(kind),
            installment.due_date,
        )
        .with_metadata(self.metadata(kind));
        Ok(PlannedCharge { charge, entry })
    }
}

/// Build the charges and ledger entries for `sale`, created on `today`.
pub fn build_plan(sale: &SaleSpec, today: NaiveDate) -> Result<Vec<PlannedCharge>, EngineError> {
    if sale.amount.is_zero() {
        return Err(EngineError::InvalidAmount(
            "sale amount must be greater than zero".to_string(),
        ));
    }

    let ctx = PlanContext {
        plan_id: Uuid::new_v4(),
        sale,
        today,
    };

    match &sale.mode {
        PaymentMode::SinglePayment => Ok(vec![ctx.paid(sale.amount, today, Kind::Single)?]),

        PaymentMode::Installments { count, schedule } => {
            let installments = resolve_schedule(sale.amount, *count, schedule.as_deref(), 0, today)?;
            let of = installments.len();
            installments
                .into_iter()
                .enumerate()
                .map(|(i, installment)| {
                    let kind = Kind::Installment { number: i + 1, of };
                    if i == 0 {
                        ctx.paid(installment.amount, installment.due_date, kind)
                    } else {
                        ctx.pending(installment, kind)
                    }
                })
                .collect()
        }

        PaymentMode::DownPaymentPlusInstallments {
            down_payment,
            count,
            schedule,
        } => {
            let remaining = sale.amount.subtract(*down_payment).map_err(|_| {
                EngineError::InvalidAmount(format!(
                    "down payment {} exceeds sale amount {}",
                    down_payment, sale.amount
                ))
            })?;

            let mut planned = Vec::new();
            if !down_payment.is_zero() {
                planned.push(ctx.paid(*down_payment, today, Kind::DownPayment)?);
            }
            if remaining.is_zero() {
                return Ok(planned);
            }

            let installments = resolve_schedule(remaining, *count, schedule.as_deref(), 1, today)?;
            let of = installments.len();
            for (i, installment) in installments.into_iter().enumerate() {
                planned.push(ctx.pending(installment, Kind::Installment { number: i + 1, of })?);
            }
            Ok(planned)
        }
    }
}

/// Use the caller's schedule when given, otherwise split `total` evenly.
///
/// An explicit schedule must add up to `total`, carry only non-zero amounts
/// and have due dates in non-decreasing order, none before `today`.
fn resolve_schedule(
    total: Money,
    count: u32,
    schedule: Option<&[ScheduledInstallment]>,
    start_offset_months: u32,
    today: NaiveDate,
) -> Result<Vec<ScheduledInstallment>, EngineError> {
    let Some(explicit) = schedule else {
        return equal_installments(total, count, start_offset_months, today);
    };

    if count < 1 {
        return Err(EngineError::InvalidPlan(
            "installment count must be at least 1".to_string(),
        ));
    }
    if explicit.is_empty() {
        return Err(EngineError::InvalidPlan(
            "installment schedule must not be empty".to_string(),
        ));
    }
    if let Some(i) = explicit.iter().position(|i| i.amount.is_zero()) {
        return Err(EngineError::InvalidPlan(format!(
            "installment {} has a zero amount",
            i + 1
        )));
    }

    let mut previous = today;
    for (i, installment) in explicit.iter().enumerate() {
        if installment.due_date < previous {
            return Err(EngineError::InvalidPlan(format!(
                "installment {} is due {}, before {}",
                i + 1,
                installment.due_date,
                previous
            )));
        }
        previous = installment.due_date;
    }

    let sum = Money::sum(explicit.iter().map(|i| i.amount))?;
    if sum != total {
        return Err(EngineError::InvalidPlan(format!(
            "installments add up to {} but {} is owed",
            sum, total
        )));
    }
    Ok(explicit.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChargeOwner, ChargeStatus, EntryStatus, PaymentMethod};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cents(n: i64) -> Money {
        Money::from_minor(n).unwrap()
    }

    fn sale(amount: i64, mode: PaymentMode) -> SaleSpec {
        SaleSpec {
            owner: ChargeOwner::Client(Uuid::new_v4()),
            amount: cents(amount),
            description: "Bookkeeping package".to_string(),
            mode,
            method: PaymentMethod::Pix,
            metadata: None,
        }
    }

    fn total_of(plan: &[PlannedCharge]) -> i64 {
        plan.iter().map(|p| p.charge.total.minor()).sum()
    }

    #[test]
    fn single_payment_is_one_paid_charge() {
        let today = date(2024, 6, 3);
        let plan = build_plan(&sale(45_000, PaymentMode::SinglePayment), today).unwrap();

        assert_eq!(plan.len(), 1);
        let PlannedCharge { charge, entry } = &plan[0];
        assert_eq!(charge.due_date, today);
        assert_eq!(charge.payment_date(), Some(today));
        assert_eq!(charge.payment_method(), Some(PaymentMethod::Pix));
        assert_eq!(entry.status, EntryStatus::Confirmed);
        assert_eq!(entry.effective_date, today);
        assert_eq!(entry.charge_id, Some(charge.charge_id));
        assert_eq!(entry.amount, charge.total);
    }

    #[test]
    fn installments_pay_first_and_forecast_rest() {
        let today = date(2024, 6, 3);
        let plan = build_plan(
            &sale(
                10_000,
                PaymentMode::Installments {
                    count: 3,
                    schedule: None,
                },
            ),
            today,
        )
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(total_of(&plan), 10_000);
        assert!(matches!(plan[0].charge.status, ChargeStatus::Paid { .. }));
        assert_eq!(plan[0].entry.status, EntryStatus::Confirmed);
        for planned in &plan[1..] {
            assert_eq!(planned.charge.status, ChargeStatus::Pending);
            assert_eq!(planned.entry.status, EntryStatus::Forecast);
            assert_eq!(planned.entry.effective_date, planned.charge.due_date);
        }
        assert_eq!(plan[2].charge.total.minor(), 3334);
    }

    #[test]
    fn explicit_schedule_must_match_sale_amount() {
        let today = date(2024, 6, 3);
        let schedule = vec![
            ScheduledInstallment {
                amount: cents(4_000),
                due_date: today,
            },
            ScheduledInstallment {
                amount: cents(5_000),
                due_date: date(2024, 8, 15),
            },
        ];
        let result = build_plan(
            &sale(
                10_000,
                PaymentMode::Installments {
                    count: 2,
                    schedule: Some(schedule.clone()),
                },
            ),
            today,
        );
        assert!(matches!(result, Err(EngineError::InvalidPlan(_))));

        let plan = build_plan(
            &sale(
                9_000,
                PaymentMode::Installments {
                    count: 7,
                    schedule: Some(schedule),
                },
            ),
            today,
        )
        .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].charge.due_date, date(2024, 8, 15));
        assert_eq!(plan[1].entry.effective_date, date(2024, 8, 15));
    }

    fn installments_with(count: u32, schedule: Vec<(i64, NaiveDate)>) -> PaymentMode {
        PaymentMode::Installments {
            count,
            schedule: Some(
                schedule
                    .into_iter()
                    .map(|(amount, due_date)| ScheduledInstallment {
                        amount: cents(amount),
                        due_date,
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn explicit_schedule_rejects_zero_amounts() {
        let today = date(2024, 6, 3);
        let mode = installments_with(2, vec![(0, today), (1_000, date(2024, 7, 3))]);
        let result = build_plan(&sale(1_000, mode), today);
        assert!(matches!(result, Err(EngineError::InvalidPlan(_))));
    }

    #[test]
    fn explicit_schedule_still_needs_a_count() {
        let today = date(2024, 6, 3);
        let mode = installments_with(0, vec![(400, today), (600, date(2024, 7, 3))]);
        let result = build_plan(&sale(1_000, mode), today);
        assert!(matches!(result, Err(EngineError::InvalidPlan(_))));
    }

    #[test]
    fn explicit_schedule_dates_must_not_go_backwards() {
        let today = date(2024, 6, 3);

        let unordered = installments_with(
            2,
            vec![(400, date(2024, 8, 1)), (600, date(2024, 7, 1))],
        );
        assert!(matches!(
            build_plan(&sale(1_000, unordered), today),
            Err(EngineError::InvalidPlan(_))
        ));

        let backdated = installments_with(
            2,
            vec![(400, date(2024, 5, 1)), (600, date(2024, 7, 1))],
        );
        assert!(matches!(
            build_plan(&sale(1_000, backdated), today),
            Err(EngineError::InvalidPlan(_))
        ));

        let same_day = installments_with(2, vec![(400, today), (600, today)]);
        assert_eq!(build_plan(&sale(1_000, same_day), today).unwrap().len(), 2);
    }

    #[test]
    fn sale_smaller_than_installment_count_is_invalid() {
        let today = date(2024, 6, 3);
        for amount in [2, 3] {
            let result = build_plan(
                &sale(
                    amount,
                    PaymentMode::Installments {
                        count: 4,
                        schedule: None,
                    },
                ),
                today,
            );
            assert!(matches!(result, Err(EngineError::InvalidPlan(_))));
        }

        let plan = build_plan(
            &sale(
                6,
                PaymentMode::Installments {
                    count: 4,
                    schedule: None,
                },
            ),
            today,
        )
        .unwrap();
        assert!(plan.iter().all(|p| !p.charge.total.is_zero() && !p.entry.amount.is_zero()));
        assert_eq!(total_of(&plan), 6);
    }

    #[test]
    fn zero_installments_is_invalid() {
        let result = build_plan(
            &sale(
                10_000,
                PaymentMode::Installments {
                    count: 0,
                    schedule: None,
                },
            ),
            date(2024, 6, 3),
        );
        assert!(matches!(result, Err(EngineError::InvalidPlan(_))));
    }

    #[test]
    fn down_payment_then_pending_installments() {
        let today = date(2024, 1, 31);
        let plan = build_plan(
            &sale(
                12_000,
                PaymentMode::DownPaymentPlusInstallments {
                    down_payment: cents(3_000),
                    count: 3,
                    schedule: None,
                },
            ),
            today,
        )
        .unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(total_of(&plan), 12_000);
        assert_eq!(plan[0].charge.payment_date(), Some(today));
        assert_eq!(plan[0].entry.status, EntryStatus::Confirmed);
        let due: Vec<NaiveDate> = plan[1..].iter().map(|p| p.charge.due_date).collect();
        assert_eq!(due, vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
        assert!(plan[1..]
            .iter()
            .all(|p| p.charge.status == ChargeStatus::Pending
                && p.entry.status == EntryStatus::Forecast));
    }

    #[test]
    fn zero_down_payment_emits_only_installments() {
        let plan = build_plan(
            &sale(
                9_000,
                PaymentMode::DownPaymentPlusInstallments {
                    down_payment: Money::ZERO,
                    count: 3,
                    schedule: None,
                },
            ),
            date(2024, 6, 3),
        )
        .unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.charge.status == ChargeStatus::Pending));
    }

    #[test]
    fn down_payment_larger_than_sale_is_rejected() {
        let result = build_plan(
            &sale(
                1_000,
                PaymentMode::DownPaymentPlusInstallments {
                    down_payment: cents(1_001),
                    count: 2,
                    schedule: None,
                },
            ),
            date(2024, 6, 3),
        );
        assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn entries_carry_plan_metadata() {
        let plan = build_plan(
            &sale(
                900,
                PaymentMode::Installments {
                    count: 3,
                    schedule: None,
                },
            ),
            date(2024, 6, 3),
        )
        .unwrap();
        let plan_id = plan[0].charge.metadata.as_ref().unwrap()["plan_id"].clone();
        for (i, p) in plan.iter().enumerate() {
            let meta = p.entry.metadata.as_ref().unwrap();
            assert_eq!(meta["plan_id"], plan_id);
            assert_eq!(meta["installment"], json!(i + 1));
            assert_eq!(meta["installments"], json!(3));
        }
        assert_eq!(plan[1].entry.description, "Bookkeeping package - installment 2/3");
    }
}
