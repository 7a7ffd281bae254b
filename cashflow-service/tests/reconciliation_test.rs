//! Payment reconciliation tests: exactly-once confirmation, fallback entries,
//! ambiguous forecasts and rollback on storage failure.

mod common;

use cashflow_service::error::{EngineError, Entity};
use cashflow_service::models::{ChargeStatus, Direction, EntryStatus, PaymentMethod};
use cashflow_service::services::StoreOp;
use common::{cents, date, forecast_for, installments, orphan_charge, sale, spawn_engine};
use uuid::Uuid;

#[tokio::test]
async fn paying_a_charge_confirms_its_forecast_exactly_once() {
    let app = spawn_engine(date(2024, 6, 3));
    let plan = app
        .engine
        .generate_plan(sale(10_000, installments(3)))
        .await
        .unwrap();
    let charge_id = plan[1].charge.charge_id;
    let forecast_id = plan[1].entry.entry_id;

    let paid = app
        .engine
        .pay_charge(charge_id, date(2024, 7, 1), PaymentMethod::Boleto)
        .await
        .unwrap();
    assert_eq!(paid.payment_date(), Some(date(2024, 7, 1)));
    assert_eq!(paid.payment_method(), Some(PaymentMethod::Boleto));

    let entries = app.store.entries_for_charge(charge_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_id, forecast_id);
    assert_eq!(entries[0].status, EntryStatus::Confirmed);
    assert_eq!(entries[0].effective_date, date(2024, 7, 1));
    assert!(entries[0].description.ends_with("(received)"));

    // Second payment is rejected and writes nothing
    let again = app
        .engine
        .pay_charge(charge_id, date(2024, 7, 2), PaymentMethod::Pix)
        .await;
    assert!(matches!(
        again,
        Err(EngineError::AlreadyPaid { entity: Entity::Charge, id }) if id == charge_id
    ));
    let entries = app.store.entries_for_charge(charge_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].effective_date, date(2024, 7, 1));
}

#[tokio::test]
async fn paying_an_unknown_charge_is_not_found() {
    let app = spawn_engine(date(2024, 6, 3));
    let missing = Uuid::new_v4();

    let result = app
        .engine
        .pay_charge(missing, date(2024, 6, 3), PaymentMethod::Cash)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound { entity: Entity::Charge, id }) if id == missing
    ));
}

#[tokio::test]
async fn canceled_charge_cannot_be_paid() {
    let app = spawn_engine(date(2024, 6, 3));
    let plan = app
        .engine
        .generate_plan(sale(6_000, installments(2)))
        .await
        .unwrap();
    let charge_id = plan[1].charge.charge_id;
    app.engine
        .cancel_charge(charge_id, "renegotiated".to_string())
        .await
        .unwrap();

    let result = app
        .engine
        .pay_charge(charge_id, date(2024, 6, 10), PaymentMethod::Pix)
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyCanceled { .. })));
}

#[tokio::test]
async fn charge_without_forecast_gets_one_fallback_entry() {
    let app = spawn_engine(date(2024, 6, 3));
    let charge = orphan_charge(7_350, date(2024, 6, 15));
    let charge_id = charge.charge_id;
    app.store.seed_charge(charge).await;

    app.engine
        .pay_charge(charge_id, date(2024, 6, 14), PaymentMethod::Cash)
        .await
        .unwrap();

    let entries = app.store.entries_for_charge(charge_id).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.status, EntryStatus::Confirmed);
    assert_eq!(entry.direction, Direction::Inflow);
    assert_eq!(entry.amount, cents(7_350));
    assert_eq!(entry.effective_date, date(2024, 6, 14));
    assert_eq!(entry.metadata.as_ref().unwrap()["fallback"], true);
}

#[tokio::test]
async fn fallback_is_not_duplicated_on_retry_after_failure() {
    let app = spawn_engine(date(2024, 6, 3));
    let charge = orphan_charge(5_000, date(2024, 6, 15));
    let charge_id = charge.charge_id;
    app.store.seed_charge(charge).await;

    app.store.fail_next(StoreOp::CreateEntry);
    let failed = app
        .engine
        .pay_charge(charge_id, date(2024, 6, 14), PaymentMethod::Pix)
        .await;
    assert!(matches!(failed, Err(EngineError::StorageFailure(_))));

    // Nothing from the failed attempt is visible
    let stored = app.store.charge(charge_id).await.unwrap();
    assert_eq!(stored.status, ChargeStatus::Pending);
    assert!(app.store.entries_for_charge(charge_id).await.is_empty());

    app.engine
        .pay_charge(charge_id, date(2024, 6, 14), PaymentMethod::Pix)
        .await
        .unwrap();
    let _ = app
        .engine
        .pay_charge(charge_id, date(2024, 6, 14), PaymentMethod::Pix)
        .await;

    let confirmed: Vec<_> = app
        .store
        .entries_for_charge(charge_id)
        .await
        .into_iter()
        .filter(|e| e.status == EntryStatus::Confirmed)
        .collect();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].amount, cents(5_000));
}

#[tokio::test]
async fn several_forecasts_confirm_the_earliest() {
    let app = spawn_engine(date(2024, 6, 3));
    let charge = orphan_charge(4_200, date(2024, 6, 20));
    let charge_id = charge.charge_id;
    let earliest = forecast_for(&charge, "Consulting - June");
    let later = forecast_for(&charge, "Consulting - June (duplicate)");
    let (earliest_id, later_id) = (earliest.entry_id, later.entry_id);
    app.store.seed_charge(charge).await;
    app.store.seed_entry(earliest).await;
    app.store.seed_entry(later).await;

    app.engine
        .pay_charge(charge_id, date(2024, 6, 19), PaymentMethod::BankTransfer)
        .await
        .unwrap();

    let entries = app.store.entries_for_charge(charge_id).await;
    assert_eq!(entries.len(), 2);
    let first = entries.iter().find(|e| e.entry_id == earliest_id).unwrap();
    let second = entries.iter().find(|e| e.entry_id == later_id).unwrap();
    assert_eq!(first.status, EntryStatus::Confirmed);
    assert_eq!(second.status, EntryStatus::Forecast);
}

#[tokio::test]
async fn failed_entry_update_leaves_charge_pending() {
    let app = spawn_engine(date(2024, 6, 3));
    let plan = app
        .engine
        .generate_plan(sale(9_000, installments(3)))
        .await
        .unwrap();
    let charge_id = plan[2].charge.charge_id;

    app.store.fail_next(StoreOp::UpdateEntry);
    let result = app
        .engine
        .pay_charge(charge_id, date(2024, 8, 1), PaymentMethod::Pix)
        .await;
    assert!(matches!(result, Err(EngineError::StorageFailure(_))));

    let stored = app.store.charge(charge_id).await.unwrap();
    assert_eq!(stored.status, ChargeStatus::Pending);
    let entries = app.store.entries_for_charge(charge_id).await;
    assert_eq!(entries[0].status, EntryStatus::Forecast);
}

#[tokio::test]
async fn concurrent_payments_confirm_once() {
    let app = spawn_engine(date(2024, 6, 3));
    let plan = app
        .engine
        .generate_plan(sale(9_000, installments(3)))
        .await
        .unwrap();
    let charge_id = plan[1].charge.charge_id;

    let first = app.engine.clone();
    let second = app.engine.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            first
                .pay_charge(charge_id, date(2024, 7, 3), PaymentMethod::Pix)
                .await
        }),
        tokio::spawn(async move {
            second
                .pay_charge(charge_id, date(2024, 7, 3), PaymentMethod::Cash)
                .await
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::AlreadyPaid { .. }))));

    let confirmed = app
        .store
        .entries_for_charge(charge_id)
        .await
        .into_iter()
        .filter(|e| e.status == EntryStatus::Confirmed)
        .count();
    assert_eq!(confirmed, 1);
}

#[tokio::test]
async fn paying_a_payable_records_one_outflow() {
    let app = spawn_engine(date(2024, 6, 3));
    let payables = app
        .engine
        .expand_recurring_payable(common::payable_spec(180_000, date(2024, 6, 5), None))
        .await
        .unwrap();
    let payable_id = payables[0].payable_id;

    let paid = app
        .engine
        .pay_payable(payable_id, date(2024, 6, 5))
        .await
        .unwrap();
    assert_eq!(paid.payment_date(), Some(date(2024, 6, 5)));

    let outflows: Vec<_> = app
        .store
        .entries()
        .await
        .into_iter()
        .filter(|e| e.payable_id == Some(payable_id))
        .collect();
    assert_eq!(outflows.len(), 1);
    assert_eq!(outflows[0].direction, Direction::Outflow);
    assert_eq!(outflows[0].status, EntryStatus::Confirmed);
    assert_eq!(outflows[0].amount, cents(180_000));
    assert_eq!(outflows[0].category.as_deref(), Some("rent"));

    let again = app.engine.pay_payable(payable_id, date(2024, 6, 6)).await;
    assert!(matches!(
        again,
        Err(EngineError::AlreadyPaid { entity: Entity::Payable, .. })
    ));
    assert_eq!(app.store.entries().await.len(), 1);
}

#[tokio::test]
async fn failed_outflow_leaves_payable_unpaid() {
    let app = spawn_engine(date(2024, 6, 3));
    let payables = app
        .engine
        .expand_recurring_payable(common::payable_spec(2_500, date(2024, 6, 5), None))
        .await
        .unwrap();
    let payable_id = payables[0].payable_id;

    app.store.fail_next(StoreOp::CreateEntry);
    let result = app.engine.pay_payable(payable_id, date(2024, 6, 5)).await;
    assert!(matches!(result, Err(EngineError::StorageFailure(_))));

    let stored = app.store.payable(payable_id).await.unwrap();
    assert!(!stored.is_paid());
    assert!(app.store.entries().await.is_empty());
}
