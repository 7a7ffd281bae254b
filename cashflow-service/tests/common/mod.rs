//! Common test utilities for cashflow-service integration tests.
#![allow(dead_code)]

use cashflow_service::config::{CashflowConfig, DatabaseConfig};
use cashflow_service::models::{
    Cadence, Charge, ChargeOwner, LedgerEntry, Money, PayableSpec, PaymentMethod, PaymentMode,
    SaleSpec,
};
use cashflow_service::services::{CashflowEngine, FixedClock, MemoryStore};
use chrono::NaiveDate;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,cashflow_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn cents(minor: i64) -> Money {
    Money::from_minor(minor).expect("non-negative amount")
}

/// Engine over an in-memory store with the clock pinned to `today`.
pub struct TestEngine {
    pub engine: CashflowEngine,
    pub store: MemoryStore,
    pub today: NaiveDate,
}

pub fn spawn_engine(today: NaiveDate) -> TestEngine {
    init_tracing();

    let store = MemoryStore::new();
    let engine = CashflowEngine::new(Arc::new(store.clone()), Arc::new(FixedClock::new(today)));

    TestEngine {
        engine,
        store,
        today,
    }
}

pub fn sale(amount: i64, mode: PaymentMode) -> SaleSpec {
    SaleSpec {
        owner: ChargeOwner::Client(Uuid::new_v4()),
        amount: cents(amount),
        description: "Monthly bookkeeping".to_string(),
        mode,
        method: PaymentMethod::Pix,
        metadata: None,
    }
}

pub fn installments(count: u32) -> PaymentMode {
    PaymentMode::Installments {
        count,
        schedule: None,
    }
}

pub fn payable_spec(amount: i64, first_due_date: NaiveDate, cadence: Option<Cadence>) -> PayableSpec {
    PayableSpec {
        description: "Office rent".to_string(),
        amount: cents(amount),
        category: "rent".to_string(),
        first_due_date,
        cadence,
    }
}

/// A pending charge with no ledger entry, as left behind by an import that
/// bypassed schedule generation.
pub fn orphan_charge(total: i64, due_date: NaiveDate) -> Charge {
    Charge::new(
        ChargeOwner::OccasionalClient(Uuid::new_v4()),
        cents(total),
        Money::ZERO,
        due_date,
    )
    .expect("valid charge")
}

pub fn forecast_for(charge: &Charge, description: &str) -> LedgerEntry {
    LedgerEntry::forecast_inflow(charge.charge_id, charge.total, description, charge.due_date)
}

/// Configuration for the Postgres-backed suites.
pub fn test_config() -> CashflowConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database tests");

    CashflowConfig {
        common: CommonConfig::default(),
        service_name: "cashflow-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 4,
            min_connections: 1,
        },
    }
}
