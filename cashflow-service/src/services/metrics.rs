//! Prometheus metrics for cashflow-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};

/// Counter for engine operations by name and outcome.
pub static OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cashflow_operations_total",
        "Total number of engine operations",
        &["operation", "status"]
    )
    .expect("Failed to register OPERATIONS")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cashflow_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Payments recorded without a forecast entry to confirm.
pub static RECONCILIATION_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "cashflow_reconciliation_fallbacks_total",
        "Payments that created a fallback ledger entry"
    )
    .expect("Failed to register RECONCILIATION_FALLBACKS")
});

/// Payments that found more than one forecast entry.
pub static RECONCILIATION_AMBIGUOUS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "cashflow_reconciliation_ambiguous_total",
        "Payments that matched several forecast entries"
    )
    .expect("Failed to register RECONCILIATION_AMBIGUOUS")
});

pub static OVERDUE_SWEPT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "cashflow_overdue_swept_total",
        "Payables moved to overdue"
    )
    .expect("Failed to register OVERDUE_SWEPT")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&OPERATIONS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RECONCILIATION_FALLBACKS);
    Lazy::force(&RECONCILIATION_AMBIGUOUS);
    Lazy::force(&OVERDUE_SWEPT);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an engine operation outcome.
pub fn record_operation(operation: &str, status: &str) {
    OPERATIONS.with_label_values(&[operation, status]).inc();
}

pub fn record_fallback() {
    RECONCILIATION_FALLBACKS.inc();
}

pub fn record_ambiguous() {
    RECONCILIATION_AMBIGUOUS.inc();
}

pub fn record_overdue_swept(count: u64) {
    OVERDUE_SWEPT.inc_by(count);
}
