//! Application startup: database pool, migrations and the engine wiring.

use crate::config::CashflowConfig;
use crate::services::{init_metrics, CashflowEngine, Clock, Database, SystemClock};
use service_core::error::AppError;
use std::sync::Arc;

/// Application container holding the pool and the engine built on top of it.
pub struct Application {
    config: CashflowConfig,
    db: Arc<Database>,
    engine: CashflowEngine,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CashflowConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true, Arc::new(SystemClock)).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: CashflowConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false, Arc::new(SystemClock)).await
    }

    /// Build the application with a caller-provided clock.
    pub async fn build_with_clock(
        config: CashflowConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, true, clock).await
    }

    async fn build_internal(
        config: CashflowConfig,
        run_migrations: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.health_check().await.map_err(|e| {
            tracing::error!(error = %e, "PostgreSQL health check failed");
            e
        })?;

        // Run migrations only if requested
        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let engine = CashflowEngine::new(db.clone(), clock);

        tracing::info!(
            environment = %config.common.environment,
            currency = %config.common.currency,
            "Cashflow engine ready"
        );

        Ok(Self { config, db, engine })
    }

    pub fn config(&self) -> &CashflowConfig {
        &self.config
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &CashflowEngine {
        &self.engine
    }
}
