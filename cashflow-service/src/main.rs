//! Cashflow Service entry point.
//!
//! `cashflow-service migrate` applies migrations; `cashflow-service sweep`
//! (the default) applies migrations and marks late payables overdue once.

use cashflow_service::config::CashflowConfig;
use cashflow_service::services::{get_metrics, Clock, SystemClock};
use cashflow_service::startup::Application;

use service_core::observability::init_tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Sweep,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self, String> {
        match arg {
            None | Some("sweep") => Ok(Self::Sweep),
            Some("migrate") => Ok(Self::Migrate),
            Some(other) => Err(format!(
                "unknown command '{}', expected 'migrate' or 'sweep'",
                other
            )),
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let arg = std::env::args().nth(1);
    let command = Command::parse(arg.as_deref()).map_err(|e| {
        eprintln!("{}", e);
        std::io::Error::other(e)
    })?;

    // Load configuration
    let config = CashflowConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Initialize tracing
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = %config.service_version,
        command = ?command,
        service_name = %config.service_name,
        environment = %config.common.environment,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        "Starting cashflow-service"
    );

    // Build application (connects and migrates)
    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    if command == Command::Sweep {
        let today = SystemClock.today();
        let swept = app.engine().sweep_overdue(today).await.map_err(|e| {
            tracing::error!(error = %e, code = e.code(), "Overdue sweep failed");
            std::io::Error::other(format!("Sweep error: {}", e))
        })?;
        tracing::info!(swept = swept, today = %today, "Overdue sweep finished");
    }

    tracing::debug!(metrics = %get_metrics(), "Final metrics snapshot");

    tracing::info!("Service shutdown complete");
    Ok(())
}
