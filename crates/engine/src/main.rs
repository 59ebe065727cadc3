//! Fleet Engine - utilization and reservation classification runner
//!
//! Reads an inventory snapshot and recorded telemetry, classifies every
//! scope, and writes the reports to stdout as JSON.

use anyhow::{Context, Result};
use engine_lib::{ClassificationEngine, EngineConfig, InventorySnapshot, RecordedTelemetry};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting fleet-engine");

    let runner = config::RunnerConfig::load()?;
    let engine_config = EngineConfig::load_with_file(runner.engine_config_path.as_deref())
        .context("Failed to load engine configuration")?;
    info!(
        days_of_data = engine_config.days_of_data,
        granularity_hours = engine_config.granularity_hours,
        batch_size = engine_config.batch_size,
        statistic = %engine_config.statistic_name,
        "Engine configured"
    );

    let telemetry = RecordedTelemetry::load(&runner.telemetry_path).await?;
    let inventories = InventorySnapshot::load(&runner.inventory_path)
        .await?
        .into_inventories();
    info!(
        scopes = inventories.len(),
        series = telemetry.len(),
        "Inputs loaded"
    );

    let engine = ClassificationEngine::new(Arc::new(telemetry), engine_config)?;
    let reports = engine.run_all(inventories).await;

    let json = serde_json::to_string_pretty(&reports).context("Failed to encode reports")?;
    println!("{}", json);

    info!(scopes = reports.len(), "Classification complete");
    Ok(())
}
