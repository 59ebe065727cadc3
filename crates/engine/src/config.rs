//! Runner configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Runner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Inventory snapshot written by resource discovery
    #[serde(default = "default_inventory_path")]
    pub inventory_path: PathBuf,

    /// Recorded telemetry snapshot
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: PathBuf,

    /// Optional engine configuration file, overridden by ENGINE_ variables
    #[serde(default)]
    pub engine_config_path: Option<PathBuf>,
}

fn default_inventory_path() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_telemetry_path() -> PathBuf {
    PathBuf::from("telemetry.json")
}

impl RunnerConfig {
    /// Load configuration from `FLEET_`-prefixed environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FLEET"))
            .build()
            .context("Failed to read runner configuration")?;

        config
            .try_deserialize()
            .context("Invalid runner configuration")
    }
}
