//! Engine configuration

use crate::error::{EngineError, Result};
use crate::telemetry::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classification engine configuration
///
/// Statistic names are kept as strings and resolved when a resource is
/// classified, so a bad name fails that resource's check rather than the
/// whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Telemetry lookback window in days
    #[serde(default = "default_days_of_data")]
    pub days_of_data: u32,

    /// Aggregation bucket size in hours
    #[serde(default = "default_granularity_hours")]
    pub granularity_hours: u32,

    /// Maximum queries per telemetry call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// CPU under-utilization threshold (percent)
    #[serde(default = "default_under_threshold")]
    pub under_threshold_percent: f64,

    /// CPU over-utilization threshold (percent)
    #[serde(default = "default_over_threshold")]
    pub over_threshold_percent: f64,

    /// CPU statistic: average, minimum or maximum
    #[serde(default = "default_statistic")]
    pub statistic_name: String,

    #[serde(default = "default_under_threshold")]
    pub memory_under_threshold_percent: f64,

    #[serde(default = "default_over_threshold")]
    pub memory_over_threshold_percent: f64,

    /// Memory statistic; only maximum is collected
    #[serde(default = "default_statistic")]
    pub memory_statistic_name: String,

    /// Traffic statistic for load balancers: sum, average, minimum or maximum
    #[serde(default = "default_load_balancer_statistic")]
    pub load_balancer_statistic: String,

    /// Traffic count at or below which a load balancer is idle
    #[serde(default = "default_load_balancer_threshold")]
    pub load_balancer_threshold: f64,

    /// Read operations per second at or below which a volume is idle
    #[serde(default = "default_volume_ops_per_second")]
    pub volume_read_ops_per_second: f64,

    /// Write operations per second at or below which a volume is idle
    #[serde(default = "default_volume_ops_per_second")]
    pub volume_write_ops_per_second: f64,

    /// Reservations consumed at or below this percentage are reported as under capacity
    #[serde(default = "default_capacity_threshold")]
    pub reservation_capacity_threshold_percent: f64,

    /// Window for the expiring-soon flag, in days
    #[serde(default = "default_expiry_days")]
    pub reservation_expiry_days: u32,
}

fn default_days_of_data() -> u32 {
    7
}

fn default_granularity_hours() -> u32 {
    24
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_under_threshold() -> f64 {
    10.0
}

fn default_over_threshold() -> f64 {
    90.0
}

fn default_statistic() -> String {
    "maximum".to_string()
}

fn default_load_balancer_statistic() -> String {
    "sum".to_string()
}

fn default_load_balancer_threshold() -> f64 {
    15.0
}

fn default_volume_ops_per_second() -> f64 {
    // One operation per day
    1.0 / 86_400.0
}

fn default_capacity_threshold() -> f64 {
    50.0
}

fn default_expiry_days() -> u32 {
    14
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            days_of_data: default_days_of_data(),
            granularity_hours: default_granularity_hours(),
            batch_size: default_batch_size(),
            under_threshold_percent: default_under_threshold(),
            over_threshold_percent: default_over_threshold(),
            statistic_name: default_statistic(),
            memory_under_threshold_percent: default_under_threshold(),
            memory_over_threshold_percent: default_over_threshold(),
            memory_statistic_name: default_statistic(),
            load_balancer_statistic: default_load_balancer_statistic(),
            load_balancer_threshold: default_load_balancer_threshold(),
            volume_read_ops_per_second: default_volume_ops_per_second(),
            volume_write_ops_per_second: default_volume_ops_per_second(),
            reservation_capacity_threshold_percent: default_capacity_threshold(),
            reservation_expiry_days: default_expiry_days(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `ENGINE_`-prefixed environment variables
    pub fn load() -> Result<Self> {
        Self::load_with_file(None)
    }

    /// Load configuration from an optional file, overridden by the environment
    pub fn load_with_file(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("ENGINE").try_parsing(true))
            .build()
            .map_err(|e| EngineError::invalid_config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| EngineError::invalid_config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::invalid_config("batch_size must be at least 1"));
        }
        if self.days_of_data == 0 {
            return Err(EngineError::invalid_config("days_of_data must be at least 1"));
        }
        if self.granularity_hours == 0 {
            return Err(EngineError::invalid_config(
                "granularity_hours must be at least 1",
            ));
        }

        let percentages = [
            ("under_threshold_percent", self.under_threshold_percent),
            ("over_threshold_percent", self.over_threshold_percent),
            ("memory_under_threshold_percent", self.memory_under_threshold_percent),
            ("memory_over_threshold_percent", self.memory_over_threshold_percent),
            (
                "reservation_capacity_threshold_percent",
                self.reservation_capacity_threshold_percent,
            ),
        ];
        for (name, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::invalid_config(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        let rates = [
            ("load_balancer_threshold", self.load_balancer_threshold),
            ("volume_read_ops_per_second", self.volume_read_ops_per_second),
            ("volume_write_ops_per_second", self.volume_write_ops_per_second),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Aggregation period of every query, in seconds
    pub fn period_secs(&self) -> u32 {
        self.granularity_hours.saturating_mul(3600)
    }
}
