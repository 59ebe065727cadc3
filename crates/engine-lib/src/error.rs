//! Error types for the classification engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the classification engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A resource or reservation descriptor failed validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A statistic name that the named dimension does not collect
    #[error("Unrecognized statistic '{name}' for {dimension}")]
    UnrecognizedStatistic { name: String, dimension: String },
}

impl EngineError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unrecognized_statistic(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self::UnrecognizedStatistic {
            name: name.into(),
            dimension: dimension.into(),
        }
    }

    /// Returns true for errors caused by caller configuration rather than data
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_) | EngineError::UnrecognizedStatistic { .. }
        )
    }
}

/// Errors returned by a telemetry source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("Telemetry request failed: {0}")]
    Request(String),

    #[error("Telemetry request throttled: {0}")]
    Throttled(String),
}

impl TelemetryError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }
}
