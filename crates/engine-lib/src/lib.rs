//! Engine library for fleet utilization classification
//!
//! This crate provides the core functionality for:
//! - Capacity-bounded matching of resources to purchased reservations
//! - Batched, paginated telemetry fetching with result demultiplexing
//! - Under/over-utilization classification of telemetry series
//! - Orchestration of a classification run and its report
//! - Configuration and observability

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod reservation;
pub mod telemetry;

pub use config::EngineConfig;
pub use classifier::{UtilizationClassifier, UtilizationDimension, Verdict};
pub use engine::{
    ClassificationEngine, ClassificationReport, ClassificationResult, Inventory, InventorySnapshot,
};
pub use error::{EngineError, TelemetryError};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use reservation::{ReservationIndex, ReservationRecord, ReservationSummary};
pub use telemetry::{RecordedTelemetry, TelemetryBatcher, TelemetrySource};
