//! Utilization classification
//!
//! Threshold predicates over telemetry series, and the per-kind policies
//! that compose them into resource-level verdicts.

mod policy;
mod utilization;

pub use policy::{
    DimensionAssessment, MetricVerdict, UtilizationClassifier, UtilizationDimension, Verdict,
};
pub use utilization::{
    exceeds, is_over_utilized, is_under_utilized, representative_value, Direction,
    EMPTY_OVER_VALUE, EMPTY_UNDER_VALUE,
};
