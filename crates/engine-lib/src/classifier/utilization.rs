//! Threshold predicates over telemetry series

use crate::telemetry::TelemetrySeries;
use serde::{Deserialize, Serialize};

/// Representative value reported for an empty series in under-utilization context
pub const EMPTY_UNDER_VALUE: f64 = 0.0;

/// Representative value reported for an empty series in over-utilization context
pub const EMPTY_OVER_VALUE: f64 = 100.0;

/// Direction of a utilization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Under,
    Over,
}

/// True iff the series has samples and every one is at or below `threshold`
///
/// An empty series is never under-utilized: a monitoring gap must not flag
/// a resource.
pub fn is_under_utilized(series: &TelemetrySeries, threshold: f64) -> bool {
    !series.is_empty() && series.values().all(|v| v <= threshold)
}

/// True iff the series has samples and every one is at or above `threshold`
pub fn is_over_utilized(series: &TelemetrySeries, threshold: f64) -> bool {
    !series.is_empty() && series.values().all(|v| v >= threshold)
}

/// Check a series in the given direction
pub fn exceeds(series: &TelemetrySeries, threshold: f64, direction: Direction) -> bool {
    match direction {
        Direction::Under => is_under_utilized(series, threshold),
        Direction::Over => is_over_utilized(series, threshold),
    }
}

/// Single number reported alongside a verdict
///
/// Under-utilization reports the largest sample and over-utilization the
/// smallest, i.e. the value least favourable to the verdict.
pub fn representative_value(series: &TelemetrySeries, direction: Direction) -> f64 {
    match direction {
        Direction::Under => series.max().unwrap_or(EMPTY_UNDER_VALUE),
        Direction::Over => series.min().unwrap_or(EMPTY_OVER_VALUE),
    }
}
