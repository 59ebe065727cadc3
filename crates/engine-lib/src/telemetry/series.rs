//! Time-stamped telemetry samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One (timestamp, value) point returned by the telemetry source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples for one (resource, metric, statistic) slot
///
/// Append-only while a fetch is in progress. Order is not guaranteed and
/// nothing downstream relies on it: every reduction is order-independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetrySeries {
    samples: Vec<Sample>,
}

impl TelemetrySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from values with synthetic timestamps one period apart
    pub fn from_values(start: DateTime<Utc>, period_secs: i64, values: &[f64]) -> Self {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(start + chrono::Duration::seconds(period_secs * i as i64), *v))
            .collect()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Largest sample value
    pub fn max(&self) -> Option<f64> {
        self.values()
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Smallest sample value
    pub fn min(&self) -> Option<f64> {
        self.values()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Copy of the series with every value divided by `divisor`
    pub fn scaled(&self, divisor: f64) -> Self {
        self.samples
            .iter()
            .map(|s| Sample::new(s.timestamp, s.value / divisor))
            .collect()
    }
}

impl Extend<Sample> for TelemetrySeries {
    fn extend<I: IntoIterator<Item = Sample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

impl FromIterator<Sample> for TelemetrySeries {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
