//! Telemetry fetching from an external metrics API
//!
//! This module provides the query model, a batcher that packs per-resource
//! queries into bounded calls and routes paginated results back to their
//! resources, and a recorded source that replays captured telemetry.

mod batcher;
mod query;
mod replay;
mod series;

#[cfg(test)]
mod tests;

pub use batcher::{BatchStats, TelemetryBatcher, DEFAULT_BATCH_SIZE};
pub use query::{queries_for, Dimension, MetricKind, MetricQuery, QueryId, Statistic};
pub use replay::{RecordedSeries, RecordedTelemetry, DEFAULT_PAGE_SIZE};
pub use series::{Sample, TelemetrySeries};

use crate::error::TelemetryError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

/// Largest number of queries the telemetry API accepts per call
pub const API_MAX_QUERIES_PER_CALL: usize = 500;

/// Time range covered by every query of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window of `days` days ending at `end`
    pub fn lookback(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

/// One call to the telemetry API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataRequest {
    pub queries: Vec<MetricQuery>,
    pub window: TimeWindow,
    /// Pagination cursor from the previous page
    pub next_token: Option<String>,
}

/// Data returned for one query of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataResult {
    pub id: QueryId,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl MetricDataResult {
    pub fn empty(id: QueryId) -> Self {
        Self {
            id,
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Pair timestamps with values, dropping unpaired entries
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.iter())
            .map(|(ts, v)| Sample::new(*ts, *v))
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPage {
    pub results: Vec<MetricDataResult>,
    pub next_token: Option<String>,
}

/// Trait for telemetry API implementations
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch one page of data for a batch of queries
    ///
    /// Queries naming a metric the API does not know must come back as an
    /// empty result rather than an error.
    async fn get_metric_data(
        &self,
        request: &MetricDataRequest,
    ) -> Result<MetricDataPage, TelemetryError>;

    /// Per-call query ceiling of this source
    fn max_queries_per_call(&self) -> usize {
        API_MAX_QUERIES_PER_CALL
    }
}
