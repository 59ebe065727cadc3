//! Recorded telemetry source
//!
//! Serves previously captured series through the `TelemetrySource` trait,
//! paginating each call the way the live API does. Recorded samples are
//! served as captured; the request window is not applied.

use super::{
    async_trait, MetricDataPage, MetricDataRequest, MetricDataResult, MetricQuery, Sample,
    Statistic, TelemetrySource, API_MAX_QUERIES_PER_CALL,
};
use crate::error::TelemetryError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Default number of samples returned per query per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One captured series as stored in a snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSeries {
    pub namespace: String,
    pub metric_name: String,
    pub dimension_value: String,
    pub statistic: Statistic,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    namespace: String,
    metric_name: String,
    dimension_value: String,
    statistic: Statistic,
}

impl SeriesKey {
    fn for_query(query: &MetricQuery) -> Self {
        Self {
            namespace: query.namespace.clone(),
            metric_name: query.metric_name.clone(),
            dimension_value: query.dimension.value.clone(),
            statistic: query.statistic,
        }
    }
}

/// Telemetry source backed by captured series
#[derive(Debug, Clone)]
pub struct RecordedTelemetry {
    series: HashMap<SeriesKey, Vec<Sample>>,
    page_size: usize,
    max_queries: usize,
}

impl Default for RecordedTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedTelemetry {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_queries: API_MAX_QUERIES_PER_CALL,
        }
    }

    /// Set the number of samples per query per page (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the per-call query ceiling (minimum 1)
    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries.max(1);
        self
    }

    /// Build from captured series
    pub fn from_recorded(recorded: Vec<RecordedSeries>) -> Self {
        let mut source = Self::new();
        for series in recorded {
            source.insert(series);
        }
        source
    }

    /// Load a JSON snapshot holding an array of `RecordedSeries`
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read telemetry snapshot {:?}", path))?;
        let recorded: Vec<RecordedSeries> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse telemetry snapshot {:?}", path))?;

        debug!(path = %path.display(), series = recorded.len(), "Loaded telemetry snapshot");
        Ok(Self::from_recorded(recorded))
    }

    /// Add a captured series, appending to any series under the same key
    pub fn insert(&mut self, series: RecordedSeries) {
        let key = SeriesKey {
            namespace: series.namespace,
            metric_name: series.metric_name,
            dimension_value: series.dimension_value,
            statistic: series.statistic,
        };
        self.series.entry(key).or_default().extend(series.samples);
    }

    /// Number of captured series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn samples_for(&self, query: &MetricQuery) -> &[Sample] {
        self.series
            .get(&SeriesKey::for_query(query))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[async_trait]
impl TelemetrySource for RecordedTelemetry {
    async fn get_metric_data(
        &self,
        request: &MetricDataRequest,
    ) -> Result<MetricDataPage, TelemetryError> {
        if request.queries.len() > self.max_queries {
            return Err(TelemetryError::request(format!(
                "{} queries exceed the limit of {}",
                request.queries.len(),
                self.max_queries
            )));
        }

        let offset = match request.next_token.as_deref() {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                TelemetryError::request(format!("invalid pagination cursor '{}'", token))
            })?,
        };
        // Cursors come from the caller; a huge one is just past the end
        let end = offset.saturating_add(self.page_size);

        let mut more = false;
        let results = request
            .queries
            .iter()
            .map(|query| {
                let samples = self.samples_for(query);
                if samples.len() > end {
                    more = true;
                }
                let page = samples.get(offset..samples.len().min(end)).unwrap_or(&[]);
                MetricDataResult {
                    id: query.id,
                    timestamps: page.iter().map(|s| s.timestamp).collect(),
                    values: page.iter().map(|s| s.value).collect(),
                }
            })
            .collect();

        Ok(MetricDataPage {
            results,
            next_token: more.then(|| end.to_string()),
        })
    }

    fn max_queries_per_call(&self) -> usize {
        self.max_queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Dimension, MetricKind, QueryId, TimeWindow};
    use chrono::Utc;

    fn query(value: &str, kind: MetricKind) -> MetricQuery {
        MetricQuery {
            id: QueryId::new(kind, 0),
            namespace: "AWS/EC2".to_string(),
            metric_name: "CPUUtilization".to_string(),
            dimension: Dimension {
                name: "InstanceId".to_string(),
                value: value.to_string(),
            },
            period_secs: 3600,
            statistic: kind.statistic(),
        }
    }

    fn recorded(value: &str, statistic: Statistic, count: usize) -> RecordedSeries {
        let start = Utc::now();
        RecordedSeries {
            namespace: "AWS/EC2".to_string(),
            metric_name: "CPUUtilization".to_string(),
            dimension_value: value.to_string(),
            statistic,
            samples: (0..count)
                .map(|i| Sample::new(start + chrono::Duration::hours(i as i64), i as f64))
                .collect(),
        }
    }

    fn request(queries: Vec<MetricQuery>, next_token: Option<String>) -> MetricDataRequest {
        MetricDataRequest {
            queries,
            window: TimeWindow::lookback(Utc::now(), 7),
            next_token,
        }
    }

    #[tokio::test]
    async fn test_paginates_recorded_series() {
        let source = RecordedTelemetry::from_recorded(vec![recorded("i-1", Statistic::Maximum, 5)])
            .with_page_size(2);

        let q = vec![query("i-1", MetricKind::CpuMaximum)];
        let page = source.get_metric_data(&request(q.clone(), None)).await.unwrap();
        assert_eq!(page.results[0].values, vec![0.0, 1.0]);
        assert_eq!(page.next_token.as_deref(), Some("2"));

        let page = source
            .get_metric_data(&request(q.clone(), Some("4".to_string())))
            .await
            .unwrap();
        assert_eq!(page.results[0].values, vec![4.0]);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_unknown_metric_is_empty() {
        let source = RecordedTelemetry::from_recorded(vec![recorded("i-1", Statistic::Maximum, 3)]);

        // Same instance, different statistic
        let page = source
            .get_metric_data(&request(vec![query("i-1", MetricKind::CpuAverage)], None))
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.results[0].is_empty());
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_bad_cursor() {
        let source = RecordedTelemetry::new().with_max_queries(1);
        let queries = vec![
            query("i-1", MetricKind::CpuMaximum),
            query("i-2", MetricKind::CpuMaximum),
        ];
        assert!(source.get_metric_data(&request(queries, None)).await.is_err());

        let err = source
            .get_metric_data(&request(
                vec![query("i-1", MetricKind::CpuMaximum)],
                Some("not-a-number".to_string()),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Request(_)));
    }

    #[tokio::test]
    async fn test_cursor_beyond_end_yields_empty_page() {
        let source = RecordedTelemetry::from_recorded(vec![recorded("i-1", Statistic::Maximum, 3)]);

        let page = source
            .get_metric_data(&request(
                vec![query("i-1", MetricKind::CpuMaximum)],
                Some(usize::MAX.to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.results[0].is_empty());
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.json");
        let snapshot = vec![
            recorded("i-1", Statistic::Maximum, 2),
            recorded("i-2", Statistic::Average, 1),
        ];
        tokio::fs::write(&path, serde_json::to_vec(&snapshot).unwrap())
            .await
            .unwrap();

        let source = RecordedTelemetry::load(&path).await.unwrap();
        assert_eq!(source.len(), 2);

        let missing = RecordedTelemetry::load(&dir.path().join("missing.json")).await;
        assert!(missing.is_err());
    }
}
