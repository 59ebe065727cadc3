//! Query batching and result demultiplexing
//!
//! Packs per-resource metric queries into calls of at most `batch_size`
//! queries, follows the pagination cursor of each call, and routes every
//! result back to the resource slot named by its `QueryId`.

use super::{MetricDataRequest, MetricDataResult, MetricQuery, TelemetrySource, TimeWindow};
use crate::models::ResourceRecord;
use crate::observability::EngineMetrics;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default batch size: 120 compute instances at four queries each
pub const DEFAULT_BATCH_SIZE: usize = 480;

/// Counters for one batcher's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Buffers flushed
    pub batches: u64,
    /// Calls made to the telemetry source, pagination included
    pub requests: u64,
    /// Calls that returned an error
    pub failed_requests: u64,
    /// Queries sent, counted once per batch
    pub queries_dispatched: u64,
    /// Results delivered to a resource slot
    pub results_routed: u64,
    /// Results whose resource index was out of range
    pub results_dropped: u64,
}

impl BatchStats {
    /// Merge counters from another batcher
    pub fn absorb(&mut self, other: &BatchStats) {
        self.batches += other.batches;
        self.requests += other.requests;
        self.failed_requests += other.failed_requests;
        self.queries_dispatched += other.queries_dispatched;
        self.results_routed += other.results_routed;
        self.results_dropped += other.results_dropped;
    }
}

/// Why pagination of a batch stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageEnd {
    NoCursor,
    RepeatedCursor,
    EmptyPage,
    Failed,
}

/// Accumulates queries and flushes them to a telemetry source in batches
pub struct TelemetryBatcher<'a, S: TelemetrySource + ?Sized> {
    source: &'a S,
    batch_size: usize,
    window: TimeWindow,
    buffer: Vec<MetricQuery>,
    stats: BatchStats,
    metrics: EngineMetrics,
}

impl<'a, S: TelemetrySource + ?Sized> TelemetryBatcher<'a, S> {
    /// Create a batcher
    ///
    /// `batch_size` is clamped to `1..=source.max_queries_per_call()`.
    pub fn new(source: &'a S, batch_size: usize, window: TimeWindow) -> Self {
        let ceiling = source.max_queries_per_call().max(1);
        let clamped = batch_size.clamp(1, ceiling);
        if clamped != batch_size {
            warn!(
                requested = batch_size,
                effective = clamped,
                "Batch size adjusted to the telemetry source limit"
            );
        }

        Self {
            source,
            batch_size: clamped,
            window,
            buffer: Vec::with_capacity(clamped),
            stats: BatchStats::default(),
            metrics: EngineMetrics::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of buffered queries not yet sent
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Buffer a query, flushing when the buffer reaches the batch size
    ///
    /// `resources` must be the collection the query's resource index points
    /// into.
    pub async fn push(&mut self, query: MetricQuery, resources: &mut [ResourceRecord]) {
        self.buffer.push(query);
        if self.buffer.len() >= self.batch_size {
            self.flush(resources).await;
        }
    }

    /// Buffer several queries in order
    pub async fn push_all(
        &mut self,
        queries: impl IntoIterator<Item = MetricQuery>,
        resources: &mut [ResourceRecord],
    ) {
        for query in queries {
            self.push(query, resources).await;
        }
    }

    /// Flush the final partial batch and return the counters
    pub async fn finish(mut self, resources: &mut [ResourceRecord]) -> BatchStats {
        if !self.buffer.is_empty() {
            self.flush(resources).await;
        }
        self.stats
    }

    /// Send the buffered queries and page through the results
    async fn flush(&mut self, resources: &mut [ResourceRecord]) {
        let queries = std::mem::take(&mut self.buffer);
        let query_count = queries.len();
        let start = Instant::now();

        // Every queried slot exists afterwards, even if no data comes back
        for query in &queries {
            if let Some(resource) = resources.get_mut(query.id.resource_index) {
                resource.series_mut(query.id.kind);
            }
        }

        self.stats.batches += 1;
        self.stats.queries_dispatched += query_count as u64;
        self.metrics.add_queries_dispatched(query_count as u64);

        let mut request = MetricDataRequest {
            queries,
            window: self.window,
            next_token: None,
        };
        let mut pages = 0u64;

        let end = loop {
            self.stats.requests += 1;
            self.metrics.inc_telemetry_requests();

            let page = match self.source.get_metric_data(&request).await {
                Ok(page) => page,
                Err(e) => {
                    self.stats.failed_requests += 1;
                    self.metrics.inc_telemetry_failures();
                    warn!(
                        error = %e,
                        batch_queries = query_count,
                        pages_fetched = pages,
                        "Telemetry call failed, keeping data fetched so far"
                    );
                    break PageEnd::Failed;
                }
            };
            pages += 1;

            let mut all_empty = true;
            for result in page.results {
                if !result.is_empty() {
                    all_empty = false;
                }
                self.route(result, resources);
            }

            let next = match page.next_token {
                Some(token) if !token.is_empty() => token,
                _ => break PageEnd::NoCursor,
            };
            if request.next_token.as_deref() == Some(next.as_str()) {
                break PageEnd::RepeatedCursor;
            }
            if all_empty {
                break PageEnd::EmptyPage;
            }
            request.next_token = Some(next);
        };

        let elapsed = start.elapsed();
        self.metrics.observe_batch_latency(elapsed.as_secs_f64());

        match end {
            PageEnd::RepeatedCursor => {
                debug!(batch_queries = query_count, pages, "Stopped paging on a repeated cursor")
            }
            PageEnd::EmptyPage => {
                debug!(batch_queries = query_count, pages, "Stopped paging on an empty page")
            }
            PageEnd::NoCursor | PageEnd::Failed => {}
        }

        info!(
            batch_queries = query_count,
            pages,
            elapsed_ms = elapsed.as_millis() as u64,
            "Telemetry batch fetched"
        );
    }

    /// Deliver one result to the resource slot its id names
    fn route(&mut self, result: MetricDataResult, resources: &mut [ResourceRecord]) {
        let id = result.id;
        let Some(resource) = resources.get_mut(id.resource_index) else {
            self.stats.results_dropped += 1;
            warn!(query_id = %id, "Dropping result for unknown resource index");
            return;
        };

        if result.timestamps.len() != result.values.len() {
            warn!(
                query_id = %id,
                timestamps = result.timestamps.len(),
                values = result.values.len(),
                "Result has unpaired timestamps and values"
            );
        }

        resource.append_samples(id.kind, result.samples());
        self.stats.results_routed += 1;
    }
}
