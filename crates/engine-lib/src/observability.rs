//! Observability infrastructure for the classification engine
//!
//! Provides:
//! - Prometheus metrics (telemetry calls, batch latency, classification counts)
//! - Structured logging of engine events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for telemetry batch latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    telemetry_requests: IntCounter,
    telemetry_failures: IntCounter,
    queries_dispatched: IntCounter,
    batch_latency_seconds: Histogram,
    resources_classified: IntCounterVec,
    configuration_errors: IntCounter,
    reservations_consumed: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            telemetry_requests: register_int_counter!(
                "fleet_engine_telemetry_requests_total",
                "Calls made to the telemetry API, pagination included"
            )
            .expect("Failed to register telemetry_requests"),

            telemetry_failures: register_int_counter!(
                "fleet_engine_telemetry_failures_total",
                "Telemetry API calls that returned an error"
            )
            .expect("Failed to register telemetry_failures"),

            queries_dispatched: register_int_counter!(
                "fleet_engine_queries_dispatched_total",
                "Metric queries sent to the telemetry API"
            )
            .expect("Failed to register queries_dispatched"),

            batch_latency_seconds: register_histogram!(
                "fleet_engine_batch_latency_seconds",
                "Time spent fetching one telemetry batch across all its pages",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_latency_seconds"),

            resources_classified: register_int_counter_vec!(
                "fleet_engine_resources_classified_total",
                "Resources classified, by ownership category",
                &["category"]
            )
            .expect("Failed to register resources_classified"),

            configuration_errors: register_int_counter!(
                "fleet_engine_configuration_errors_total",
                "Classification calls rejected for an unrecognized statistic"
            )
            .expect("Failed to register configuration_errors"),

            reservations_consumed: register_int_counter!(
                "fleet_engine_reservations_consumed_total",
                "Reservation capacity units matched to running resources"
            )
            .expect("Failed to register reservations_consumed"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a handle, registering the global metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn inc_telemetry_requests(&self) {
        self.inner().telemetry_requests.inc();
    }

    pub fn inc_telemetry_failures(&self) {
        self.inner().telemetry_failures.inc();
    }

    pub fn add_queries_dispatched(&self, count: u64) {
        self.inner().queries_dispatched.inc_by(count);
    }

    pub fn observe_batch_latency(&self, duration_secs: f64) {
        self.inner().batch_latency_seconds.observe(duration_secs);
    }

    pub fn inc_resources_classified(&self, category: &str) {
        self.inner()
            .resources_classified
            .with_label_values(&[category])
            .inc();
    }

    pub fn inc_configuration_errors(&self) {
        self.inner().configuration_errors.inc();
    }

    pub fn inc_reservations_consumed(&self) {
        self.inner().reservations_consumed.inc();
    }
}

/// Structured logger for engine events
///
/// Emits one event per significant step of a classification run, tagged
/// with the scope (region) being classified.
#[derive(Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl StructuredLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn log_run_started(&self, resources: usize, reservations: usize) {
        info!(
            event = "classification_started",
            scope = %self.scope,
            resources = resources,
            reservations = reservations,
            "Classification run started"
        );
    }

    pub fn log_resource_classified(
        &self,
        resource_id: &str,
        kind: &str,
        category: Option<&str>,
        under_utilized: bool,
        over_utilized: bool,
    ) {
        debug!(
            event = "resource_classified",
            scope = %self.scope,
            resource_id = %resource_id,
            kind = %kind,
            category = category.unwrap_or("not_running"),
            under_utilized = under_utilized,
            over_utilized = over_utilized,
            "Resource classified"
        );
    }

    /// Log a classification call rejected for bad configuration
    pub fn log_configuration_error(&self, resource_id: &str, dimension: &str, error: &str) {
        warn!(
            event = "classification_skipped",
            scope = %self.scope,
            resource_id = %resource_id,
            dimension = %dimension,
            error = %error,
            "Skipping utilization check for resource"
        );
    }

    pub fn log_reservation_summary(
        &self,
        reservation_id: &str,
        consumed: u32,
        purchased: u32,
        active: bool,
        expiring_soon: bool,
    ) {
        if active && expiring_soon {
            warn!(
                event = "reservation_expiring",
                scope = %self.scope,
                reservation_id = %reservation_id,
                consumed = consumed,
                purchased = purchased,
                "Reservation expires soon"
            );
        } else {
            debug!(
                event = "reservation_summary",
                scope = %self.scope,
                reservation_id = %reservation_id,
                consumed = consumed,
                purchased = purchased,
                active = active,
                "Reservation capacity summary"
            );
        }
    }

    pub fn log_run_finished(
        &self,
        resources: usize,
        under_utilized: usize,
        over_utilized: usize,
        failed_requests: u64,
    ) {
        if failed_requests > 0 {
            warn!(
                event = "classification_finished",
                scope = %self.scope,
                resources = resources,
                under_utilized = under_utilized,
                over_utilized = over_utilized,
                failed_requests = failed_requests,
                "Classification finished with telemetry gaps"
            );
        } else {
            info!(
                event = "classification_finished",
                scope = %self.scope,
                resources = resources,
                under_utilized = under_utilized,
                over_utilized = over_utilized,
                "Classification finished"
            );
        }
    }
}
