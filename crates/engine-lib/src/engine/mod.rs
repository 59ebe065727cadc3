//! Classification run orchestration
//!
//! A run over one scope builds the reservation index, assigns every
//! resource its ownership category, fetches telemetry for the running
//! resources through the batcher, and judges each one against the
//! utilization policies of its kind.

mod inventory;
mod report;

pub use inventory::{Inventory, InventorySnapshot, ScopeSnapshot};
pub use report::{ClassificationReport, ClassificationResult};

use crate::classifier::{UtilizationClassifier, UtilizationDimension};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{Category, ResourceRecord};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::reservation::ReservationIndex;
use crate::telemetry::{queries_for, BatchStats, TelemetryBatcher, TelemetrySource, TimeWindow};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Runs classification passes against a telemetry source
pub struct ClassificationEngine {
    source: Arc<dyn TelemetrySource>,
    config: EngineConfig,
    classifier: UtilizationClassifier,
    metrics: EngineMetrics,
}

impl ClassificationEngine {
    /// Create an engine, rejecting configurations it cannot run with
    pub fn new(source: Arc<dyn TelemetrySource>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = UtilizationClassifier::new(&config);

        Ok(Self {
            source,
            config,
            classifier,
            metrics: EngineMetrics::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify one scope as of now
    pub async fn run(&self, inventory: Inventory) -> ClassificationReport {
        self.run_at(inventory, Utc::now()).await
    }

    /// Classify one scope as of `now`
    ///
    /// `now` decides reservation activity and expiry and ends the telemetry
    /// window. The index is built fresh for every call, so repeated runs
    /// never double-count reservation capacity.
    pub async fn run_at(&self, inventory: Inventory, now: DateTime<Utc>) -> ClassificationReport {
        let Inventory {
            scope,
            mut resources,
            reservations,
        } = inventory;
        let logger = StructuredLogger::new(&scope);
        logger.log_run_started(resources.len(), reservations.len());

        let mut index = ReservationIndex::build(reservations);
        let categories: Vec<Option<Category>> = resources
            .iter()
            .map(|resource| self.categorize(&mut index, resource, now))
            .collect();

        let batch_stats = self.fetch_telemetry(&mut resources, now).await;

        let results: Vec<ClassificationResult> = resources
            .iter()
            .zip(categories)
            .map(|(resource, category)| self.evaluate(&logger, resource, category))
            .collect();

        let reservations = index.summaries(
            now,
            self.config.reservation_expiry_days,
            self.config.reservation_capacity_threshold_percent,
        );
        for summary in &reservations {
            logger.log_reservation_summary(
                &summary.reservation_id,
                summary.consumed,
                summary.purchased,
                summary.active,
                summary.expiring_soon,
            );
        }

        logger.log_run_finished(
            results.len(),
            results.iter().filter(|r| r.under_utilized).count(),
            results.iter().filter(|r| r.over_utilized).count(),
            batch_stats.failed_requests,
        );

        ClassificationReport {
            scope,
            generated_at: now,
            results,
            reservations,
            batch_stats,
        }
    }

    /// Classify several scopes in sequence, one reservation index each
    pub async fn run_all(&self, inventories: Vec<Inventory>) -> Vec<ClassificationReport> {
        let now = Utc::now();
        let mut reports = Vec::with_capacity(inventories.len());
        for inventory in inventories {
            reports.push(self.run_at(inventory, now).await);
        }
        reports
    }

    /// Ownership category; only compute capacity is sold as reservations
    fn categorize(
        &self,
        index: &mut ReservationIndex,
        resource: &ResourceRecord,
        now: DateTime<Utc>,
    ) -> Option<Category> {
        if resource.kind().is_reservable() {
            index.classify(resource, now)
        } else if resource.is_running() {
            Some(Category::OnDemand)
        } else {
            None
        }
    }

    /// Fetch telemetry for every running resource
    ///
    /// Queries are planned against the final resource collection before
    /// any is sent, so every resource index stays valid for routing.
    async fn fetch_telemetry(&self, resources: &mut [ResourceRecord], now: DateTime<Utc>) -> BatchStats {
        let period_secs = self.config.period_secs();
        let queries: Vec<_> = resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_running())
            .flat_map(|(i, r)| queries_for(r, i, period_secs))
            .collect();

        if queries.is_empty() {
            return BatchStats::default();
        }

        let window = TimeWindow::lookback(now, self.config.days_of_data);
        let mut batcher = TelemetryBatcher::new(self.source.as_ref(), self.config.batch_size, window);
        batcher.push_all(queries, resources).await;
        batcher.finish(resources).await
    }

    /// Judge one resource on every dimension of its kind
    ///
    /// A dimension that fails on configuration is recorded and skipped; the
    /// remaining dimensions still decide the flags.
    fn evaluate(
        &self,
        logger: &StructuredLogger,
        resource: &ResourceRecord,
        category: Option<Category>,
    ) -> ClassificationResult {
        let mut result = ClassificationResult {
            resource_id: resource.id().to_string(),
            kind: resource.kind(),
            region: resource.region().to_string(),
            state: resource.state(),
            category,
            verdicts: Vec::new(),
            under_utilized: false,
            over_utilized: false,
            errors: Vec::new(),
        };

        if resource.is_running() {
            for &dimension in UtilizationDimension::for_kind(resource.kind()) {
                match self.classifier.assess(resource, dimension) {
                    Ok(assessment) => {
                        result.under_utilized |= assessment.is_under_utilized();
                        result.over_utilized |= assessment.is_over_utilized();
                        result.verdicts.extend(assessment.verdicts);
                    }
                    Err(e) => {
                        if e.is_configuration_error() {
                            self.metrics.inc_configuration_errors();
                        }
                        logger.log_configuration_error(resource.id(), dimension.as_str(), &e.to_string());
                        result.errors.push(e.to_string());
                    }
                }
            }
        }

        if let Some(category) = category {
            self.metrics.inc_resources_classified(category.as_str());
        }
        logger.log_resource_classified(
            resource.id(),
            resource.kind().as_str(),
            category.map(|c| c.as_str()),
            result.under_utilized,
            result.over_utilized,
        );

        result
    }
}
