//! Classification results

use crate::classifier::MetricVerdict;
use crate::models::{Category, ResourceKind, ResourceState};
use crate::reservation::ReservationSummary;
use crate::telemetry::BatchStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub region: String,
    pub state: ResourceState,
    /// `None` for resources that are not running
    pub category: Option<Category>,
    pub verdicts: Vec<MetricVerdict>,
    pub under_utilized: bool,
    pub over_utilized: bool,
    /// Checks skipped for bad configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Everything produced by one classification run over one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub scope: String,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ClassificationResult>,
    pub reservations: Vec<ReservationSummary>,
    pub batch_stats: BatchStats,
}

impl ClassificationReport {
    pub fn result_for(&self, resource_id: &str) -> Option<&ClassificationResult> {
        self.results.iter().find(|r| r.resource_id == resource_id)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ClassificationResult> {
        self.results
            .iter()
            .filter(move |r| r.category == Some(category))
    }

    pub fn under_utilized(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter().filter(|r| r.under_utilized)
    }

    pub fn over_utilized(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter().filter(|r| r.over_utilized)
    }

    pub fn reservation(&self, reservation_id: &str) -> Option<&ReservationSummary> {
        self.reservations
            .iter()
            .find(|r| r.reservation_id == reservation_id)
    }

    /// Results that had at least one check skipped
    pub fn with_errors(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter().filter(|r| !r.errors.is_empty())
    }
}
