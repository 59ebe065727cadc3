//! Per-kind utilization policies
//!
//! Each resource kind is judged on a fixed set of dimensions. A dimension
//! resolves its configured statistic to a telemetry slot, then checks the
//! slot against its thresholds in each configured direction. The resource
//! is flagged when any one dimension is flagged.

use super::utilization::{exceeds, representative_value, Direction};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{ResourceKind, ResourceRecord};
use crate::telemetry::{MetricKind, Statistic, TelemetrySeries};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aspect of a resource that is judged independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationDimension {
    Cpu,
    Memory,
    Traffic,
    VolumeReads,
    VolumeWrites,
}

impl UtilizationDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationDimension::Cpu => "cpu",
            UtilizationDimension::Memory => "memory",
            UtilizationDimension::Traffic => "traffic",
            UtilizationDimension::VolumeReads => "volume_reads",
            UtilizationDimension::VolumeWrites => "volume_writes",
        }
    }

    /// Dimensions evaluated for a resource kind, in evaluation order
    pub fn for_kind(kind: ResourceKind) -> &'static [UtilizationDimension] {
        match kind {
            ResourceKind::ComputeInstance => &[UtilizationDimension::Cpu, UtilizationDimension::Memory],
            ResourceKind::LoadBalancer { .. } => &[UtilizationDimension::Traffic],
            ResourceKind::BlockVolume => {
                &[UtilizationDimension::VolumeReads, UtilizationDimension::VolumeWrites]
            }
        }
    }
}

impl fmt::Display for UtilizationDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one directional check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    UnderUtilized,
    OverUtilized,
    /// Data present but the check did not hold
    Neither,
    /// Slot empty or never fetched
    NoData,
}

/// One (metric, statistic, verdict) triple of a classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVerdict {
    pub dimension: UtilizationDimension,
    pub metric: MetricKind,
    pub statistic: Statistic,
    pub direction: Direction,
    pub threshold: f64,
    pub verdict: Verdict,
    /// Maximum sample for under checks, minimum for over checks
    pub value: f64,
}

/// Verdicts for one dimension of one resource
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionAssessment {
    pub dimension: UtilizationDimension,
    pub verdicts: Vec<MetricVerdict>,
}

impl DimensionAssessment {
    pub fn is_under_utilized(&self) -> bool {
        self.verdicts
            .iter()
            .any(|v| v.verdict == Verdict::UnderUtilized)
    }

    pub fn is_over_utilized(&self) -> bool {
        self.verdicts.iter().any(|v| v.verdict == Verdict::OverUtilized)
    }
}

#[derive(Debug, Clone)]
struct DimensionPolicy {
    statistic_name: String,
    under_threshold: Option<f64>,
    over_threshold: Option<f64>,
    /// Values are divided by this before comparison
    divisor: f64,
}

impl DimensionPolicy {
    fn percent(statistic_name: &str, under: f64, over: f64) -> Self {
        Self {
            statistic_name: statistic_name.to_string(),
            under_threshold: Some(under),
            over_threshold: Some(over),
            divisor: 1.0,
        }
    }

    fn under_only(statistic_name: &str, under: f64, divisor: f64) -> Self {
        Self {
            statistic_name: statistic_name.to_string(),
            under_threshold: Some(under),
            over_threshold: None,
            divisor,
        }
    }

    fn checks(&self) -> impl Iterator<Item = (Direction, f64)> + '_ {
        self.under_threshold
            .map(|t| (Direction::Under, t))
            .into_iter()
            .chain(self.over_threshold.map(|t| (Direction::Over, t)))
    }
}

/// Judges resources against the configured statistics and thresholds
#[derive(Debug, Clone)]
pub struct UtilizationClassifier {
    cpu: DimensionPolicy,
    memory: DimensionPolicy,
    traffic: DimensionPolicy,
    volume_reads: DimensionPolicy,
    volume_writes: DimensionPolicy,
}

impl UtilizationClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        // Volume ops are summed per period and compared per second
        let period = f64::from(config.period_secs());
        Self {
            cpu: DimensionPolicy::percent(
                &config.statistic_name,
                config.under_threshold_percent,
                config.over_threshold_percent,
            ),
            memory: DimensionPolicy::percent(
                &config.memory_statistic_name,
                config.memory_under_threshold_percent,
                config.memory_over_threshold_percent,
            ),
            traffic: DimensionPolicy::under_only(
                &config.load_balancer_statistic,
                config.load_balancer_threshold,
                1.0,
            ),
            volume_reads: DimensionPolicy::under_only("sum", config.volume_read_ops_per_second, period),
            volume_writes: DimensionPolicy::under_only(
                "sum",
                config.volume_write_ops_per_second,
                period,
            ),
        }
    }

    fn policy(&self, dimension: UtilizationDimension) -> &DimensionPolicy {
        match dimension {
            UtilizationDimension::Cpu => &self.cpu,
            UtilizationDimension::Memory => &self.memory,
            UtilizationDimension::Traffic => &self.traffic,
            UtilizationDimension::VolumeReads => &self.volume_reads,
            UtilizationDimension::VolumeWrites => &self.volume_writes,
        }
    }

    /// Telemetry slot holding the configured statistic of a dimension
    ///
    /// Fails with [`EngineError::UnrecognizedStatistic`] when the name does
    /// not parse or the dimension does not collect that statistic.
    pub fn slot_for(&self, dimension: UtilizationDimension) -> Result<MetricKind> {
        let name = &self.policy(dimension).statistic_name;
        let unrecognized = || EngineError::unrecognized_statistic(name.as_str(), dimension.as_str());
        let statistic: Statistic = name.parse().map_err(|_| unrecognized())?;

        let slot = match dimension {
            UtilizationDimension::Cpu => MetricKind::cpu(statistic),
            UtilizationDimension::Memory => MetricKind::memory(statistic),
            UtilizationDimension::Traffic => Some(MetricKind::traffic(statistic)),
            UtilizationDimension::VolumeReads => {
                (statistic == Statistic::Sum).then_some(MetricKind::VolumeReadOps)
            }
            UtilizationDimension::VolumeWrites => {
                (statistic == Statistic::Sum).then_some(MetricKind::VolumeWriteOps)
            }
        };
        slot.ok_or_else(unrecognized)
    }

    /// Evaluate one dimension of a resource
    ///
    /// Resources that are not running yield no verdicts.
    pub fn assess(
        &self,
        resource: &ResourceRecord,
        dimension: UtilizationDimension,
    ) -> Result<DimensionAssessment> {
        let slot = self.slot_for(dimension)?;
        let policy = self.policy(dimension);

        if !resource.is_running() {
            return Ok(DimensionAssessment {
                dimension,
                verdicts: Vec::new(),
            });
        }

        let empty = TelemetrySeries::new();
        let raw = resource.series(slot).unwrap_or(&empty);
        let scaled;
        let series = if policy.divisor != 1.0 {
            scaled = raw.scaled(policy.divisor);
            &scaled
        } else {
            raw
        };

        let verdicts = policy
            .checks()
            .map(|(direction, threshold)| {
                let verdict = if series.is_empty() {
                    Verdict::NoData
                } else if exceeds(series, threshold, direction) {
                    match direction {
                        Direction::Under => Verdict::UnderUtilized,
                        Direction::Over => Verdict::OverUtilized,
                    }
                } else {
                    Verdict::Neither
                };
                MetricVerdict {
                    dimension,
                    metric: slot,
                    statistic: slot.statistic(),
                    direction,
                    threshold,
                    verdict,
                    value: representative_value(series, direction),
                }
            })
            .collect();

        Ok(DimensionAssessment { dimension, verdicts })
    }
}
