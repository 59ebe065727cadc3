//! Metric query descriptors and per-resource query plans

use crate::error::EngineError;
use crate::models::{LoadBalancerFlavor, ResourceKind, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation applied by the telemetry source over each period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Average,
    Minimum,
    Maximum,
    Sum,
}

impl Statistic {
    /// Name understood by the telemetry API
    pub fn api_name(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Minimum => "Minimum",
            Statistic::Maximum => "Maximum",
            Statistic::Sum => "Sum",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Average => "average",
            Statistic::Minimum => "minimum",
            Statistic::Maximum => "maximum",
            Statistic::Sum => "sum",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(Statistic::Average),
            "minimum" => Ok(Statistic::Minimum),
            "maximum" => Ok(Statistic::Maximum),
            "sum" => Ok(Statistic::Sum),
            _ => Err(EngineError::unrecognized_statistic(s, "statistic")),
        }
    }
}

/// Telemetry slot on a resource that a query result is routed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuAverage,
    CpuMinimum,
    CpuMaximum,
    MemoryUsedPercent,
    TrafficSum,
    TrafficAverage,
    TrafficMinimum,
    TrafficMaximum,
    VolumeReadOps,
    VolumeWriteOps,
}

impl MetricKind {
    /// Statistic requested for this slot
    pub fn statistic(&self) -> Statistic {
        match self {
            MetricKind::CpuAverage | MetricKind::TrafficAverage => Statistic::Average,
            MetricKind::CpuMinimum | MetricKind::TrafficMinimum => Statistic::Minimum,
            MetricKind::CpuMaximum | MetricKind::MemoryUsedPercent | MetricKind::TrafficMaximum => {
                Statistic::Maximum
            }
            MetricKind::TrafficSum | MetricKind::VolumeReadOps | MetricKind::VolumeWriteOps => {
                Statistic::Sum
            }
        }
    }

    /// CPU slot holding the given statistic
    pub fn cpu(statistic: Statistic) -> Option<MetricKind> {
        match statistic {
            Statistic::Average => Some(MetricKind::CpuAverage),
            Statistic::Minimum => Some(MetricKind::CpuMinimum),
            Statistic::Maximum => Some(MetricKind::CpuMaximum),
            Statistic::Sum => None,
        }
    }

    /// Memory slot holding the given statistic (only the maximum is collected)
    pub fn memory(statistic: Statistic) -> Option<MetricKind> {
        match statistic {
            Statistic::Maximum => Some(MetricKind::MemoryUsedPercent),
            _ => None,
        }
    }

    /// Load balancer traffic slot holding the given statistic
    pub fn traffic(statistic: Statistic) -> MetricKind {
        match statistic {
            Statistic::Average => MetricKind::TrafficAverage,
            Statistic::Minimum => MetricKind::TrafficMinimum,
            Statistic::Maximum => MetricKind::TrafficMaximum,
            Statistic::Sum => MetricKind::TrafficSum,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::CpuAverage => "cpu-average",
            MetricKind::CpuMinimum => "cpu-minimum",
            MetricKind::CpuMaximum => "cpu-maximum",
            MetricKind::MemoryUsedPercent => "memory-used",
            MetricKind::TrafficSum => "traffic-sum",
            MetricKind::TrafficAverage => "traffic-average",
            MetricKind::TrafficMinimum => "traffic-minimum",
            MetricKind::TrafficMaximum => "traffic-maximum",
            MetricKind::VolumeReadOps => "volume-read-ops",
            MetricKind::VolumeWriteOps => "volume-write-ops",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Routing tag carried by each query in a batch
///
/// `resource_index` is a position in the resource collection the batch was
/// built from. The telemetry source echoes the tag back without
/// interpreting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId {
    pub kind: MetricKind,
    pub resource_index: usize,
}

impl QueryId {
    pub fn new(kind: MetricKind, resource_index: usize) -> Self {
        Self {
            kind,
            resource_index,
        }
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.resource_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// A single metric/statistic query against the telemetry API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: QueryId,
    pub namespace: String,
    pub metric_name: String,
    pub dimension: Dimension,
    pub period_secs: u32,
    pub statistic: Statistic,
}

impl MetricQuery {
    fn new(
        kind: MetricKind,
        resource_index: usize,
        namespace: &str,
        metric_name: &str,
        dimension: &Dimension,
        period_secs: u32,
    ) -> Self {
        Self {
            id: QueryId::new(kind, resource_index),
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimension: dimension.clone(),
            period_secs,
            statistic: kind.statistic(),
        }
    }
}

/// Namespace and metric name queried for a load balancer flavor
fn traffic_metric(flavor: LoadBalancerFlavor) -> (&'static str, &'static str) {
    match flavor {
        LoadBalancerFlavor::Application => ("AWS/ApplicationELB", "RequestCount"),
        LoadBalancerFlavor::Network => ("AWS/NetworkELB", "ActiveFlowCount"),
        LoadBalancerFlavor::Gateway => ("AWS/GatewayELB", "ActiveFlowCount"),
    }
}

/// Build every query needed to classify one resource
///
/// # Arguments
/// * `resource` - The resource to plan queries for
/// * `resource_index` - Its position in the collection the batch routes into
/// * `period_secs` - Aggregation period for each data point
pub fn queries_for(
    resource: &ResourceRecord,
    resource_index: usize,
    period_secs: u32,
) -> Vec<MetricQuery> {
    match resource.kind() {
        ResourceKind::ComputeInstance => {
            let dimension = Dimension {
                name: "InstanceId".to_string(),
                value: resource.id().to_string(),
            };
            let cpu = |kind| {
                MetricQuery::new(kind, resource_index, "AWS/EC2", "CPUUtilization", &dimension, period_secs)
            };
            vec![
                cpu(MetricKind::CpuAverage),
                cpu(MetricKind::CpuMinimum),
                cpu(MetricKind::CpuMaximum),
                MetricQuery::new(
                    MetricKind::MemoryUsedPercent,
                    resource_index,
                    "CWAgent",
                    "mem_used_percent",
                    &dimension,
                    period_secs,
                ),
            ]
        }
        ResourceKind::LoadBalancer { flavor } => {
            let (namespace, metric_name) = traffic_metric(flavor);
            let dimension = Dimension {
                name: "LoadBalancer".to_string(),
                value: resource.id().to_string(),
            };
            [
                MetricKind::TrafficSum,
                MetricKind::TrafficAverage,
                MetricKind::TrafficMinimum,
                MetricKind::TrafficMaximum,
            ]
            .into_iter()
            .map(|kind| {
                MetricQuery::new(kind, resource_index, namespace, metric_name, &dimension, period_secs)
            })
            .collect()
        }
        ResourceKind::BlockVolume => {
            let dimension = Dimension {
                name: "VolumeId".to_string(),
                value: resource.id().to_string(),
            };
            vec![
                MetricQuery::new(
                    MetricKind::VolumeReadOps,
                    resource_index,
                    "AWS/EBS",
                    "VolumeReadOps",
                    &dimension,
                    period_secs,
                ),
                MetricQuery::new(
                    MetricKind::VolumeWriteOps,
                    resource_index,
                    "AWS/EBS",
                    "VolumeWriteOps",
                    &dimension,
                    period_secs,
                ),
            ]
        }
    }
}
