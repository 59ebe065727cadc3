//! Core data models for the classification engine

use crate::error::{EngineError, Result};
use crate::telemetry::{MetricKind, Sample, TelemetrySeries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state reported by resource discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    /// Load balancer serving traffic
    Active,
    /// Volume attached to an instance
    InUse,
    /// Volume not attached to anything
    Available,
    #[serde(other)]
    Unknown,
}

impl ResourceState {
    /// Live states: running instances, active load balancers, attached volumes
    ///
    /// Only live resources consume telemetry queries and reservations.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ResourceState::Running | ResourceState::Active | ResourceState::InUse
        )
    }
}

/// Load balancer flavor, which decides the traffic metric queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerFlavor {
    Application,
    Network,
    Gateway,
}

/// Kind of billable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    ComputeInstance,
    LoadBalancer { flavor: LoadBalancerFlavor },
    BlockVolume,
}

impl ResourceKind {
    /// Reservations are only sold for compute capacity
    pub fn is_reservable(&self) -> bool {
        matches!(self, ResourceKind::ComputeInstance)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ComputeInstance => "compute_instance",
            ResourceKind::LoadBalancer { .. } => "load_balancer",
            ResourceKind::BlockVolume => "block_volume",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership category of a running resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Reserved,
    Spot,
    OnDemand,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Reserved => "reserved",
            Category::Spot => "spot",
            Category::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key used to associate resources with reservations
///
/// `location` holds an availability zone for the zone-keyed index and a
/// region for the region-keyed index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub location: String,
    pub tenancy: String,
    pub instance_type: String,
    pub platform: String,
}

impl MatchKey {
    pub fn new(
        location: impl Into<String>,
        tenancy: impl Into<String>,
        instance_type: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            tenancy: tenancy.into(),
            instance_type: instance_type.into(),
            platform: platform.into(),
        }
    }
}

/// Resource description as produced by the discovery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    #[serde(flatten)]
    pub kind: ResourceKind,
    pub state: ResourceState,
    pub region: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub tenancy: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub spot_request_id: Option<String>,
}

/// A billable unit with its collected telemetry
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    id: String,
    kind: ResourceKind,
    state: ResourceState,
    region: String,
    availability_zone: String,
    tenancy: String,
    instance_type: String,
    platform: String,
    spot_request_id: Option<String>,
    telemetry: BTreeMap<MetricKind, TelemetrySeries>,
}

impl ResourceRecord {
    /// Validate a descriptor and build the record
    pub fn new(descriptor: ResourceDescriptor) -> Result<Self> {
        if descriptor.id.trim().is_empty() {
            return Err(EngineError::invalid_record("resource id must be provided"));
        }
        if descriptor.region.trim().is_empty() {
            return Err(EngineError::invalid_record(format!(
                "resource {} has no region",
                descriptor.id
            )));
        }

        // Matching needs the full key for running compute instances
        if descriptor.kind.is_reservable() && descriptor.state.is_running() {
            let missing = [
                ("availability_zone", &descriptor.availability_zone),
                ("tenancy", &descriptor.tenancy),
                ("instance_type", &descriptor.instance_type),
                ("platform", &descriptor.platform),
            ]
            .into_iter()
            .find(|(_, value)| value.trim().is_empty());

            if let Some((field, _)) = missing {
                return Err(EngineError::invalid_record(format!(
                    "running instance {} is missing {}",
                    descriptor.id, field
                )));
            }
        }

        Ok(Self {
            id: descriptor.id,
            kind: descriptor.kind,
            state: descriptor.state,
            region: descriptor.region,
            availability_zone: descriptor.availability_zone,
            tenancy: descriptor.tenancy,
            instance_type: descriptor.instance_type,
            platform: descriptor.platform,
            spot_request_id: descriptor.spot_request_id.filter(|id| !id.is_empty()),
            telemetry: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn availability_zone(&self) -> &str {
        &self.availability_zone
    }

    pub fn tenancy(&self) -> &str {
        &self.tenancy
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn spot_request_id(&self) -> Option<&str> {
        self.spot_request_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// True when the resource fulfils a spot request
    pub fn is_spot(&self) -> bool {
        self.spot_request_id.is_some()
    }

    /// Key for the zone-keyed reservation index
    pub fn zone_key(&self) -> MatchKey {
        MatchKey::new(
            &self.availability_zone,
            &self.tenancy,
            &self.instance_type,
            &self.platform,
        )
    }

    /// Key for the region-keyed reservation index
    pub fn region_key(&self) -> MatchKey {
        MatchKey::new(&self.region, &self.tenancy, &self.instance_type, &self.platform)
    }

    /// Telemetry collected for a slot, if the slot was ever queried
    pub fn series(&self, kind: MetricKind) -> Option<&TelemetrySeries> {
        self.telemetry.get(&kind)
    }

    /// True when the slot holds at least one sample
    pub fn has_data(&self, kind: MetricKind) -> bool {
        self.series(kind).map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// Slot for a metric kind, created empty on first access
    pub fn series_mut(&mut self, kind: MetricKind) -> &mut TelemetrySeries {
        self.telemetry.entry(kind).or_default()
    }

    /// Append samples to a telemetry slot
    pub fn append_samples(&mut self, kind: MetricKind, samples: impl IntoIterator<Item = Sample>) {
        self.series_mut(kind).extend(samples);
    }

    /// Names of the populated telemetry slots
    pub fn telemetry_slots(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.telemetry.keys().copied()
    }
}
