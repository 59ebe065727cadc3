//! Resource and reservation inventories

use crate::models::{ResourceDescriptor, ResourceRecord};
use crate::reservation::{ReservationDescriptor, ReservationRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Resources and reservations of one scope (usually a region)
///
/// Scopes are classified independently: reservations of one scope are
/// never matched against resources of another.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub scope: String,
    pub resources: Vec<ResourceRecord>,
    pub reservations: Vec<ReservationRecord>,
}

impl Inventory {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    pub fn with_resources(mut self, resources: Vec<ResourceRecord>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_reservations(mut self, reservations: Vec<ReservationRecord>) -> Self {
        self.reservations = reservations;
        self
    }
}

/// Descriptors of one scope as written by the discovery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope: String,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub reservations: Vec<ReservationDescriptor>,
}

/// Inventory snapshot file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub scopes: Vec<ScopeSnapshot>,
}

impl InventorySnapshot {
    /// Load a JSON snapshot from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read inventory snapshot {:?}", path))?;
        let snapshot: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse inventory snapshot {:?}", path))?;

        debug!(path = %path.display(), scopes = snapshot.scopes.len(), "Loaded inventory snapshot");
        Ok(snapshot)
    }

    /// Validate every descriptor, skipping the ones that fail
    pub fn into_inventories(self) -> Vec<Inventory> {
        self.scopes
            .into_iter()
            .map(|scope| {
                let resources = scope
                    .resources
                    .into_iter()
                    .filter_map(|d| {
                        let id = d.id.clone();
                        ResourceRecord::new(d)
                            .map_err(|e| {
                                warn!(scope = %scope.scope, resource_id = %id, error = %e, "Skipping invalid resource");
                            })
                            .ok()
                    })
                    .collect();
                let reservations = scope
                    .reservations
                    .into_iter()
                    .filter_map(|d| {
                        let id = d.id.clone();
                        ReservationRecord::new(d)
                            .map_err(|e| {
                                warn!(scope = %scope.scope, reservation_id = %id, error = %e, "Skipping invalid reservation");
                            })
                            .ok()
                    })
                    .collect();

                Inventory::new(scope.scope)
                    .with_resources(resources)
                    .with_reservations(reservations)
            })
            .collect()
    }
}
