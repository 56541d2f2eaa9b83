//! Region registry for multi-region routing.
//!
//! Holds every known deployment region with its capacity, compliance and
//! inter-region latency attributes.

use crate::core::{now, Coordinates, Error, Result, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Region status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionStatus {
    /// Region is serving traffic
    Active,
    /// Region is under planned maintenance
    Maintenance,
    /// Region failed its last health check
    Failed,
}

impl std::fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionStatus::Active => write!(f, "active"),
            RegionStatus::Maintenance => write!(f, "maintenance"),
            RegionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A geographic deployment region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    /// Region ID (unique, immutable)
    pub id: String,
    /// Display name
    pub name: String,
    /// Geographic location label
    pub location: String,
    /// Cloud provider tag
    pub provider: String,
    /// Current status
    pub status: RegionStatus,
    /// Capacity attributes (cpu_cores, memory_gb, storage_tb, network_gbps, ...)
    pub capacity: HashMap<String, f64>,
    /// Compliance regimes satisfied by this region
    pub compliance: BTreeSet<String>,
    /// Expected latency (ms) from this region to every other region
    pub latency_ms: HashMap<String, u32>,
    /// Reference coordinates, overriding the built-in geography table
    pub coordinates: Option<Coordinates>,
    /// Last status change
    pub updated_at: Timestamp,
}

impl Region {
    /// Create a new active region.
    pub fn new(id: &str, name: &str, location: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            provider: String::new(),
            status: RegionStatus::Active,
            capacity: HashMap::new(),
            compliance: BTreeSet::new(),
            latency_ms: HashMap::new(),
            coordinates: None,
            updated_at: now(),
        }
    }

    /// Set provider tag.
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Set a capacity attribute.
    pub fn with_capacity(mut self, attribute: &str, value: f64) -> Self {
        self.capacity.insert(attribute.to_string(), value);
        self
    }

    /// Add a compliance regime.
    pub fn with_compliance(mut self, regime: &str) -> Self {
        self.compliance.insert(regime.to_string());
        self
    }

    /// Set expected latency to another region.
    pub fn with_latency(mut self, region_id: &str, latency_ms: u32) -> Self {
        self.latency_ms.insert(region_id.to_string(), latency_ms);
        self
    }

    /// Set reference coordinates.
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some(Coordinates::new(latitude, longitude));
        self
    }

    /// Set initial status.
    pub fn with_status(mut self, status: RegionStatus) -> Self {
        self.status = status;
        self
    }

    /// Check if region is serving traffic.
    pub fn is_active(&self) -> bool {
        self.status == RegionStatus::Active
    }

    /// Expected latency to another region, if known.
    pub fn latency_to(&self, region_id: &str) -> Option<u32> {
        self.latency_ms.get(region_id).copied()
    }

    /// Check compliance with a regime.
    pub fn complies_with(&self, regime: &str) -> bool {
        self.compliance.contains(regime)
    }
}

#[derive(Default)]
struct RegistryState {
    /// Region IDs in registration order
    order: Vec<String>,
    /// All regions by ID
    regions: HashMap<String, Region>,
}

/// Registry of known regions.
///
/// Reads vastly outnumber writes; a single lock guards the whole table.
#[derive(Default)]
pub struct RegionRegistry {
    state: RwLock<RegistryState>,
}

impl RegionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new region.
    pub fn register(&self, region: Region) -> Result<()> {
        let mut state = self.state.write();
        if state.regions.contains_key(&region.id) {
            return Err(Error::DuplicateRegion(region.id));
        }

        let missing: Vec<&String> = state
            .order
            .iter()
            .filter(|other| !region.latency_ms.contains_key(*other))
            .collect();
        if !missing.is_empty() {
            warn!(region = %region.id, missing = ?missing, "Region registered without latency entries");
        }

        info!(region = %region.id, provider = %region.provider, status = %region.status, "Region registered");
        state.order.push(region.id.clone());
        state.regions.insert(region.id.clone(), region);
        Ok(())
    }

    /// Get a region by ID.
    pub fn get(&self, region_id: &str) -> Option<Region> {
        self.state.read().regions.get(region_id).cloned()
    }

    /// Check if a region exists.
    pub fn contains(&self, region_id: &str) -> bool {
        self.state.read().regions.contains_key(region_id)
    }

    /// List all regions in registration order.
    pub fn list(&self) -> Vec<Region> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.regions.get(id).cloned())
            .collect()
    }

    /// List region IDs in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.state.read().order.clone()
    }

    /// Current status of a region.
    pub fn status(&self, region_id: &str) -> Option<RegionStatus> {
        self.state.read().regions.get(region_id).map(|r| r.status)
    }

    /// Set region status, returning the previous status.
    pub fn set_status(&self, region_id: &str, status: RegionStatus) -> Result<RegionStatus> {
        let mut state = self.state.write();
        let region = state
            .regions
            .get_mut(region_id)
            .ok_or_else(|| Error::RegionNotFound(region_id.to_string()))?;

        let previous = region.status;
        if previous != status {
            region.status = status;
            region.updated_at = now();
            info!(region = %region_id, from = %previous, to = %status, "Region status changed");
        }
        Ok(previous)
    }

    /// Regions currently serving traffic.
    pub fn active_regions(&self) -> Vec<Region> {
        self.list().into_iter().filter(|r| r.is_active()).collect()
    }

    /// Regions satisfying a compliance regime.
    pub fn compliant_regions(&self, regime: &str) -> Vec<Region> {
        self.list()
            .into_iter()
            .filter(|r| r.complies_with(regime))
            .collect()
    }

    /// Ordered region pairs with no latency entry.
    pub fn missing_latency_pairs(&self) -> Vec<(String, String)> {
        let state = self.state.read();
        let mut missing = Vec::new();
        for from in &state.order {
            if let Some(region) = state.regions.get(from) {
                for to in state.order.iter().filter(|to| *to != from) {
                    if !region.latency_ms.contains_key(to) {
                        missing.push((from.clone(), to.clone()));
                    }
                }
            }
        }
        missing
    }

    /// Get region count.
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    /// Check if no regions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum a capacity attribute across active regions.
    pub fn total_capacity(&self, attribute: &str) -> f64 {
        self.state
            .read()
            .regions
            .values()
            .filter(|r| r.is_active())
            .filter_map(|r| r.capacity.get(attribute))
            .sum()
    }
}
