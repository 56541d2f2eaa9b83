//! Per-region service deployments.
//!
//! Tracks every rollout of a service into a region along with its lifecycle
//! and health state.

use crate::core::{now, Error, Result, Timestamp};
use crate::region::registry::RegionRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Deployment lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Rollout in progress
    Deploying,
    /// Serving traffic
    Active,
    /// Rollout or runtime failure
    Failed,
    /// Reverting to the previous version
    RollingBack,
}

impl DeploymentStatus {
    /// Check whether a status change is permitted.
    ///
    /// `Active` is only reachable from `Deploying` and `RollingBack` only from
    /// `Active`. A failed or rolled-back deployment may start a new attempt.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Deploying, Active)
                | (Deploying, Failed)
                | (Active, RollingBack)
                | (Active, Failed)
                | (RollingBack, Failed)
                | (RollingBack, Deploying)
                | (Failed, Deploying)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Deploying => write!(f, "Deploying"),
            DeploymentStatus::Active => write!(f, "Active"),
            DeploymentStatus::Failed => write!(f, "Failed"),
            DeploymentStatus::RollingBack => write!(f, "RollingBack"),
        }
    }
}

/// Deployment health as reported by the health monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Resource requirements for a deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU request (e.g., "500m")
    pub cpu_request: String,
    /// CPU limit
    pub cpu_limit: String,
    /// Memory request (e.g., "512Mi")
    pub memory_request: String,
    /// Memory limit
    pub memory_limit: String,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            cpu_request: "500m".to_string(),
            cpu_limit: "1000m".to_string(),
            memory_request: "512Mi".to_string(),
            memory_limit: "1Gi".to_string(),
        }
    }
}

/// One versioned rollout of a service into a region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment ID
    pub id: String,
    /// Owning region
    pub region_id: String,
    /// Service name
    pub service: String,
    /// Version string
    pub version: String,
    /// Lifecycle status
    pub status: DeploymentStatus,
    /// Desired replica count
    pub replicas: u32,
    /// Resource requests and limits
    pub resources: ResourceRequirements,
    /// Last reported health
    pub health: HealthStatus,
    /// Created timestamp
    pub created_at: Timestamp,
    /// Updated timestamp
    pub updated_at: Timestamp,
}

impl Deployment {
    /// Create a new deployment in the `Deploying` state.
    pub fn new(region_id: &str, service: &str, version: &str) -> Self {
        let created = now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            region_id: region_id.to_string(),
            service: service.to_string(),
            version: version.to_string(),
            status: DeploymentStatus::Deploying,
            replicas: 3,
            resources: ResourceRequirements::default(),
            health: HealthStatus::Healthy,
            created_at: created,
            updated_at: created,
        }
    }

    /// Use a fixed ID.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set replica count.
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set resource requirements.
    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = resources;
        self
    }

    /// Set initial status.
    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = status;
        self
    }

    fn touch(&mut self) {
        let ts = now();
        // Keep updated_at strictly increasing even on coarse clocks.
        self.updated_at = if ts > self.updated_at {
            ts
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }
}

/// Outcome reported by the deployment executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Executes a rollout on the target platform.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Roll the deployment out.
    async fn deploy(&self, deployment: &Deployment) -> Result<DeployOutcome>;
}

#[derive(Default)]
struct TrackerState {
    order: Vec<String>,
    deployments: HashMap<String, Deployment>,
}

/// Tracker for deployments across all regions.
pub struct DeploymentTracker {
    regions: Arc<RegionRegistry>,
    state: RwLock<TrackerState>,
}

impl DeploymentTracker {
    /// Create a tracker validating against a region registry.
    pub fn new(regions: Arc<RegionRegistry>) -> Self {
        Self {
            regions,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Record a new deployment. Existing records only change through
    /// [`update_status`](Self::update_status).
    pub fn record(&self, deployment: Deployment) -> Result<()> {
        if !self.regions.contains(&deployment.region_id) {
            return Err(Error::InvalidRegion(deployment.region_id));
        }

        let mut state = self.state.write();
        if state.deployments.contains_key(&deployment.id) {
            return Err(Error::DuplicateDeployment(deployment.id));
        }
        state.order.push(deployment.id.clone());
        info!(
            deployment = %deployment.id,
            service = %deployment.service,
            region = %deployment.region_id,
            version = %deployment.version,
            "Deployment recorded"
        );
        state.deployments.insert(deployment.id.clone(), deployment);
        Ok(())
    }

    /// Get a deployment.
    pub fn get(&self, deployment_id: &str) -> Option<Deployment> {
        self.state.read().deployments.get(deployment_id).cloned()
    }

    /// Update status and health together.
    pub fn update_status(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        health: HealthStatus,
    ) -> Result<Deployment> {
        let mut state = self.state.write();
        let deployment = state
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| Error::DeploymentNotFound(deployment_id.to_string()))?;

        if !deployment.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                id: deployment_id.to_string(),
                from: deployment.status.to_string(),
                to: status.to_string(),
            });
        }

        if deployment.status != status {
            info!(deployment = %deployment_id, from = %deployment.status, to = %status, "Deployment status changed");
        }
        deployment.status = status;
        deployment.health = health;
        deployment.touch();
        Ok(deployment.clone())
    }

    /// Update health only, returning the previous health.
    pub fn set_health(&self, deployment_id: &str, health: HealthStatus) -> Result<HealthStatus> {
        let mut state = self.state.write();
        let deployment = state
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| Error::DeploymentNotFound(deployment_id.to_string()))?;

        let previous = deployment.health;
        deployment.health = health;
        deployment.touch();
        Ok(previous)
    }

    /// Deployments of a service, in recording order.
    pub fn list_by_service(&self, service: &str) -> Vec<Deployment> {
        self.filtered(|d| d.service == service)
    }

    /// Deployments in a region, in recording order.
    pub fn list_by_region(&self, region_id: &str) -> Vec<Deployment> {
        self.filtered(|d| d.region_id == region_id)
    }

    /// All deployments, in recording order.
    pub fn list(&self) -> Vec<Deployment> {
        self.filtered(|_| true)
    }

    fn filtered(&self, predicate: impl Fn(&Deployment) -> bool) -> Vec<Deployment> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.deployments.get(id))
            .filter(|d| predicate(d))
            .cloned()
            .collect()
    }

    /// Get deployment count.
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    /// Check if no deployments are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a deployment and roll it out through the executor.
    ///
    /// The deployment ends `Active` on success and `Failed` otherwise; executor
    /// errors are folded into a failed outcome.
    pub async fn rollout(&self, deployment: Deployment, deployer: &dyn Deployer) -> Result<Deployment> {
        let deployment = deployment.with_status(DeploymentStatus::Deploying);
        let id = deployment.id.clone();
        self.record(deployment.clone())?;

        let outcome = match deployer.deploy(&deployment).await {
            Ok(outcome) => outcome,
            Err(e) => DeployOutcome::Failed {
                reason: e.to_string(),
            },
        };

        match outcome {
            DeployOutcome::Succeeded => {
                self.update_status(&id, DeploymentStatus::Active, HealthStatus::Healthy)
            }
            DeployOutcome::Failed { reason } => {
                warn!(deployment = %id, reason = %reason, "Rollout failed");
                self.update_status(&id, DeploymentStatus::Failed, HealthStatus::Unhealthy)
            }
        }
    }

    /// Start rolling back an active deployment.
    pub fn rollback(&self, deployment_id: &str) -> Result<Deployment> {
        let health = self
            .get(deployment_id)
            .map(|d| d.health)
            .ok_or_else(|| Error::DeploymentNotFound(deployment_id.to_string()))?;
        self.update_status(deployment_id, DeploymentStatus::RollingBack, health)
    }
}
