//! Health check collaborators.

use crate::core::Result;
use crate::region::HealthStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a region health probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionHealth {
    Healthy,
    Unhealthy,
}

/// Probes whole regions.
#[async_trait]
pub trait RegionHealthCheck: Send + Sync {
    /// Check a region. Errors are treated as unhealthy by the caller.
    async fn check_region_health(&self, region_id: &str) -> Result<RegionHealth>;
}

/// Probes individual deployments.
#[async_trait]
pub trait DeploymentHealthCheck: Send + Sync {
    /// Check a deployment. Errors are treated as unhealthy by the caller.
    async fn check_deployment_health(&self, deployment_id: &str) -> Result<HealthStatus>;
}
