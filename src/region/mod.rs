//! Region Module
//!
//! Provides regional bookkeeping:
//! - Region registry
//! - Deployment tracking and rollout

pub mod deployment;
pub mod registry;

pub use deployment::{
    DeployOutcome, Deployer, Deployment, DeploymentStatus, DeploymentTracker, HealthStatus,
    ResourceRequirements,
};
pub use registry::{Region, RegionRegistry, RegionStatus};
