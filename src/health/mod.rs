//! Health Module
//!
//! Keeps region and deployment health current:
//! - Health check collaborators
//! - Background monitor loop
//! - Failure ledger and region health scoring

pub mod checks;
pub mod monitor;
pub mod score;

pub use checks::{DeploymentHealthCheck, RegionHealth, RegionHealthCheck};
pub use monitor::{CycleHook, CycleReport, HealthConfig, HealthMonitor, RegionTransition};
pub use score::{FailureLedger, HealthScorer};
