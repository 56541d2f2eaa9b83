//! # regiongate - Global traffic routing
//!
//! Picks, per request, the deployment region that should serve it and gates
//! traffic to that region:
//! - **Region**: region registry and deployment tracking
//! - **Geo**: cached client geo resolution
//! - **Health**: background health monitor and region health scores
//! - **Routing**: prioritized rule chain (geographic, latency, health, weighted)
//! - **Protection**: per-key circuit breaker and sliding-window rate limiter
//! - **Monitoring**: metrics and logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use regiongate::config::RouterConfig;
//! use regiongate::core::RequestContext;
//! use regiongate::geo::{ClientLocation, StaticGeoLookup};
//! use regiongate::health::{DeploymentHealthCheck, RegionHealth, RegionHealthCheck};
//! use regiongate::region::{HealthStatus, Region};
//! use regiongate::router::GlobalRouter;
//! use std::sync::Arc;
//!
//! struct AlwaysHealthy;
//!
//! #[async_trait::async_trait]
//! impl RegionHealthCheck for AlwaysHealthy {
//!     async fn check_region_health(&self, _: &str) -> regiongate::Result<RegionHealth> {
//!         Ok(RegionHealth::Healthy)
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl DeploymentHealthCheck for AlwaysHealthy {
//!     async fn check_deployment_health(&self, _: &str) -> regiongate::Result<HealthStatus> {
//!         Ok(HealthStatus::Healthy)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> regiongate::Result<()> {
//!     let client = "203.0.113.7".parse().unwrap();
//!     let lookup = StaticGeoLookup::new()
//!         .with_location(client, ClientLocation::new("DE", 52.52, 13.40));
//!     let checks = Arc::new(AlwaysHealthy);
//!
//!     let router = GlobalRouter::new(RouterConfig::default(), Arc::new(lookup), checks.clone(), checks)?;
//!     router.register_region(Region::new("eu-central-1", "EU Central", "Frankfurt"))?;
//!     router.register_region(Region::new("us-east-1", "US East", "Virginia"))?;
//!     router.start_health_monitoring()?;
//!
//!     let region = router.route(client, &RequestContext::new()).await;
//!     let key = format!("trading:{}", region);
//!     if router.allow_request(&key).is_allowed() {
//!         router.record_outcome(&key, true, std::time::Duration::from_millis(12));
//!     }
//!
//!     router.stop_health_monitoring().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod geo;
pub mod health;
pub mod monitoring;
pub mod protection;
pub mod region;
pub mod router;
pub mod routing;

pub use core::error::{Error, Result};
