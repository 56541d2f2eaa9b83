//! Global router facade.
//!
//! Owns every component and wires them together. Nothing is process-global;
//! several routers can coexist, each with its own registries.

use crate::config::RouterConfig;
use crate::core::{RequestContext, Result};
use crate::geo::{GeoLookup, GeoResolver};
use crate::health::{
    CycleReport, DeploymentHealthCheck, FailureLedger, HealthMonitor, HealthScorer, RegionHealthCheck,
};
use crate::monitoring::{MetricsRecorder, MetricsSnapshot};
use crate::protection::{BreakerSnapshot, GateDecision, TrafficGate};
use crate::region::{Deployer, Deployment, DeploymentStatus, DeploymentTracker, Region, RegionRegistry};
use crate::routing::{RouteDecision, RoutingEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Aggregate view returned by [`GlobalRouter::get_stats`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterStats {
    pub metrics: MetricsSnapshot,
    pub regions: usize,
    pub active_regions: usize,
    pub deployments: usize,
    /// Health score per region
    pub health_scores: BTreeMap<String, f64>,
    pub breakers: Vec<BreakerSnapshot>,
    pub monitor_running: bool,
    pub monitor_cycles: u64,
}

/// Entry point for registration, routing and gating.
pub struct GlobalRouter {
    regions: Arc<RegionRegistry>,
    deployments: Arc<DeploymentTracker>,
    ledger: Arc<FailureLedger>,
    scorer: Arc<HealthScorer>,
    engine: Arc<RoutingEngine>,
    gate: TrafficGate,
    monitor: Arc<HealthMonitor>,
    metrics: Arc<MetricsRecorder>,
}

impl GlobalRouter {
    /// Build a router. Fails only on invalid configuration.
    pub fn new(
        config: RouterConfig,
        geo_lookup: Arc<dyn GeoLookup>,
        region_check: Arc<dyn RegionHealthCheck>,
        deployment_check: Arc<dyn DeploymentHealthCheck>,
    ) -> Result<Self> {
        config.validate()?;

        let regions = Arc::new(RegionRegistry::new());
        let deployments = Arc::new(DeploymentTracker::new(regions.clone()));
        let ledger = Arc::new(FailureLedger::new(config.health.failure_window()));
        let scorer = Arc::new(HealthScorer::new(
            regions.clone(),
            deployments.clone(),
            ledger.clone(),
            config.health.failure_penalty,
        ));
        let metrics = Arc::new(MetricsRecorder::new());
        let geo = Arc::new(GeoResolver::new(geo_lookup, &config.geo));

        let engine = Arc::new(RoutingEngine::new(
            regions.clone(),
            scorer.clone(),
            geo,
            metrics.clone(),
            config.rules.clone(),
            &config.default_region,
            &config.routing,
        )?);
        for (region_id, weight) in &config.region_weights {
            engine.set_region_weight(region_id, *weight);
        }

        let gate = TrafficGate::new(&config.circuit_breaker, &config.rate_limiter, metrics.clone());
        let cached = Arc::clone(&engine);
        let monitor = Arc::new(
            HealthMonitor::new(
                regions.clone(),
                deployments.clone(),
                ledger.clone(),
                region_check,
                deployment_check,
                config.health.clone(),
            )
            .with_cycle_hook(Arc::new(move |report: &CycleReport| {
                if report.has_health_changes() {
                    cached.clear_cache();
                }
            })),
        );

        info!(default_region = %config.default_region, "Global router created");
        Ok(Self {
            regions,
            deployments,
            ledger,
            scorer,
            engine,
            gate,
            monitor,
            metrics,
        })
    }

    /// Register a region.
    pub fn register_region(&self, region: Region) -> Result<()> {
        self.regions.register(region)
    }

    /// Record a deployment without rolling it out.
    pub fn register_deployment(&self, deployment: Deployment) -> Result<()> {
        self.deployments.record(deployment)
    }

    /// Record and roll out a deployment. A failed rollout counts against its region.
    pub async fn deploy(&self, deployment: Deployment, deployer: &dyn Deployer) -> Result<Deployment> {
        let deployment = self.deployments.rollout(deployment, deployer).await?;
        if deployment.status == DeploymentStatus::Failed {
            self.ledger.record_failure(&deployment.region_id);
        }
        self.engine.clear_cache();
        Ok(deployment)
    }

    /// Pick the region that should serve a request.
    pub async fn route(&self, address: IpAddr, context: &RequestContext) -> String {
        self.engine.route(address, context).await
    }

    /// Pick a region and report which rule chose it.
    pub async fn decide(&self, address: IpAddr, context: &RequestContext) -> RouteDecision {
        self.engine.decide(address, context).await
    }

    /// Combined breaker and rate-limit check for `key`.
    pub fn allow_request(&self, key: &str) -> GateDecision {
        self.gate.allow_request(key)
    }

    /// Report how a gated request went.
    pub fn record_outcome(&self, key: &str, success: bool, latency: Duration) {
        self.gate.record_outcome(key, success, latency);
    }

    /// Aggregate statistics.
    pub fn get_stats(&self) -> RouterStats {
        RouterStats {
            metrics: self.metrics.snapshot(),
            regions: self.regions.len(),
            active_regions: self.regions.active_regions().len(),
            deployments: self.deployments.len(),
            health_scores: self.scorer.scores().into_iter().collect(),
            breakers: self.gate.breaker().stats(),
            monitor_running: self.monitor.is_running(),
            monitor_cycles: self.monitor.cycles(),
        }
    }

    /// Start the background health monitor. Must be called within a tokio runtime.
    pub fn start_health_monitoring(&self) -> Result<()> {
        self.monitor.start()
    }

    /// Stop the background health monitor.
    pub async fn stop_health_monitoring(&self) {
        self.monitor.stop().await;
    }

    pub fn regions(&self) -> &Arc<RegionRegistry> {
        &self.regions
    }

    pub fn deployments(&self) -> &Arc<DeploymentTracker> {
        &self.deployments
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}
