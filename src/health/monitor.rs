//! Background health monitoring.
//!
//! Periodically probes every region and deployment and writes the results
//! back into the registry and tracker. A failing probe only affects its own
//! entity; the cycle always runs to completion.

use crate::core::{now, Error, Result, Timestamp};
use crate::health::checks::{DeploymentHealthCheck, RegionHealth, RegionHealthCheck};
use crate::health::score::FailureLedger;
use crate::region::{DeploymentStatus, DeploymentTracker, HealthStatus, RegionRegistry, RegionStatus};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Health monitoring configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between cycles (seconds)
    pub interval_secs: u64,
    /// Timeout for a single probe (ms)
    pub check_timeout_ms: u64,
    /// How long a deployment failure counts against its region (seconds)
    pub failure_window_secs: u64,
    /// Health score lost per failure
    pub failure_penalty: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            check_timeout_ms: 5000,
            failure_window_secs: 300,
            failure_penalty: 0.2,
        }
    }
}

impl HealthConfig {
    /// Cycle interval. Never zero.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs).max(Duration::from_millis(1))
    }

    /// Probe timeout.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Failure window.
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

/// A region status change observed during a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTransition {
    pub region_id: String,
    pub from: RegionStatus,
    pub to: RegionStatus,
}

/// Summary of one monitoring cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// When the cycle started
    pub started_at: Option<Timestamp>,
    /// Regions probed
    pub regions_checked: usize,
    /// Deployments probed
    pub deployments_checked: usize,
    /// Region status changes
    pub region_transitions: Vec<RegionTransition>,
    /// Deployments that left the healthy state
    pub degraded_deployments: Vec<String>,
    /// Deployments whose health changed in either direction
    pub deployment_health_changes: usize,
    /// Probes that errored or timed out
    pub check_errors: usize,
}

impl CycleReport {
    /// Whether the cycle changed any region status or deployment health.
    pub fn has_health_changes(&self) -> bool {
        !self.region_transitions.is_empty() || self.deployment_health_changes > 0
    }
}

/// Callback run after every completed cycle.
pub type CycleHook = Arc<dyn Fn(&CycleReport) + Send + Sync>;

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic region and deployment health monitor.
pub struct HealthMonitor {
    regions: Arc<RegionRegistry>,
    deployments: Arc<DeploymentTracker>,
    ledger: Arc<FailureLedger>,
    region_check: Arc<dyn RegionHealthCheck>,
    deployment_check: Arc<dyn DeploymentHealthCheck>,
    config: HealthConfig,
    cycles: AtomicU64,
    on_cycle: Option<CycleHook>,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    /// Create a monitor.
    pub fn new(
        regions: Arc<RegionRegistry>,
        deployments: Arc<DeploymentTracker>,
        ledger: Arc<FailureLedger>,
        region_check: Arc<dyn RegionHealthCheck>,
        deployment_check: Arc<dyn DeploymentHealthCheck>,
        config: HealthConfig,
    ) -> Self {
        Self {
            regions,
            deployments,
            ledger,
            region_check,
            deployment_check,
            config,
            cycles: AtomicU64::new(0),
            on_cycle: None,
            task: Mutex::new(None),
        }
    }

    /// Run `hook` with the report of every cycle.
    pub fn with_cycle_hook(mut self, hook: CycleHook) -> Self {
        self.on_cycle = Some(hook);
        self
    }

    /// Start the background loop. The first cycle runs immediately.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(Error::MonitorAlreadyRunning);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });
        *task = Some(MonitorTask { shutdown, handle });

        info!(interval_secs = self.config.interval_secs, "Health monitor started");
        Ok(())
    }

    /// Stop the loop and wait for the in-flight cycle to finish.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                error!(error = %e, "Health monitor task ended abnormally");
            }
            info!(cycles = self.cycles(), "Health monitor stopped");
        }
    }

    /// Check if the background loop is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Number of cycles started.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;
        }
    }

    /// Run one monitoring cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = CycleReport {
            cycle,
            started_at: Some(now()),
            ..Default::default()
        };

        self.check_regions(&mut report).await;
        self.check_deployments(&mut report).await;

        debug!(
            cycle,
            regions = report.regions_checked,
            deployments = report.deployments_checked,
            errors = report.check_errors,
            "Health cycle complete"
        );
        if let Some(hook) = &self.on_cycle {
            hook(&report);
        }
        report
    }

    async fn check_regions(&self, report: &mut CycleReport) {
        let targets: Vec<String> = self
            .regions
            .list()
            .into_iter()
            .filter(|r| r.status != RegionStatus::Maintenance)
            .map(|r| r.id)
            .collect();

        let timeout = self.config.check_timeout();
        let probes = targets.iter().map(|id| {
            let check = Arc::clone(&self.region_check);
            async move {
                match tokio::time::timeout(timeout, check.check_region_health(id)).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(Error::from(elapsed)),
                }
            }
        });
        let results = join_all(probes).await;

        for (region_id, result) in targets.iter().zip(results) {
            report.regions_checked += 1;
            let status = match result {
                Ok(RegionHealth::Healthy) => RegionStatus::Active,
                Ok(RegionHealth::Unhealthy) => RegionStatus::Failed,
                Err(e) => {
                    report.check_errors += 1;
                    warn!(region = %region_id, error = %e, "Region health check failed");
                    RegionStatus::Failed
                }
            };

            match self.regions.set_status(region_id, status) {
                Ok(previous) if previous != status => {
                    if status == RegionStatus::Failed {
                        warn!(region = %region_id, from = %previous, "Region marked failed");
                    } else {
                        info!(region = %region_id, from = %previous, "Region recovered");
                    }
                    report.region_transitions.push(RegionTransition {
                        region_id: region_id.clone(),
                        from: previous,
                        to: status,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(region = %region_id, error = %e, "Could not update region status"),
            }
        }
    }

    async fn check_deployments(&self, report: &mut CycleReport) {
        let targets: Vec<(String, String, DeploymentStatus)> = self
            .deployments
            .list()
            .into_iter()
            .map(|d| (d.id, d.region_id, d.status))
            .collect();

        let timeout = self.config.check_timeout();
        let probes = targets.iter().map(|(id, _, _)| {
            let check = Arc::clone(&self.deployment_check);
            async move {
                match tokio::time::timeout(timeout, check.check_deployment_health(id)).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(Error::from(elapsed)),
                }
            }
        });
        let results = join_all(probes).await;

        for ((deployment_id, region_id, status), result) in targets.iter().zip(results) {
            report.deployments_checked += 1;
            let health = match result {
                Ok(health) => health,
                Err(e) => {
                    report.check_errors += 1;
                    warn!(deployment = %deployment_id, error = %e, "Deployment health check failed");
                    HealthStatus::Unhealthy
                }
            };

            let previous = match self.deployments.set_health(deployment_id, health) {
                Ok(previous) => previous,
                Err(e) => {
                    warn!(deployment = %deployment_id, error = %e, "Could not update deployment health");
                    continue;
                }
            };
            if previous == health {
                continue;
            }
            report.deployment_health_changes += 1;

            if previous == HealthStatus::Healthy {
                warn!(deployment = %deployment_id, region = %region_id, health = %health, "Deployment no longer healthy");
                report.degraded_deployments.push(deployment_id.clone());
            } else if health == HealthStatus::Healthy {
                info!(deployment = %deployment_id, region = %region_id, "Deployment healthy again");
            }

            // Only a serving deployment going down counts against its region.
            if health == HealthStatus::Unhealthy && *status == DeploymentStatus::Active {
                self.ledger.record_failure(region_id);
            }
        }
    }
}
