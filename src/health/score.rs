//! Region health scoring.
//!
//! A region's score is 1.0 when it is active with no recent trouble, and drops
//! by a fixed penalty for every recent deployment failure and every currently
//! unhealthy deployment (half for degraded ones). Non-active regions score 0.

use crate::region::{DeploymentStatus, DeploymentTracker, HealthStatus, RegionRegistry, RegionStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding record of deployment failures per region.
pub struct FailureLedger {
    window: Duration,
    failures: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl FailureLedger {
    /// Create a ledger remembering failures for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure in a region.
    pub fn record_failure(&self, region_id: &str) {
        self.record_failure_at(region_id, Instant::now());
    }

    /// Record a failure in a region at `now`.
    pub fn record_failure_at(&self, region_id: &str, now: Instant) {
        let mut failures = self.failures.lock();
        let entries = failures.entry(region_id.to_string()).or_default();
        Self::prune(entries, self.window, now);
        entries.push_back(now);
    }

    /// Failures recorded within the window.
    pub fn recent_failures(&self, region_id: &str) -> usize {
        self.recent_failures_at(region_id, Instant::now())
    }

    /// Failures recorded within the window ending at `now`.
    pub fn recent_failures_at(&self, region_id: &str, now: Instant) -> usize {
        let mut failures = self.failures.lock();
        match failures.get_mut(region_id) {
            Some(entries) => {
                Self::prune(entries, self.window, now);
                entries.len()
            }
            None => 0,
        }
    }

    /// Forget all failures for a region.
    pub fn clear(&self, region_id: &str) {
        self.failures.lock().remove(region_id);
    }

    fn prune(entries: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = entries.front() {
            if now.saturating_duration_since(*oldest) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Derives region health scores from monitoring state.
pub struct HealthScorer {
    regions: Arc<RegionRegistry>,
    deployments: Arc<DeploymentTracker>,
    ledger: Arc<FailureLedger>,
    penalty: f64,
}

impl HealthScorer {
    /// Create a scorer. `penalty` is the score lost per failure unit.
    pub fn new(
        regions: Arc<RegionRegistry>,
        deployments: Arc<DeploymentTracker>,
        ledger: Arc<FailureLedger>,
        penalty: f64,
    ) -> Self {
        Self {
            regions,
            deployments,
            ledger,
            penalty: penalty.max(0.0),
        }
    }

    /// Score a single region in [0, 1]. Unknown regions score 0.
    pub fn score(&self, region_id: &str) -> f64 {
        match self.regions.status(region_id) {
            Some(RegionStatus::Active) => {}
            _ => return 0.0,
        }

        let unhealthy: f64 = self
            .deployments
            .list_by_region(region_id)
            .iter()
            .filter(|d| d.status == DeploymentStatus::Active)
            .map(|d| match d.health {
                HealthStatus::Healthy => 0.0,
                HealthStatus::Degraded => 0.5,
                HealthStatus::Unhealthy => 1.0,
            })
            .sum();
        let units = self.ledger.recent_failures(region_id) as f64 + unhealthy;

        (1.0 - self.penalty * units).clamp(0.0, 1.0)
    }

    /// Scores for every registered region.
    pub fn scores(&self) -> HashMap<String, f64> {
        self.regions
            .ids()
            .into_iter()
            .map(|id| {
                let score = self.score(&id);
                (id, score)
            })
            .collect()
    }

    /// The failure ledger feeding this scorer.
    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }
}
