//! Combined admission gate: circuit breaker first, then rate limiter.

use crate::core::{Error, Result};
use crate::monitoring::{MetricsRecorder, RejectionReason};
use crate::protection::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::protection::rate_limiter::{RateLimiter, RateLimiterConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    RateLimited,
    CircuitOpen,
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        self == GateDecision::Allowed
    }

    /// Convert a rejection into its error.
    pub fn into_result(self, key: &str) -> Result<()> {
        match self {
            GateDecision::Allowed => Ok(()),
            GateDecision::RateLimited => Err(Error::RateLimitExceeded(key.to_string())),
            GateDecision::CircuitOpen => Err(Error::CircuitOpen(key.to_string())),
        }
    }
}

/// Gates traffic per key and feeds outcomes back to the breaker.
pub struct TrafficGate {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    metrics: Arc<MetricsRecorder>,
}

impl TrafficGate {
    pub fn new(
        breaker: &CircuitBreakerConfig,
        limiter: &RateLimiterConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new(breaker.clone()),
            limiter: RateLimiter::new(limiter),
            metrics,
        }
    }

    /// Check whether a request for `key` may be dispatched.
    pub fn allow_request(&self, key: &str) -> GateDecision {
        self.allow_request_at(key, Instant::now())
    }

    /// Check whether a request for `key` may be dispatched at `now`.
    pub fn allow_request_at(&self, key: &str, now: Instant) -> GateDecision {
        if !self.breaker.allow_at(key, now) {
            debug!(key, "Request rejected: circuit open");
            self.metrics.record_rejection(RejectionReason::CircuitOpen);
            return GateDecision::CircuitOpen;
        }

        if !self.limiter.allow_at(key, now) {
            // Refused requests never use the half-open probe.
            self.breaker.cancel_probe(key);
            self.metrics.record_rejection(RejectionReason::RateLimited);
            return GateDecision::RateLimited;
        }

        GateDecision::Allowed
    }

    /// Report the outcome of a dispatched request.
    pub fn record_outcome(&self, key: &str, success: bool, latency: Duration) {
        self.record_outcome_at(key, success, latency, Instant::now())
    }

    /// Report the outcome of a dispatched request at `now`.
    pub fn record_outcome_at(&self, key: &str, success: bool, latency: Duration, now: Instant) {
        if success {
            self.breaker.record_success(key);
        } else {
            self.breaker.record_failure_at(key, now);
        }
        self.metrics.record_request(success, latency);
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
