//! Per-key circuit breaker.
//!
//! ## States
//!
//! - **Closed**: requests pass, consecutive failures are counted
//! - **Open**: requests are rejected until `recovery_timeout` has passed
//!   since the last failure
//! - **HalfOpen**: a single probe request is allowed; its outcome closes or
//!   reopens the circuit
//!
//! Each key has its own lock, so keys never contend with each other. The map
//! guard is held while a key's lock is taken, so `reset` never races a caller
//! into a detached state.

use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing, requests are rejected
    Open,
    /// Testing recovery with one probe
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Seconds after the last failure before a probe is allowed
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

/// Point-in-time view of one key's breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Requests rejected since the key was created or reset
    pub rejected: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    rejected: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_in_flight: false,
            rejected: 0,
        }
    }

    fn transition(&mut self, key: &str, to: CircuitState) {
        if self.state == to {
            return;
        }
        match to {
            CircuitState::Open => warn!(
                key,
                from = %self.state,
                failures = self.failure_count,
                "Circuit opened"
            ),
            _ => info!(key, from = %self.state, to = %to, "Circuit breaker transition"),
        }
        self.state = to;
        self.probe_in_flight = false;
    }
}

/// Circuit breakers keyed by `service:region` style strings.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a breaker set. A zero threshold is treated as one.
    pub fn new(mut config: CircuitBreakerConfig) -> Self {
        config.failure_threshold = config.failure_threshold.max(1);
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn entry(&self, key: &str) -> Ref<'_, String, Mutex<BreakerState>> {
        if let Some(state) = self.breakers.get(key) {
            return state;
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(BreakerState::new()))
            .downgrade()
    }

    /// Whether a request for `key` may proceed.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Whether a request for `key` may proceed at `now`.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let entry = self.entry(key);
        let mut breaker = entry.lock();

        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = breaker
                    .last_failure
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.config.recovery_timeout());
                if recovered {
                    breaker.transition(key, CircuitState::HalfOpen);
                    breaker.probe_in_flight = true;
                    true
                } else {
                    breaker.rejected += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if breaker.probe_in_flight {
                    breaker.rejected += 1;
                    false
                } else {
                    breaker.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a failed call for `key`.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now())
    }

    /// Record a failed call for `key` at `now`.
    pub fn record_failure_at(&self, key: &str, now: Instant) {
        let entry = self.entry(key);
        let mut breaker = entry.lock();

        breaker.failure_count = breaker.failure_count.saturating_add(1);
        breaker.last_failure = Some(now);

        match breaker.state {
            CircuitState::Closed => {
                if breaker.failure_count >= self.config.failure_threshold {
                    breaker.transition(key, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => breaker.transition(key, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Record a successful call for `key`.
    pub fn record_success(&self, key: &str) {
        let entry = match self.breakers.get(key) {
            Some(entry) => entry,
            None => return,
        };
        let mut breaker = entry.lock();

        match breaker.state {
            CircuitState::Closed => breaker.failure_count = 0,
            CircuitState::HalfOpen => {
                breaker.transition(key, CircuitState::Closed);
                breaker.failure_count = 0;
                breaker.last_failure = None;
            }
            // Late success from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    /// Give back a half-open probe slot that was never used.
    pub fn cancel_probe(&self, key: &str) {
        if let Some(entry) = self.breakers.get(key) {
            let mut breaker = entry.lock();
            if breaker.state == CircuitState::HalfOpen && breaker.probe_in_flight {
                breaker.probe_in_flight = false;
                debug!(key, "Half-open probe released");
            }
        }
    }

    /// Stored state of `key`. Unknown keys are closed.
    ///
    /// The Open to HalfOpen move happens on the next `allow`.
    pub fn state(&self, key: &str) -> CircuitState {
        self.breakers
            .get(key)
            .map(|entry| entry.lock().state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Forget all state for `key`. Returns whether it existed.
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.breakers.remove(key).is_some();
        if removed {
            info!(key, "Circuit breaker reset");
        }
        removed
    }

    /// Snapshot of every key, sorted by key.
    pub fn stats(&self) -> Vec<BreakerSnapshot> {
        let mut stats: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| {
                let breaker = entry.value().lock();
                BreakerSnapshot {
                    key: entry.key().clone(),
                    state: breaker.state,
                    failure_count: breaker.failure_count,
                    rejected: breaker.rejected,
                }
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// Keys currently open.
    pub fn open_circuits(&self) -> Vec<String> {
        self.stats()
            .into_iter()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.key)
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
