//! Routing and traffic metrics.
//!
//! Counters are lock-free; the running response-time mean and the reset
//! instant share one small mutex.

use crate::core::{now, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A counter metric (monotonically increasing until reset).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Why a request was refused at the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    RateLimited,
    CircuitOpen,
}

#[derive(Debug)]
struct Timing {
    samples: u64,
    mean_ms: f64,
    since: Instant,
    since_wall: Timestamp,
}

impl Timing {
    fn new() -> Self {
        Self {
            samples: 0,
            mean_ms: 0.0,
            since: Instant::now(),
            since_wall: now(),
        }
    }
}

/// Point-in-time view of all metrics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running mean response time (ms)
    pub average_response_time_ms: f64,
    pub requests_per_second: f64,
    /// failed / total, 0 when idle
    pub error_rate: f64,
    pub routing_decisions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// hits / (hits + misses), 0 when idle
    pub cache_hit_ratio: f64,
    pub rate_limited: u64,
    pub circuit_open: u64,
    /// Seconds since the last reset
    pub uptime_secs: f64,
    pub since: Option<Timestamp>,
}

/// Aggregates routing and traffic statistics.
#[derive(Debug)]
pub struct MetricsRecorder {
    total_requests: Counter,
    successful_requests: Counter,
    failed_requests: Counter,
    routing_decisions: Counter,
    cache_hits: Counter,
    cache_misses: Counter,
    rate_limited: Counter,
    circuit_open: Counter,
    timing: Mutex<Timing>,
}

impl MetricsRecorder {
    /// Create a recorder starting now.
    pub fn new() -> Self {
        Self {
            total_requests: Counter::new(),
            successful_requests: Counter::new(),
            failed_requests: Counter::new(),
            routing_decisions: Counter::new(),
            cache_hits: Counter::new(),
            cache_misses: Counter::new(),
            rate_limited: Counter::new(),
            circuit_open: Counter::new(),
            timing: Mutex::new(Timing::new()),
        }
    }

    /// Record a completed request.
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.inc();
        if success {
            self.successful_requests.inc();
        } else {
            self.failed_requests.inc();
        }

        let sample = response_time.as_secs_f64() * 1000.0;
        let mut timing = self.timing.lock();
        timing.samples += 1;
        timing.mean_ms += (sample - timing.mean_ms) / timing.samples as f64;
    }

    /// Record a routing decision.
    pub fn record_routing_decision(&self) {
        self.routing_decisions.inc();
    }

    /// Record a routing cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    /// Record a routing cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    /// Record a gate rejection.
    pub fn record_rejection(&self, reason: RejectionReason) {
        match reason {
            RejectionReason::RateLimited => self.rate_limited.inc(),
            RejectionReason::CircuitOpen => self.circuit_open.inc(),
        }
    }

    /// Take a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Take a snapshot with rates computed at `now`.
    pub fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let (mean_ms, uptime, since) = {
            let timing = self.timing.lock();
            (
                timing.mean_ms,
                now.saturating_duration_since(timing.since).as_secs_f64(),
                timing.since_wall,
            )
        };

        let total = self.total_requests.get();
        let failed = self.failed_requests.get();
        let hits = self.cache_hits.get();
        let misses = self.cache_misses.get();

        MetricsSnapshot {
            total_requests: total,
            successful_requests: self.successful_requests.get(),
            failed_requests: failed,
            average_response_time_ms: mean_ms,
            requests_per_second: ratio(total as f64, uptime),
            error_rate: ratio(failed as f64, total as f64),
            routing_decisions: self.routing_decisions.get(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_ratio: ratio(hits as f64, (hits + misses) as f64),
            rate_limited: self.rate_limited.get(),
            circuit_open: self.circuit_open.get(),
            uptime_secs: uptime,
            since: Some(since),
        }
    }

    /// Zero every counter and restart the rate clock.
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.successful_requests,
            &self.failed_requests,
            &self.routing_decisions,
            &self.cache_hits,
            &self.cache_misses,
            &self.rate_limited,
            &self.circuit_open,
        ] {
            counter.reset();
        }
        *self.timing.lock() = Timing::new();
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();

        let counters = [
            ("regiongate_requests_total", "Total requests", s.total_requests),
            ("regiongate_requests_successful_total", "Successful requests", s.successful_requests),
            ("regiongate_requests_failed_total", "Failed requests", s.failed_requests),
            ("regiongate_routing_decisions_total", "Routing decisions", s.routing_decisions),
            ("regiongate_routing_cache_hits_total", "Routing cache hits", s.cache_hits),
            ("regiongate_routing_cache_misses_total", "Routing cache misses", s.cache_misses),
            ("regiongate_rate_limited_total", "Requests refused by the rate limiter", s.rate_limited),
            ("regiongate_circuit_open_total", "Requests refused by an open circuit", s.circuit_open),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        let gauges = [
            ("regiongate_response_time_ms", "Mean response time", s.average_response_time_ms),
            ("regiongate_requests_per_second", "Request rate since reset", s.requests_per_second),
            ("regiongate_error_rate", "Failed share of requests", s.error_rate),
            ("regiongate_routing_cache_hit_ratio", "Routing cache hit ratio", s.cache_hit_ratio),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
