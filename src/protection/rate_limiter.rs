//! Per-key sliding-window rate limiting.
//!
//! A key's window is only locked while its map guard is held, so `reset` and
//! `purge_idle` cannot remove a window that an admit is about to record into.

use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length (seconds)
    pub window_secs: u64,
}

impl RateLimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

type Window = Mutex<VecDeque<Instant>>;

/// Admits at most `max_requests` per key within any window.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Create a limiter.
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            max_requests: config.max_requests as usize,
            window: config.window(),
            windows: DashMap::new(),
        }
    }

    fn window_for(&self, key: &str) -> Ref<'_, String, Window> {
        if let Some(window) = self.windows.get(key) {
            return window;
        }
        self.windows
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .downgrade()
    }

    fn purge(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a request for `key` if the window has room.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Admit a request for `key` at `now` if the window has room.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let window = self.window_for(key);
        let mut admitted = window.lock();

        self.purge(&mut admitted, now);
        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            debug!(key, limit = self.max_requests, "Rate limit reached");
            false
        }
    }

    /// Requests `key` could still make at `now`.
    pub fn remaining_at(&self, key: &str, now: Instant) -> usize {
        match self.windows.get(key) {
            Some(window) => {
                let mut admitted = window.lock();
                self.purge(&mut admitted, now);
                self.max_requests.saturating_sub(admitted.len())
            }
            None => self.max_requests,
        }
    }

    /// Forget the window for `key`.
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Drop keys with nothing left in their window. Returns how many.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            let mut admitted = window.lock();
            self.purge(&mut admitted, now);
            !admitted.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimiterConfig::default())
    }
}
