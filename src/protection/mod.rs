//! Protection Module
//!
//! Guards downstream calls per key:
//! - Circuit breaker state machine
//! - Sliding-window rate limiter
//! - Combined admission gate

pub mod circuit_breaker;
pub mod gate;
pub mod rate_limiter;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use gate::{GateDecision, TrafficGate};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
