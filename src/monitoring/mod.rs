//! Monitoring Module
//!
//! Provides observability for regiongate:
//! - Routing and traffic metrics
//! - Logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogLevel, LoggingConfig};
pub use metrics::{Counter, MetricsRecorder, MetricsSnapshot, RejectionReason};
