//! Routing Module
//!
//! Chooses a target region per request:
//! - Prioritized routing rules and their strategies
//! - Static geography tables
//! - Rule-chain engine with a decision cache

pub mod engine;
pub mod geography;
pub mod rule;
pub mod strategy;

pub use engine::{RouteDecision, RoutingConfig, RoutingEngine};
pub use rule::{default_rules, parse_rules, prepare_rules, RoutingRule, RuleStrategy};
pub use strategy::{RoutingInputs, DEFAULT_REGION_WEIGHT};
