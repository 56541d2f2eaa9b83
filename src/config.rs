//! Router configuration.

use crate::core::{Error, Result};
use crate::geo::GeoConfig;
use crate::health::HealthConfig;
use crate::monitoring::LoggingConfig;
use crate::protection::{CircuitBreakerConfig, RateLimiterConfig};
use crate::routing::{default_rules, prepare_rules, RoutingConfig, RoutingRule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Top-level configuration for a [`GlobalRouter`](crate::router::GlobalRouter).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Region used when no rule matches
    #[serde(default = "default_region")]
    pub default_region: String,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    /// Routing rules, any order
    #[serde(default = "default_rules")]
    pub rules: Vec<RoutingRule>,
    /// Static weights for the weighted strategy
    #[serde(default)]
    pub region_weights: HashMap<String, f64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            geo: GeoConfig::default(),
            routing: RoutingConfig::default(),
            health: HealthConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            rules: default_rules(),
            region_weights: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RouterConfig = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid router config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        info!(path = %path.display(), rules = config.rules.len(), "Loaded router config");
        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.default_region.is_empty() {
            return Err(Error::Configuration("default_region must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.health.failure_penalty) {
            return Err(Error::Configuration(format!(
                "health.failure_penalty must be within [0, 1], got {}",
                self.health.failure_penalty
            )));
        }
        if let Some((id, weight)) = self
            .region_weights
            .iter()
            .find(|(_, w)| w.is_nan() || **w < 0.0)
        {
            return Err(Error::Configuration(format!(
                "region weight for '{}' must be non-negative, got {}",
                id, weight
            )));
        }
        prepare_rules(self.rules.clone()).map(|_| ())
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::LogLevel;
    use crate::routing::RuleStrategy;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.default_region, "us-east-1");
        assert_eq!(config.rules.len(), 4);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.rate_limiter.max_requests, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RouterConfig::from_json_str("{}").unwrap();
        assert_eq!(config.default_region, "us-east-1");
        assert_eq!(config.rules, default_rules());
        assert_eq!(config.geo.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_partial_document() {
        let json = r#"{
            "default_region": "eu-west-1",
            "circuit_breaker": {"failure_threshold": 2},
            "logging": {"level": "warn"},
            "region_weights": {"us-east-1": 0.5},
            "rules": [
                {"id": "health_based", "name": "Health", "priority": 1,
                 "strategy": {"type": "health", "min_health_score": 0.9}}
            ]
        }"#;
        let config = RouterConfig::from_json_str(json).unwrap();
        assert_eq!(config.default_region, "eu-west-1");
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.region_weights["us-east-1"], 0.5);
        assert_eq!(
            config.rules[0].strategy,
            RuleStrategy::Health {
                min_health_score: 0.9
            }
        );
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let json = r#"{"rules": [{"id": "x", "name": "X", "priority": 1,
                                  "strategy": {"type": "random"}}]}"#;
        assert!(matches!(RouterConfig::from_json_str(json), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_weights = r#"{"rules": [{"id": "w", "name": "W", "priority": 1,
            "strategy": {"type": "weighted", "min_weight": 0.9, "max_weight": 0.1}}]}"#;
        assert!(RouterConfig::from_json_str(bad_weights).is_err());

        let bad_penalty = r#"{"health": {"failure_penalty": 3.0}}"#;
        assert!(RouterConfig::from_json_str(bad_penalty).is_err());

        let bad_region_weight = r#"{"region_weights": {"eu-west-1": -1.0}}"#;
        assert!(RouterConfig::from_json_str(bad_region_weight).is_err());
    }

    #[test]
    fn test_json_round_trip_and_file() {
        let config = RouterConfig::default();
        let json = config.to_json().unwrap();

        let path = std::env::temp_dir().join(format!("regiongate-{}.json", uuid::Uuid::new_v4()));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(json.as_bytes())
            .unwrap();
        let loaded = RouterConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.rules, config.rules);
        assert_eq!(loaded.default_region, config.default_region);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RouterConfig::from_json_file("/nonexistent/regiongate.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
