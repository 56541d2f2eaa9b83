//! Routing rule definitions and loading.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Strategy a rule applies, with its condition bag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleStrategy {
    /// Country-preferred region, then the fixed fallback list
    Geographic { health_threshold: f64 },
    /// Lowest estimated latency among healthy regions under a ceiling
    Latency {
        max_latency_ms: f64,
        health_threshold: f64,
    },
    /// Healthiest region above a floor
    Health { min_health_score: f64 },
    /// Uniform pick among regions whose static weight is in range
    Weighted { min_weight: f64, max_weight: f64 },
}

impl RuleStrategy {
    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            RuleStrategy::Geographic { .. } => "geographic",
            RuleStrategy::Latency { .. } => "latency",
            RuleStrategy::Health { .. } => "health",
            RuleStrategy::Weighted { .. } => "weighted",
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{} must be within [0, 1], got {}", name, v))
            }
        };

        match *self {
            RuleStrategy::Geographic { health_threshold } => unit("health_threshold", health_threshold),
            RuleStrategy::Latency {
                max_latency_ms,
                health_threshold,
            } => {
                if max_latency_ms.is_nan() || max_latency_ms < 0.0 {
                    return Err(format!("max_latency_ms must be non-negative, got {}", max_latency_ms));
                }
                unit("health_threshold", health_threshold)
            }
            RuleStrategy::Health { min_health_score } => unit("min_health_score", min_health_score),
            RuleStrategy::Weighted {
                min_weight,
                max_weight,
            } => {
                if min_weight.is_nan() || max_weight.is_nan() || min_weight > max_weight {
                    return Err(format!(
                        "min_weight ({}) must not exceed max_weight ({})",
                        min_weight, max_weight
                    ));
                }
                Ok(())
            }
        }
    }
}

fn default_active() -> bool {
    true
}

/// A prioritized routing policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Rule ID
    pub id: String,
    /// Rule name
    pub name: String,
    /// Strategy and conditions
    pub strategy: RuleStrategy,
    /// Actions to take when the rule yields nothing (logged only)
    #[serde(default)]
    pub fallback_actions: Vec<String>,
    /// Lower values are evaluated first
    pub priority: i32,
    /// Inactive rules are skipped
    #[serde(default = "default_active")]
    pub active: bool,
}

impl RoutingRule {
    /// Create an active rule.
    pub fn new(id: &str, name: &str, strategy: RuleStrategy, priority: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            strategy,
            fallback_actions: Vec::new(),
            priority,
            active: true,
        }
    }

    /// Add a fallback action.
    pub fn with_fallback(mut self, action: &str) -> Self {
        self.fallback_actions.push(action.to_string());
        self
    }

    /// Mark inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check the rule's conditions are well formed.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Configuration("routing rule with empty id".to_string()));
        }
        self.strategy
            .validate()
            .map_err(|msg| Error::Configuration(format!("rule '{}': {}", self.id, msg)))
    }
}

/// Validate rules and put them in evaluation order (priority, then id).
pub fn prepare_rules(mut rules: Vec<RoutingRule>) -> Result<Vec<RoutingRule>> {
    let mut seen = HashSet::new();
    for rule in &rules {
        rule.validate()?;
        if !seen.insert(rule.id.as_str()) {
            return Err(Error::Configuration(format!("duplicate routing rule id '{}'", rule.id)));
        }
    }
    rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    Ok(rules)
}

/// Parse a JSON array of rules.
pub fn parse_rules(json: &str) -> Result<Vec<RoutingRule>> {
    let rules: Vec<RoutingRule> = serde_json::from_str(json)
        .map_err(|e| Error::Configuration(format!("invalid routing rules: {}", e)))?;
    prepare_rules(rules)
}

/// The standard four-rule chain.
pub fn default_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule::new(
            "geographic_routing",
            "Geographic Routing",
            RuleStrategy::Geographic {
                health_threshold: 0.8,
            },
            1,
        )
        .with_fallback("nearest_healthy_region"),
        RoutingRule::new(
            "latency_based",
            "Latency Based Routing",
            RuleStrategy::Latency {
                max_latency_ms: 100.0,
                health_threshold: 0.7,
            },
            2,
        )
        .with_fallback("geographic_routing"),
        RoutingRule::new(
            "health_based",
            "Health Based Routing",
            RuleStrategy::Health {
                min_health_score: 0.9,
            },
            3,
        )
        .with_fallback("any_healthy_region"),
        RoutingRule::new(
            "weighted_routing",
            "Weighted Routing",
            RuleStrategy::Weighted {
                min_weight: 0.1,
                max_weight: 1.0,
            },
            4,
        )
        .with_fallback("round_robin"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let json = r#"[
            {"id": "b", "name": "Health", "priority": 2,
             "strategy": {"type": "health", "min_health_score": 0.9}},
            {"id": "a", "name": "Geo", "priority": 1, "fallback_actions": ["nearest"],
             "strategy": {"type": "geographic", "health_threshold": 0.8}}
        ]"#;
        let rules = parse_rules(json).unwrap();
        assert_eq!(rules[0].id, "a");
        assert_eq!(rules[0].fallback_actions, vec!["nearest"]);
        assert!(rules[1].active);
        assert_eq!(
            rules[1].strategy,
            RuleStrategy::Health {
                min_health_score: 0.9
            }
        );
    }

    #[test]
    fn test_unknown_strategy_is_configuration_error() {
        let json = r#"[{"id": "x", "name": "X", "priority": 1,
                        "strategy": {"type": "round_robin"}}]"#;
        assert!(matches!(parse_rules(json), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_conditions_rejected() {
        let weights = RoutingRule::new(
            "w",
            "W",
            RuleStrategy::Weighted {
                min_weight: 2.0,
                max_weight: 1.0,
            },
            1,
        );
        assert!(matches!(weights.validate(), Err(Error::Configuration(_))));

        let health = RoutingRule::new("h", "H", RuleStrategy::Health { min_health_score: 1.5 }, 1);
        assert!(health.validate().is_err());
    }

    #[test]
    fn test_priority_ties_broken_by_id() {
        let rules = prepare_rules(vec![
            RoutingRule::new("zeta", "Z", RuleStrategy::Health { min_health_score: 0.5 }, 1),
            RoutingRule::new("alpha", "A", RuleStrategy::Health { min_health_score: 0.5 }, 1),
            RoutingRule::new("first", "F", RuleStrategy::Health { min_health_score: 0.5 }, 0),
        ])
        .unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "alpha", "zeta"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = prepare_rules(vec![
            RoutingRule::new("dup", "A", RuleStrategy::Health { min_health_score: 0.5 }, 1),
            RoutingRule::new("dup", "B", RuleStrategy::Health { min_health_score: 0.5 }, 2),
        ]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_default_rules_valid() {
        let rules = prepare_rules(default_rules()).unwrap();
        let names: Vec<&str> = rules.iter().map(|r| r.strategy.name()).collect();
        assert_eq!(names, vec!["geographic", "latency", "health", "weighted"]);
    }
}
