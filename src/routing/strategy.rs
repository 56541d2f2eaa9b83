//! Evaluation of individual routing strategies.
//!
//! Every strategy works on an already-resolved snapshot of regions, health
//! scores and weights, so evaluation never blocks.

use crate::core::Coordinates;
use crate::geo::ClientLocation;
use crate::region::Region;
use crate::routing::geography;
use crate::routing::rule::RuleStrategy;
use rand::{Rng, RngCore};
use std::collections::HashMap;

/// Weight assumed for regions without a configured weight.
pub const DEFAULT_REGION_WEIGHT: f64 = 1.0;

/// State a strategy evaluates against.
pub struct RoutingInputs<'a> {
    /// Resolved client location
    pub location: &'a ClientLocation,
    /// Known regions in registration order
    pub regions: &'a [Region],
    /// Health score per region
    pub scores: &'a HashMap<String, f64>,
    /// Static weight per region
    pub weights: &'a HashMap<String, f64>,
}

impl RoutingInputs<'_> {
    fn score(&self, region_id: &str) -> f64 {
        self.scores.get(region_id).copied().unwrap_or(0.0)
    }

    fn weight(&self, region_id: &str) -> f64 {
        self.weights
            .get(region_id)
            .copied()
            .unwrap_or(DEFAULT_REGION_WEIGHT)
    }

    fn is_known(&self, region_id: &str) -> bool {
        self.regions.iter().any(|r| r.id == region_id)
    }
}

/// Coordinates used for a region's latency estimate.
pub fn region_coordinates(region: &Region) -> Option<Coordinates> {
    region
        .coordinates
        .or_else(|| geography::reference_coordinates(&region.id))
}

impl RuleStrategy {
    /// Pick a target region, or `None` to fall through to the next rule.
    pub fn evaluate(&self, inputs: &RoutingInputs<'_>, rng: &mut dyn RngCore) -> Option<String> {
        match *self {
            RuleStrategy::Geographic { health_threshold } => geographic(inputs, health_threshold),
            RuleStrategy::Latency {
                max_latency_ms,
                health_threshold,
            } => latency(inputs, max_latency_ms, health_threshold),
            RuleStrategy::Health { min_health_score } => healthiest(inputs, min_health_score),
            RuleStrategy::Weighted {
                min_weight,
                max_weight,
            } => {
                let candidates = weighted_candidates(inputs, min_weight, max_weight);
                if candidates.is_empty() {
                    None
                } else {
                    let index = rng.gen_range(0..candidates.len());
                    Some(candidates[index].clone())
                }
            }
        }
    }
}

fn geographic(inputs: &RoutingInputs<'_>, threshold: f64) -> Option<String> {
    let preferred = geography::preferred_region(&inputs.location.country_code)?;
    if inputs.is_known(preferred) && inputs.score(preferred) >= threshold {
        return Some(preferred.to_string());
    }

    geography::FALLBACK_ORDER
        .iter()
        .filter(|id| **id != preferred)
        .find(|id| inputs.is_known(id) && inputs.score(id) >= threshold)
        .map(|id| id.to_string())
}

/// Estimated latency from the client to each region that has coordinates.
pub fn latency_estimates(inputs: &RoutingInputs<'_>) -> Vec<(String, f64)> {
    let client = match inputs.location.coordinates {
        Some(c) => c,
        None => return Vec::new(),
    };

    inputs
        .regions
        .iter()
        .filter_map(|region| {
            region_coordinates(region)
                .map(|coords| (region.id.clone(), geography::estimate_latency_ms(&client, &coords)))
        })
        .collect()
}

fn latency(inputs: &RoutingInputs<'_>, max_latency_ms: f64, threshold: f64) -> Option<String> {
    latency_estimates(inputs)
        .into_iter()
        .filter(|(id, ms)| *ms <= max_latency_ms && inputs.score(id) >= threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(id, _)| id)
}

fn healthiest(inputs: &RoutingInputs<'_>, min_score: f64) -> Option<String> {
    inputs
        .regions
        .iter()
        .map(|r| (r.id.as_str(), inputs.score(&r.id)))
        .filter(|(_, score)| *score >= min_score)
        // Highest score wins; on a tie the smaller id wins.
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(id, _)| id.to_string())
}

/// Regions whose static weight lies within `[min_weight, max_weight]`.
pub fn weighted_candidates(inputs: &RoutingInputs<'_>, min_weight: f64, max_weight: f64) -> Vec<String> {
    inputs
        .regions
        .iter()
        .filter(|r| {
            let w = inputs.weight(&r.id);
            w >= min_weight && w <= max_weight
        })
        .map(|r| r.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct World {
        regions: Vec<Region>,
        scores: HashMap<String, f64>,
        weights: HashMap<String, f64>,
    }

    impl World {
        fn new() -> Self {
            let ids = ["us-east-1", "eu-west-1", "eu-central-1", "ap-northeast-1", "ap-southeast-1"];
            Self {
                regions: ids.iter().map(|id| Region::new(id, id, id)).collect(),
                scores: ids.iter().map(|id| (id.to_string(), 1.0)).collect(),
                weights: HashMap::new(),
            }
        }

        fn score(mut self, id: &str, score: f64) -> Self {
            self.scores.insert(id.to_string(), score);
            self
        }

        fn weight(mut self, id: &str, weight: f64) -> Self {
            self.weights.insert(id.to_string(), weight);
            self
        }

        fn eval(&self, strategy: RuleStrategy, location: &ClientLocation) -> Option<String> {
            let inputs = RoutingInputs {
                location,
                regions: &self.regions,
                scores: &self.scores,
                weights: &self.weights,
            };
            let mut rng = StdRng::seed_from_u64(7);
            strategy.evaluate(&inputs, &mut rng)
        }
    }

    fn berlin() -> ClientLocation {
        ClientLocation::new("DE", 52.52, 13.40)
    }

    #[test]
    fn test_geographic_preferred_region() {
        let world = World::new().score("eu-west-1", 0.0).score("us-east-1", 0.0);
        let result = world.eval(RuleStrategy::Geographic { health_threshold: 0.8 }, &berlin());
        assert_eq!(result.as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_geographic_walks_fallback_order() {
        let world = World::new().score("eu-central-1", 0.5);
        let result = world.eval(RuleStrategy::Geographic { health_threshold: 0.8 }, &berlin());
        assert_eq!(result.as_deref(), Some("us-east-1"));

        let world = World::new().score("eu-central-1", 0.5).score("us-east-1", 0.2);
        let result = world.eval(RuleStrategy::Geographic { health_threshold: 0.8 }, &berlin());
        assert_eq!(result.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_geographic_no_qualifying_region() {
        let mut world = World::new();
        for score in world.scores.values_mut() {
            *score = 0.3;
        }
        assert_eq!(world.eval(RuleStrategy::Geographic { health_threshold: 0.8 }, &berlin()), None);
    }

    #[test]
    fn test_geographic_unmapped_country() {
        let world = World::new();
        let location = ClientLocation::unknown();
        assert_eq!(world.eval(RuleStrategy::Geographic { health_threshold: 0.0 }, &location), None);
    }

    #[test]
    fn test_latency_picks_nearest_healthy() {
        let world = World::new();
        let strategy = RuleStrategy::Latency {
            max_latency_ms: 100.0,
            health_threshold: 0.7,
        };
        assert_eq!(world.eval(strategy.clone(), &berlin()).as_deref(), Some("eu-central-1"));

        let world = World::new().score("eu-central-1", 0.5);
        assert_eq!(world.eval(strategy, &berlin()).as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_latency_result_is_minimum_among_qualifying() {
        let world = World::new().score("eu-central-1", 0.6);
        let location = ClientLocation::new("IN", 19.07, 72.87);
        let strategy = RuleStrategy::Latency {
            max_latency_ms: 1000.0,
            health_threshold: 0.7,
        };
        let chosen = world.eval(strategy, &location).unwrap();

        let inputs = RoutingInputs {
            location: &location,
            regions: &world.regions,
            scores: &world.scores,
            weights: &world.weights,
        };
        let estimates = latency_estimates(&inputs);
        let chosen_ms = estimates.iter().find(|(id, _)| *id == chosen).unwrap().1;
        for (id, ms) in &estimates {
            if world.scores[id] >= 0.7 {
                assert!(chosen_ms <= *ms, "{} ({}) beats {} ({})", id, ms, chosen, chosen_ms);
            }
        }
    }

    #[test]
    fn test_latency_ceiling_and_unknown_location() {
        let world = World::new();
        let strategy = RuleStrategy::Latency {
            max_latency_ms: 1.0,
            health_threshold: 0.0,
        };
        // Nothing within 1ms of Sydney
        let sydney = ClientLocation::new("AU", -33.87, 151.21);
        assert_eq!(world.eval(strategy.clone(), &sydney), None);
        assert_eq!(world.eval(strategy, &ClientLocation::unknown()), None);
    }

    #[test]
    fn test_health_highest_score() {
        let world = World::new()
            .score("us-east-1", 0.95)
            .score("eu-west-1", 0.6)
            .score("eu-central-1", 0.92)
            .score("ap-northeast-1", 0.4)
            .score("ap-southeast-1", 0.3);
        let result = world.eval(RuleStrategy::Health { min_health_score: 0.9 }, &berlin());
        assert_eq!(result.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_health_ties_broken_by_id() {
        let world = World::new();
        let result = world.eval(RuleStrategy::Health { min_health_score: 0.9 }, &berlin());
        assert_eq!(result.as_deref(), Some("ap-northeast-1"));
    }

    #[test]
    fn test_health_below_floor() {
        let mut world = World::new();
        for score in world.scores.values_mut() {
            *score = 0.6;
        }
        assert_eq!(world.eval(RuleStrategy::Health { min_health_score: 0.9 }, &berlin()), None);
    }

    #[test]
    fn test_weighted_result_within_candidate_set() {
        let world = World::new()
            .weight("us-east-1", 0.05)
            .weight("eu-west-1", 0.5)
            .weight("ap-southeast-1", 2.0);
        let location = berlin();
        let inputs = RoutingInputs {
            location: &location,
            regions: &world.regions,
            scores: &world.scores,
            weights: &world.weights,
        };
        let candidates = weighted_candidates(&inputs, 0.1, 1.0);
        assert_eq!(candidates, vec!["eu-west-1", "eu-central-1", "ap-northeast-1"]);

        let strategy = RuleStrategy::Weighted {
            min_weight: 0.1,
            max_weight: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let pick = strategy.evaluate(&inputs, &mut rng).unwrap();
            assert!(candidates.contains(&pick));
            seen.insert(pick);
        }
        assert_eq!(seen.len(), candidates.len());
    }

    #[test]
    fn test_weighted_empty_set() {
        let world = World::new();
        let strategy = RuleStrategy::Weighted {
            min_weight: 5.0,
            max_weight: 10.0,
        };
        assert_eq!(world.eval(strategy, &berlin()), None);
    }
}
