//! Rule-driven region selection.
//!
//! For each request the engine resolves the client location, walks the active
//! rules in priority order and returns the first region a rule produces. When
//! no rule matches, the configured default region is returned. Rule-produced
//! decisions are cached per (address, request context). Reloading rules or
//! clearing the cache bumps a generation counter; a decision evaluated under
//! an older generation is returned but never cached.

use crate::cache::TtlCache;
use crate::core::{RequestContext, Result};
use crate::geo::{ClientLocation, GeoResolver};
use crate::health::HealthScorer;
use crate::monitoring::MetricsRecorder;
use crate::region::RegionRegistry;
use crate::routing::rule::{prepare_rules, RoutingRule};
use crate::routing::strategy::RoutingInputs;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Routing engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Decision cache entry time-to-live (seconds)
    pub decision_cache_ttl_secs: u64,
    /// Maximum cached decisions
    pub decision_cache_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            decision_cache_ttl_secs: 300,
            decision_cache_capacity: 10_000,
        }
    }
}

/// Outcome of a routing decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Target region
    pub region_id: String,
    /// Rule that produced the region, `None` for the default region
    pub rule_id: Option<String>,
    /// Served from the decision cache
    pub cached: bool,
}

type DecisionKey = (IpAddr, u64);

/// Evaluates the routing rule chain.
pub struct RoutingEngine {
    regions: Arc<RegionRegistry>,
    scorer: Arc<HealthScorer>,
    geo: Arc<GeoResolver>,
    metrics: Arc<MetricsRecorder>,
    rules: RwLock<Arc<Vec<RoutingRule>>>,
    weights: RwLock<HashMap<String, f64>>,
    default_region: String,
    cache: TtlCache<DecisionKey, RouteDecision>,
    generation: AtomicU64,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RoutingEngine {
    /// Create an engine. Fails if the rule set is invalid.
    pub fn new(
        regions: Arc<RegionRegistry>,
        scorer: Arc<HealthScorer>,
        geo: Arc<GeoResolver>,
        metrics: Arc<MetricsRecorder>,
        rules: Vec<RoutingRule>,
        default_region: &str,
        config: &RoutingConfig,
    ) -> Result<Self> {
        let rules = prepare_rules(rules)?;
        info!(rules = rules.len(), default_region, "Routing engine configured");

        Ok(Self {
            regions,
            scorer,
            geo,
            metrics,
            rules: RwLock::new(Arc::new(rules)),
            weights: RwLock::new(HashMap::new()),
            default_region: default_region.to_string(),
            cache: TtlCache::new(
                Duration::from_secs(config.decision_cache_ttl_secs),
                config.decision_cache_capacity,
            ),
            generation: AtomicU64::new(0),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        })
    }

    /// Replace the random source used by the weighted strategy.
    pub fn with_rng(self, rng: Box<dyn RngCore + Send>) -> Self {
        *self.rng.lock() = rng;
        self
    }

    /// Pick a target region for a request.
    pub async fn route(&self, address: IpAddr, context: &RequestContext) -> String {
        self.decide(address, context).await.region_id
    }

    /// Pick a target region, reporting which rule chose it.
    pub async fn decide(&self, address: IpAddr, context: &RequestContext) -> RouteDecision {
        let key = (address, context.stable_hash());
        self.metrics.record_routing_decision();

        if let Some(mut decision) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            decision.cached = true;
            return decision;
        }
        self.metrics.record_cache_miss();

        let generation = self.generation.load(Ordering::Acquire);
        let location = self.geo.resolve(address).await;
        let decision = self.evaluate(&location);

        debug!(
            %address,
            context = %context.fingerprint(),
            country = %location.country_code,
            region = %decision.region_id,
            rule = ?decision.rule_id,
            "Routing decision"
        );

        if decision.rule_id.is_some() {
            self.store(key, &decision, generation);
        }
        decision
    }

    /// Cache `decision` if nothing was invalidated since `generation` was read.
    fn store(&self, key: DecisionKey, decision: &RouteDecision, generation: u64) -> bool {
        // Invalidation holds the write lock, so check and insert cannot straddle it.
        let _rules = self.rules.read();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(region = %decision.region_id, "Discarding decision from before invalidation");
            return false;
        }
        self.cache.insert(key, decision.clone());
        true
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        self.cache.clear();
    }

    /// Evaluate the rule chain for a resolved location.
    pub fn evaluate(&self, location: &ClientLocation) -> RouteDecision {
        let rules = self.rules.read().clone();
        let regions = self.regions.list();
        let scores = self.scorer.scores();
        let weights = self.weights.read().clone();

        let inputs = RoutingInputs {
            location,
            regions: &regions,
            scores: &scores,
            weights: &weights,
        };

        for rule in rules.iter().filter(|r| r.active) {
            let result = {
                let mut rng = self.rng.lock();
                rule.strategy.evaluate(&inputs, &mut **rng)
            };

            match result {
                Some(region_id) => {
                    return RouteDecision {
                        region_id,
                        rule_id: Some(rule.id.clone()),
                        cached: false,
                    };
                }
                None => {
                    debug!(
                        rule = %rule.id,
                        strategy = rule.strategy.name(),
                        fallback_actions = ?rule.fallback_actions,
                        "Routing rule produced no region"
                    );
                }
            }
        }

        RouteDecision {
            region_id: self.default_region.clone(),
            rule_id: None,
            cached: false,
        }
    }

    /// Swap in a new rule set and drop cached decisions.
    pub fn reload_rules(&self, rules: Vec<RoutingRule>) -> Result<()> {
        let rules = prepare_rules(rules)?;
        info!(rules = rules.len(), "Routing rules reloaded");
        let mut current = self.rules.write();
        *current = Arc::new(rules);
        self.invalidate();
        Ok(())
    }

    /// Current rules in evaluation order.
    pub fn rules(&self) -> Vec<RoutingRule> {
        self.rules.read().as_ref().clone()
    }

    /// Set the static weight of a region.
    pub fn set_region_weight(&self, region_id: &str, weight: f64) {
        self.weights.write().insert(region_id.to_string(), weight);
    }

    /// The region used when no rule matches.
    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Drop all cached decisions, including any still being evaluated.
    pub fn clear_cache(&self) {
        let _rules = self.rules.write();
        self.invalidate();
    }

    /// Drop expired cached decisions.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoConfig, StaticGeoLookup};
    use crate::health::FailureLedger;
    use crate::region::{DeploymentTracker, Region, RegionStatus};
    use crate::routing::rule::{default_rules, RuleStrategy};

    struct Fixture {
        regions: Arc<RegionRegistry>,
        ledger: Arc<FailureLedger>,
        metrics: Arc<MetricsRecorder>,
        engine: RoutingEngine,
    }

    fn berlin_ip() -> IpAddr {
        "203.0.113.1".parse().unwrap()
    }

    fn tokyo_ip() -> IpAddr {
        "203.0.113.2".parse().unwrap()
    }

    fn unknown_ip() -> IpAddr {
        "198.51.100.99".parse().unwrap()
    }

    fn fixture(rules: Vec<RoutingRule>) -> Fixture {
        let regions = Arc::new(RegionRegistry::new());
        for id in ["us-east-1", "eu-west-1", "eu-central-1", "ap-northeast-1"] {
            regions.register(Region::new(id, id, id)).unwrap();
        }
        let deployments = Arc::new(DeploymentTracker::new(regions.clone()));
        let ledger = Arc::new(FailureLedger::new(Duration::from_secs(300)));
        let scorer = Arc::new(HealthScorer::new(
            regions.clone(),
            deployments,
            ledger.clone(),
            0.2,
        ));

        let lookup = StaticGeoLookup::new()
            .with_location(berlin_ip(), ClientLocation::new("DE", 52.52, 13.40))
            .with_location(tokyo_ip(), ClientLocation::new("JP", 35.68, 139.69));
        let geo = Arc::new(GeoResolver::new(Arc::new(lookup), &GeoConfig::default()));
        let metrics = Arc::new(MetricsRecorder::new());

        let engine = RoutingEngine::new(
            regions.clone(),
            scorer,
            geo,
            metrics.clone(),
            rules,
            "us-east-1",
            &RoutingConfig::default(),
        )
        .unwrap()
        .with_rng(Box::new(StdRng::seed_from_u64(1)));

        Fixture {
            regions,
            ledger,
            metrics,
            engine,
        }
    }

    /// Drive a region's score down to 1 - 0.2 * failures.
    fn fail(f: &Fixture, region_id: &str, failures: usize) {
        for _ in 0..failures {
            f.ledger.record_failure(region_id);
        }
    }

    #[tokio::test]
    async fn test_geographic_first() {
        let f = fixture(default_rules());
        let decision = f.engine.decide(berlin_ip(), &RequestContext::new()).await;
        assert_eq!(decision.region_id, "eu-central-1");
        assert_eq!(decision.rule_id.as_deref(), Some("geographic_routing"));

        let region = f.engine.route(tokyo_ip(), &RequestContext::new()).await;
        assert_eq!(region, "ap-northeast-1");
    }

    #[tokio::test]
    async fn test_geographic_ignores_other_regions() {
        let f = fixture(default_rules());
        f.regions.set_status("us-east-1", RegionStatus::Failed).unwrap();
        f.regions.set_status("eu-west-1", RegionStatus::Failed).unwrap();
        fail(&f, "ap-northeast-1", 5);

        let region = f.engine.route(berlin_ip(), &RequestContext::new()).await;
        assert_eq!(region, "eu-central-1");
    }

    #[tokio::test]
    async fn test_health_rule_falls_through_to_default() {
        let rules = vec![RoutingRule::new(
            "health_based",
            "Health Based Routing",
            RuleStrategy::Health {
                min_health_score: 0.9,
            },
            1,
        )];
        let f = fixture(rules);
        // eu-west-1 at 0.6, everything else out of service
        fail(&f, "eu-west-1", 2);
        for id in ["us-east-1", "eu-central-1", "ap-northeast-1"] {
            f.regions.set_status(id, RegionStatus::Failed).unwrap();
        }

        let decision = f.engine.decide(berlin_ip(), &RequestContext::new()).await;
        assert_eq!(decision.region_id, "us-east-1");
        assert_eq!(decision.rule_id, None);
    }

    #[tokio::test]
    async fn test_unknown_address_routes_by_later_rules() {
        let f = fixture(default_rules());
        // Geographic and latency both need a resolved location.
        let decision = f.engine.decide(unknown_ip(), &RequestContext::new()).await;
        assert_eq!(decision.rule_id.as_deref(), Some("health_based"));
        assert_eq!(decision.region_id, "ap-northeast-1");
    }

    #[tokio::test]
    async fn test_inactive_rules_skipped() {
        let rules = vec![
            RoutingRule::new(
                "geo",
                "Geo",
                RuleStrategy::Geographic {
                    health_threshold: 0.8,
                },
                1,
            )
            .inactive(),
            RoutingRule::new(
                "lat",
                "Latency",
                RuleStrategy::Latency {
                    max_latency_ms: 50.0,
                    health_threshold: 0.7,
                },
                2,
            ),
        ];
        let f = fixture(rules);
        let decision = f.engine.decide(berlin_ip(), &RequestContext::new()).await;
        assert_eq!(decision.rule_id.as_deref(), Some("lat"));
        assert_eq!(decision.region_id, "eu-central-1");
    }

    #[tokio::test]
    async fn test_decisions_cached() {
        let f = fixture(default_rules());
        let ctx = RequestContext::new().with("service", "trading");

        let first = f.engine.decide(berlin_ip(), &ctx).await;
        assert!(!first.cached);
        // A direct status write is not visible until the decision expires or the cache is cleared.
        f.regions.set_status("eu-central-1", RegionStatus::Failed).unwrap();
        let second = f.engine.decide(berlin_ip(), &ctx).await;
        assert!(second.cached);
        assert_eq!(second.region_id, first.region_id);

        // A different context is a different cache key.
        let other = f
            .engine
            .decide(berlin_ip(), &RequestContext::new().with("service", "market-data"))
            .await;
        assert_eq!(other.region_id, "us-east-1");

        let s = f.metrics.snapshot();
        assert_eq!(s.routing_decisions, 3);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.cache_misses, 2);
    }

    #[tokio::test]
    async fn test_default_not_cached() {
        let f = fixture(vec![]);
        f.engine.route(berlin_ip(), &RequestContext::new()).await;
        f.engine.route(berlin_ip(), &RequestContext::new()).await;
        assert_eq!(f.metrics.snapshot().cache_hits, 0);
    }

    #[tokio::test]
    async fn test_weighted_within_candidates() {
        let rules = vec![RoutingRule::new(
            "weighted",
            "Weighted",
            RuleStrategy::Weighted {
                min_weight: 0.5,
                max_weight: 1.0,
            },
            1,
        )];
        let f = fixture(rules);
        f.engine.set_region_weight("us-east-1", 0.1);
        f.engine.set_region_weight("ap-northeast-1", 3.0);

        let location = ClientLocation::new("DE", 52.52, 13.40);
        for _ in 0..50 {
            let decision = f.engine.evaluate(&location);
            assert!(
                ["eu-west-1", "eu-central-1"].contains(&decision.region_id.as_str()),
                "{}",
                decision.region_id
            );
        }
    }

    #[tokio::test]
    async fn test_reload_rules_clears_cache() {
        let f = fixture(default_rules());
        f.engine.route(berlin_ip(), &RequestContext::new()).await;

        f.engine.reload_rules(vec![]).unwrap();
        let decision = f.engine.decide(berlin_ip(), &RequestContext::new()).await;
        assert!(!decision.cached);
        assert_eq!(decision.region_id, "us-east-1");
        assert!(f.engine.rules().is_empty());
    }

    #[tokio::test]
    async fn test_decision_from_before_reload_not_cached() {
        let f = fixture(default_rules());
        let key = (berlin_ip(), RequestContext::new().stable_hash());
        let generation = f.engine.generation.load(Ordering::Acquire);
        let stale = f.engine.evaluate(&ClientLocation::new("DE", 52.52, 13.40));
        assert_eq!(stale.rule_id.as_deref(), Some("geographic_routing"));

        f.engine.reload_rules(vec![]).unwrap();
        assert!(!f.engine.store(key, &stale, generation));
        assert!(f.engine.cache.is_empty());

        let decision = f.engine.decide(berlin_ip(), &RequestContext::new()).await;
        assert!(!decision.cached);
        assert_eq!(decision.region_id, "us-east-1");
    }

    #[tokio::test]
    async fn test_clear_cache_discards_in_flight_decision() {
        let f = fixture(default_rules());
        let key = (berlin_ip(), RequestContext::new().stable_hash());
        let generation = f.engine.generation.load(Ordering::Acquire);
        let decision = f.engine.evaluate(&ClientLocation::new("DE", 52.52, 13.40));

        f.engine.clear_cache();
        assert!(!f.engine.store(key, &decision, generation));

        let current = f.engine.generation.load(Ordering::Acquire);
        assert!(f.engine.store(key, &decision, current));
        assert!(f.engine.decide(berlin_ip(), &RequestContext::new()).await.cached);
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_rules() {
        let f = fixture(default_rules());
        let bad = vec![RoutingRule::new(
            "bad",
            "Bad",
            RuleStrategy::Health {
                min_health_score: 7.0,
            },
            1,
        )];
        assert!(f.engine.reload_rules(bad).is_err());
        assert_eq!(f.engine.rules().len(), 4);
    }
}
