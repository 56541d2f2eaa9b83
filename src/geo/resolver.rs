//! Cached client geo resolution.
//!
//! Lookups that fail, time out or find nothing resolve to the unknown sentinel,
//! which is cached like any other answer.

use crate::cache::TtlCache;
use crate::geo::lookup::{ClientLocation, GeoLookup};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Geo resolver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Timeout for a single external lookup (ms)
    pub lookup_timeout_ms: u64,
    /// Cache entry time-to-live (seconds)
    pub cache_ttl_secs: u64,
    /// Maximum cached addresses
    pub cache_capacity: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2000,
            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
        }
    }
}

/// Resolver mapping client addresses to locations.
pub struct GeoResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: TtlCache<IpAddr, ClientLocation>,
    timeout: Duration,
}

impl GeoResolver {
    /// Create a resolver over a lookup collaborator.
    pub fn new(lookup: Arc<dyn GeoLookup>, config: &GeoConfig) -> Self {
        Self {
            lookup,
            cache: TtlCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_capacity,
            ),
            timeout: Duration::from_millis(config.lookup_timeout_ms),
        }
    }

    /// Resolve an address, never failing.
    pub async fn resolve(&self, address: IpAddr) -> ClientLocation {
        if let Some(location) = self.cache.get(&address) {
            return location;
        }

        let location = match tokio::time::timeout(self.timeout, self.lookup.lookup(address)).await {
            Ok(Ok(Some(location))) => location,
            Ok(Ok(None)) => {
                debug!(%address, "Address not in geo database");
                ClientLocation::unknown()
            }
            Ok(Err(e)) => {
                warn!(%address, error = %e, "Geo lookup failed, using default location");
                ClientLocation::unknown()
            }
            Err(_) => {
                warn!(%address, timeout_ms = self.timeout.as_millis() as u64, "Geo lookup timed out, using default location");
                ClientLocation::unknown()
            }
        };

        self.cache.insert(address, location.clone());
        location
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached addresses.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Cache hits and misses.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hits(), self.cache.misses())
    }
}
