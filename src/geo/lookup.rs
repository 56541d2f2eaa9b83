//! Geo-IP lookup collaborator.

use crate::core::{now, Coordinates, Result, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Country code used for addresses that could not be resolved.
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Approximate geographic location of a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientLocation {
    /// ISO 3166-1 alpha-2 country code, `XX` when unknown
    pub country_code: String,
    /// Coordinates, absent when unknown
    pub coordinates: Option<Coordinates>,
    /// When the location was resolved
    pub resolved_at: Timestamp,
}

impl ClientLocation {
    /// Create a resolved location.
    pub fn new(country_code: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            country_code: country_code.to_ascii_uppercase(),
            coordinates: Some(Coordinates::new(latitude, longitude)),
            resolved_at: now(),
        }
    }

    /// The "unknown" sentinel used for unresolvable addresses.
    pub fn unknown() -> Self {
        Self {
            country_code: UNKNOWN_COUNTRY.to_string(),
            coordinates: None,
            resolved_at: now(),
        }
    }

    /// Check if this is the unknown sentinel.
    pub fn is_unknown(&self) -> bool {
        self.country_code == UNKNOWN_COUNTRY
    }
}

/// External geo-IP database.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Look up an address. `Ok(None)` means the address is not in the database.
    async fn lookup(&self, address: IpAddr) -> Result<Option<ClientLocation>>;
}

/// In-memory geo database.
#[derive(Default)]
pub struct StaticGeoLookup {
    locations: RwLock<HashMap<IpAddr, ClientLocation>>,
}

impl StaticGeoLookup {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known address.
    pub fn add_location(&self, address: IpAddr, location: ClientLocation) {
        self.locations.write().insert(address, location);
    }

    /// Builder form of [`add_location`](Self::add_location).
    pub fn with_location(self, address: IpAddr, location: ClientLocation) -> Self {
        self.add_location(address, location);
        self
    }
}

#[async_trait]
impl GeoLookup for StaticGeoLookup {
    async fn lookup(&self, address: IpAddr) -> Result<Option<ClientLocation>> {
        Ok(self.locations.read().get(&address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sentinel() {
        let loc = ClientLocation::unknown();
        assert!(loc.is_unknown());
        assert!(loc.coordinates.is_none());
    }

    #[test]
    fn test_country_code_normalized() {
        let loc = ClientLocation::new("de", 52.52, 13.40);
        assert_eq!(loc.country_code, "DE");
        assert!(!loc.is_unknown());
    }

    #[tokio::test]
    async fn test_static_lookup() {
        let addr: IpAddr = "203.0.113.7".parse().unwrap();
        let db = StaticGeoLookup::new().with_location(addr, ClientLocation::new("JP", 35.68, 139.69));

        assert_eq!(db.lookup(addr).await.unwrap().unwrap().country_code, "JP");
        let other: IpAddr = "198.51.100.1".parse().unwrap();
        assert!(db.lookup(other).await.unwrap().is_none());
    }
}
