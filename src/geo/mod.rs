//! Geo Module
//!
//! Resolves client addresses to approximate locations:
//! - Geo-IP lookup collaborator
//! - Cached resolver with default fallback

pub mod lookup;
pub mod resolver;

pub use lookup::{ClientLocation, GeoLookup, StaticGeoLookup, UNKNOWN_COUNTRY};
pub use resolver::{GeoConfig, GeoResolver};
