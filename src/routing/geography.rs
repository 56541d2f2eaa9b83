//! Static geography tables used by the geographic and latency strategies.

use crate::core::Coordinates;

/// Regions walked, in order, when a country's preferred region is unhealthy.
pub const FALLBACK_ORDER: &[&str] = &[
    "us-east-1",
    "eu-west-1",
    "eu-central-1",
    "ap-northeast-1",
    "ap-southeast-1",
    "us-west-2",
    "sa-east-1",
];

/// Preferred region for an ISO country code.
pub fn preferred_region(country_code: &str) -> Option<&'static str> {
    let region = match country_code.to_ascii_uppercase().as_str() {
        "US" | "CA" | "MX" => "us-east-1",
        "BR" | "AR" | "CL" | "CO" | "PE" => "sa-east-1",
        "GB" | "IE" => "eu-west-1",
        "DE" | "FR" | "NL" | "CH" | "IT" | "ES" | "AT" | "BE" | "PL" | "SE" => "eu-central-1",
        "JP" | "KR" => "ap-northeast-1",
        "SG" | "IN" | "AU" | "ID" | "MY" | "TH" | "NZ" => "ap-southeast-1",
        _ => return None,
    };
    Some(region)
}

/// Reference coordinates for well-known region identifiers.
pub fn reference_coordinates(region_id: &str) -> Option<Coordinates> {
    let coords = match region_id {
        "us-east-1" => Coordinates::new(38.9, -77.4),
        "us-west-2" => Coordinates::new(45.8, -119.7),
        "sa-east-1" => Coordinates::new(-23.5, -46.6),
        "eu-west-1" => Coordinates::new(53.3, -6.3),
        "eu-central-1" => Coordinates::new(50.1, 8.7),
        "ap-northeast-1" => Coordinates::new(35.7, 139.7),
        "ap-southeast-1" => Coordinates::new(1.35, 103.8),
        _ => return None,
    };
    Some(coords)
}

/// Estimated one-way network latency between two points.
///
/// Light in fibre covers roughly 200 km per millisecond; doubling for real
/// cable paths gives about 100 km per millisecond.
pub fn estimate_latency_ms(from: &Coordinates, to: &Coordinates) -> f64 {
    from.distance_km(to) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_region() {
        assert_eq!(preferred_region("US"), Some("us-east-1"));
        assert_eq!(preferred_region("de"), Some("eu-central-1"));
        assert_eq!(preferred_region("JP"), Some("ap-northeast-1"));
        assert_eq!(preferred_region("XX"), None);
    }

    #[test]
    fn test_every_preferred_region_has_coordinates() {
        for country in ["US", "BR", "GB", "DE", "JP", "SG"] {
            let region = preferred_region(country).unwrap();
            assert!(reference_coordinates(region).is_some(), "{}", region);
            assert!(FALLBACK_ORDER.contains(&region), "{}", region);
        }
    }

    #[test]
    fn test_latency_estimate() {
        let frankfurt = reference_coordinates("eu-central-1").unwrap();
        let dublin = reference_coordinates("eu-west-1").unwrap();
        let tokyo = reference_coordinates("ap-northeast-1").unwrap();

        let near = estimate_latency_ms(&frankfurt, &dublin);
        let far = estimate_latency_ms(&frankfurt, &tokyo);
        assert!(near > 5.0 && near < 20.0, "{}", near);
        assert!(far > 80.0, "{}", far);
    }
}
