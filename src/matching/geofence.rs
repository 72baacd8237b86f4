// src/matching/geofence.rs - Region containment for location-derived matches
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::matching::LatLng;

const EARTH_RADIUS_METERS: f64 = 6371000.0;

/// (name, min_lat, max_lat, min_lng, max_lng)
const BAY_AREA_COUNTIES: [(&str, f64, f64, f64, f64); 9] = [
    ("San Francisco", 37.70, 37.84, -122.53, -122.35),
    ("San Mateo", 37.10, 37.71, -122.53, -122.08),
    ("Santa Clara", 36.89, 37.49, -122.21, -121.20),
    ("Alameda", 37.45, 37.91, -122.38, -121.46),
    ("Contra Costa", 37.71, 38.10, -122.44, -121.53),
    ("Marin", 37.81, 38.33, -123.03, -122.40),
    ("Solano", 38.03, 38.54, -122.41, -121.59),
    ("Napa", 38.15, 38.87, -122.65, -122.06),
    ("Sonoma", 38.10, 38.86, -123.54, -122.34),
];

const CALIFORNIA_BOUNDS: (f64, f64, f64, f64) = (32.53, 42.01, -124.48, -114.13);

/// Cities used when a candidate has an address but no coordinates.
const BAY_AREA_PLACE_NAMES: &[&str] = &[
    "san francisco", "south san francisco", "oakland", "berkeley", "emeryville", "alameda",
    "richmond", "hayward", "fremont", "newark", "union city", "pleasanton", "livermore", "dublin",
    "san leandro", "walnut creek", "concord", "san ramon", "san mateo", "redwood city",
    "san carlos", "belmont", "burlingame", "millbrae", "brisbane", "foster city", "menlo park",
    "palo alto", "mountain view", "sunnyvale", "santa clara", "san jose", "cupertino",
    "los altos", "milpitas", "campbell", "los gatos", "novato", "san rafael", "mill valley",
    "sausalito", "petaluma", "santa rosa", "napa", "vallejo", "benicia", "fairfield", "vacaville",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeofenceRegion {
    BayArea,
    California,
}

impl FromStr for GeofenceRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "bay_area" | "bayarea" | "bay area" => Ok(GeofenceRegion::BayArea),
            "california" | "ca" => Ok(GeofenceRegion::California),
            other => Err(format!("unknown geofence region '{}'", other)),
        }
    }
}

/// What a failed geofence check does to a match candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeofencePolicy {
    /// Contributes 0.0; the candidate can still pass on other signals.
    Neutral,
    /// The candidate is rejected whatever its score.
    Reject,
}

impl FromStr for GeofencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Ok(GeofencePolicy::Neutral),
            "reject" | "strict" => Ok(GeofencePolicy::Reject),
            other => Err(format!("unknown geofence policy '{}'", other)),
        }
    }
}

/// Named region plus an optional radius backstop around a centre point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub region: GeofenceRegion,
    pub center: LatLng,
    pub radius_km: Option<f64>,
}

impl Geofence {
    pub fn bay_area() -> Self {
        Self {
            region: GeofenceRegion::BayArea,
            center: LatLng { lat: 37.70, lng: -122.20 },
            radius_km: None,
        }
    }

    pub fn california() -> Self {
        Self {
            region: GeofenceRegion::California,
            center: LatLng { lat: 37.25, lng: -119.75 },
            radius_km: None,
        }
    }

    pub fn for_region(region: GeofenceRegion) -> Self {
        match region {
            GeofenceRegion::BayArea => Self::bay_area(),
            GeofenceRegion::California => Self::california(),
        }
    }

    pub fn with_radius_km(mut self, radius_km: Option<f64>) -> Self {
        self.radius_km = radius_km.filter(|r| *r > 0.0);
        self
    }

    pub fn contains_point(&self, lat: f64, lng: f64) -> bool {
        if !is_valid_coordinate(lat, lng) {
            return false;
        }
        let in_region = match self.region {
            GeofenceRegion::BayArea => BAY_AREA_COUNTIES
                .iter()
                .any(|(_, min_lat, max_lat, min_lng, max_lng)| {
                    lat >= *min_lat && lat <= *max_lat && lng >= *min_lng && lng <= *max_lng
                }),
            GeofenceRegion::California => {
                let (min_lat, max_lat, min_lng, max_lng) = CALIFORNIA_BOUNDS;
                lat >= min_lat && lat <= max_lat && lng >= min_lng && lng <= max_lng
            }
        };
        if in_region {
            return true;
        }
        match self.radius_km {
            Some(radius) => {
                haversine_meters(self.center.lat, self.center.lng, lat, lng) / 1000.0 <= radius
            }
            None => false,
        }
    }

    /// Text fallback for addresses without coordinates.
    pub fn contains_address(&self, address: &str) -> bool {
        let lower = format!(" {} ", address.to_lowercase().replace(',', " , "));
        let in_california = lower.contains(" ca ")
            || lower.contains("california")
            || has_california_zip(&lower);
        match self.region {
            GeofenceRegion::California => in_california,
            GeofenceRegion::BayArea => {
                in_california
                    && BAY_AREA_PLACE_NAMES
                        .iter()
                        .any(|place| lower.contains(&format!(" {} ", place)))
            }
        }
    }

    /// Coordinates win when present; otherwise the address text decides.
    pub fn contains(&self, location: Option<LatLng>, address: Option<&str>) -> bool {
        match location {
            Some(loc) => self.contains_point(loc.lat, loc.lng),
            None => address.map_or(false, |a| self.contains_address(a)),
        }
    }
}

/// Californian ZIP codes run 90000-96199.
fn has_california_zip(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|t| t.len() == 5)
        .filter_map(|t| t.parse::<u32>().ok())
        .any(|zip| (90000..=96199).contains(&zip))
}

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let (delta_phi, delta_lambda) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bay_area_points() {
        let fence = Geofence::bay_area();
        assert!(fence.contains_point(37.6547, -122.4077)); // South San Francisco
        assert!(fence.contains_point(37.4419, -122.1430)); // Palo Alto
        assert!(!fence.contains_point(32.7157, -117.1611)); // San Diego
        assert!(!fence.contains_point(91.0, -122.0));
    }

    #[test]
    fn test_california_points() {
        let fence = Geofence::california();
        assert!(fence.contains_point(32.7157, -117.1611));
        assert!(!fence.contains_point(40.7128, -74.0060));
    }

    #[test]
    fn test_radius_backstop() {
        let davis = (38.5449, -121.7405);
        let fence = Geofence::bay_area();
        assert!(!fence.contains_point(davis.0, davis.1));
        let wide = Geofence::bay_area().with_radius_km(Some(120.0));
        assert!(wide.contains_point(davis.0, davis.1));
    }

    #[test]
    fn test_address_fallback() {
        let fence = Geofence::bay_area();
        assert!(fence.contains_address("1 DNA Way, South San Francisco, CA 94080, USA"));
        assert!(!fence.contains_address("10 Main St, Boston, MA 02110"));
        assert!(Geofence::california().contains_address("3000 Sand Hill Rd, San Diego, California"));
        assert!(fence.contains(None, Some("100 Hamilton Ave, Palo Alto, CA")));
        assert!(!fence.contains(None, None));
    }

    #[test]
    fn test_policy_and_region_parsing() {
        assert_eq!("neutral".parse::<GeofencePolicy>(), Ok(GeofencePolicy::Neutral));
        assert_eq!("Reject".parse::<GeofencePolicy>(), Ok(GeofencePolicy::Reject));
        assert!("maybe".parse::<GeofencePolicy>().is_err());
        assert_eq!("bay-area".parse::<GeofenceRegion>(), Ok(GeofenceRegion::BayArea));
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(0.0, 0.0));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(45.0, 181.0));
    }
}
