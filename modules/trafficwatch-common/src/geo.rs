use serde::{Deserialize, Serialize};

use crate::error::TrafficError;

/// Kilometers per degree of latitude used by the bounding-box pre-filter.
///
/// Slightly below the true value on a 6371 km sphere (~111.19), so boxes
/// derived from it are marginally larger than the circle they enclose.
pub const KM_PER_DEGREE: f64 = 111.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

// ---------------------------------------------------------------------------
// GeoPoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), TrafficError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(TrafficError::validation(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(TrafficError::validation(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

// ---------------------------------------------------------------------------
// BoundingBox
// ---------------------------------------------------------------------------

/// Rectangular lat/lng window used as a cheap pre-filter.
///
/// `west > east` means the box wraps across the ±180° meridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box enclosing every point within `radius_km` of `center`.
    ///
    /// The latitude half-height is `radius_km / 111.0` degrees. The longitude
    /// half-width is the widest longitude reached by a cap of that angular
    /// radius, which grows toward the poles; when the cap touches a pole the
    /// box spans all longitudes.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_offset = radius_km.max(0.0) / KM_PER_DEGREE;
        let south = (center.lat - lat_offset).max(-90.0);
        let north = (center.lat + lat_offset).min(90.0);

        match longitude_offset(center.lat, lat_offset) {
            Some(lng_offset) => Self {
                south,
                north,
                west: wrap_lng(center.lng - lng_offset),
                east: wrap_lng(center.lng + lng_offset),
            },
            None => Self {
                south,
                north,
                west: -180.0,
                east: 180.0,
            },
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.lat < self.south || point.lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            point.lng >= self.west || point.lng <= self.east
        } else {
            point.lng >= self.west && point.lng <= self.east
        }
    }
}

/// Half-width in degrees of longitude, or `None` when every longitude
/// qualifies.
fn longitude_offset(center_lat: f64, lat_offset: f64) -> Option<f64> {
    if center_lat.abs() + lat_offset >= 90.0 {
        return None;
    }
    let ratio = lat_offset.to_radians().sin() / center_lat.to_radians().cos();
    if ratio >= 1.0 {
        return None;
    }
    let offset = ratio.asin().to_degrees().max(lat_offset);
    if offset >= 180.0 {
        None
    } else {
        Some(offset)
    }
}

fn wrap_lng(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else if lng < -180.0 {
        lng + 360.0
    } else {
        lng
    }
}
