//! Great-circle distance and the drift threshold decision

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters used for distance computations.
pub const EARTH_RADIUS_METERS: f64 = 6_372_795.0;

/// Default drift threshold in meters.
pub const DEFAULT_THRESHOLD_METERS: f64 = 1.0;

/// A position in decimal degrees.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Parses the string-encoded pair kept in the remote store.
    pub fn parse(latitude: &str, longitude: &str) -> Option<Self> {
        let latitude = latitude.trim().parse::<f64>().ok()?;
        let longitude = longitude.trim().parse::<f64>().ok()?;
        let coordinate = Self::new(latitude, longitude);
        coordinate.is_valid().then_some(coordinate)
    }
}

/// Haversine distance in meters between two points.
///
/// The result does not depend on argument order.
pub fn distance_between(a: &GeoCoordinate, b: &GeoCoordinate) -> f64 {
    let phi_a = a.latitude.to_radians();
    let phi_b = b.latitude.to_radians();
    let half_dphi = (b.latitude - a.latitude).to_radians() / 2.0;
    let half_dlambda = (b.longitude - a.longitude).to_radians() / 2.0;

    let h = half_dphi.sin().powi(2) + phi_a.cos() * phi_b.cos() * half_dlambda.sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * h.sqrt().atan2((1.0 - h).sqrt()) * EARTH_RADIUS_METERS
}

/// Compares a fresh fix against the last published position.
#[derive(Debug, Clone, Copy)]
pub struct DriftEvaluator {
    threshold_meters: f64,
}

impl DriftEvaluator {
    pub fn new(threshold_meters: f64) -> Self {
        Self { threshold_meters }
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    pub fn evaluate(&self, current: &GeoCoordinate, last_published: &GeoCoordinate) -> f64 {
        distance_between(current, last_published)
    }

    /// The boundary counts as drift.
    pub fn is_drift(&self, distance_meters: f64) -> bool {
        distance_meters >= self.threshold_meters
    }
}

impl Default for DriftEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_METERS)
    }
}
