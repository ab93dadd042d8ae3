//! # Geo-points
//!
//! Optional `{lat, lon}` locations on devices, IP addresses and transactions,
//! with great-circle distance for radius queries.

use crate::primitives::EARTH_RADIUS_KM;
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    #[must_use]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }
}

/// Haversine distance between two points on the mean Earth sphere.
#[must_use]
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Parse a location column.
///
/// Accepts `{"lat": .., "lon": ..}` and GeoJSON `{"type": "Point", "coordinates": [lon, lat]}`.
/// Empty values and values that are not JSON objects mean "no location" (`Ok(None)`).
/// A JSON object that does not describe a valid point is an error carrying the reason.
pub fn parse_location(raw: &str) -> Result<Option<GeoPoint>, String> {
    let raw = raw.trim();
    if !raw.starts_with('{') {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let lat_lon = (
        value.get("lat").and_then(serde_json::Value::as_f64),
        value.get("lon").and_then(serde_json::Value::as_f64),
    );
    let point = match lat_lon {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => {
            if value.get("type").and_then(serde_json::Value::as_str) != Some("Point") {
                return Err("expected lat/lon fields or a GeoJSON Point".to_string());
            }
            let coords = value
                .get("coordinates")
                .and_then(serde_json::Value::as_array)
                .ok_or_else(|| "GeoJSON Point without coordinates".to_string())?;
            match coords.as_slice() {
                [lon, lat] => match (lat.as_f64(), lon.as_f64()) {
                    (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
                    _ => return Err("non-numeric coordinates".to_string()),
                },
                _ => return Err("coordinates must be [lon, lat]".to_string()),
            }
        }
    };

    if !point.is_valid() {
        return Err(format!("coordinates out of range: {}, {}", point.lat, point.lon));
    }
    Ok(Some(point))
}
