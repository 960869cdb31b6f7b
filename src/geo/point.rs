// src/geo/point.rs
//! Geographic point and bounding box value types

use crate::error::{ProximityError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated WGS84 coordinate. Equality is exact, no tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = ProximityError;

    fn try_from(raw: RawPoint) -> Result<Self> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ProximityError::InvalidCoordinate(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ProximityError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Parses `"LAT,LON"`, whitespace around either number allowed.
impl FromStr for GeoPoint {
    type Err = ProximityError;

    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s.split_once(',').ok_or_else(|| {
            ProximityError::InvalidCoordinate(format!("expected LAT,LON but got \"{}\"", s))
        })?;

        let lat = lat.trim().parse::<f64>().map_err(|e| {
            ProximityError::InvalidCoordinate(format!("bad latitude \"{}\": {}", lat.trim(), e))
        })?;
        let lon = lon.trim().parse::<f64>().map_err(|e| {
            ProximityError::InvalidCoordinate(format!("bad longitude \"{}\": {}", lon.trim(), e))
        })?;

        GeoPoint::new(lat, lon)
    }
}

/// Search bias rectangle, in the order geocoders expect it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewbox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl Viewbox {
    /// Box of `half_span_deg` in each direction around `center`, clamped to
    /// valid coordinate ranges.
    pub fn around(center: GeoPoint, half_span_deg: f64) -> Self {
        Self {
            min_lng: (center.longitude - half_span_deg).max(-180.0),
            min_lat: (center.latitude - half_span_deg).max(-90.0),
            max_lng: (center.longitude + half_span_deg).min(180.0),
            max_lat: (center.latitude + half_span_deg).min(90.0),
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lng..=self.max_lng).contains(&point.longitude)
    }

    /// `minLng,minLat,maxLng,maxLat`
    pub fn to_query_value(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lng, self.min_lat, self.max_lng, self.max_lat
        )
    }
}
