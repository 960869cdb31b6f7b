// src/geo/mod.rs
//! Coordinates and great-circle math

pub mod distance;
pub mod point;

pub use distance::{compass_point, distance, initial_bearing, EARTH_RADIUS_METERS};
pub use point::{GeoPoint, Viewbox};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearing_helpers_at_module_root() {
        let from = GeoPoint::new(0.0, 0.0).unwrap();
        let to = GeoPoint::new(1.0, 0.0).unwrap();
        assert_eq!(compass_point(initial_bearing(from, to)), "N");
    }
}
