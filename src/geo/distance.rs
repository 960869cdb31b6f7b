// src/geo/distance.rs
//! Great-circle distance on a spherical Earth

use super::GeoPoint;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two points.
///
/// Identical points give exactly zero. The haversine term is clamped to
/// [0, 1] so rounding near the antipode never feeds a negative number to
/// the square root.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }

    let phi1 = a.latitude().to_radians();
    let phi2 = b.latitude().to_radians();
    let delta_phi = (b.latitude() - a.latitude()).to_radians();
    let delta_lambda = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `from` towards `to`, degrees clockwise from north in [0, 360).
pub fn initial_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let phi1 = from.latitude().to_radians();
    let phi2 = to.latitude().to_radians();
    let delta_lambda = (to.longitude() - from.longitude()).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Eight-point compass name for a bearing
pub fn compass_point(bearing: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = ((bearing.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    POINTS[index]
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn point() -> impl Strategy<Value = GeoPoint> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| GeoPoint::new(lat, lon).unwrap())
    }

    proptest! {
        /// Distance does not depend on the direction of travel.
        #[test]
        fn distance_is_symmetric(a in point(), b in point()) {
            let there = distance(a, b);
            let back = distance(b, a);
            prop_assert!((there - back).abs() <= 1e-6, "{} vs {}", there, back);
        }

        #[test]
        fn distance_to_self_is_zero(a in point()) {
            prop_assert_eq!(distance(a, a), 0.0);
        }

        /// Never negative, never NaN, never beyond half the circumference.
        #[test]
        fn distance_stays_on_the_sphere(a in point(), b in point()) {
            let d = distance(a, b);
            prop_assert!(d.is_finite());
            prop_assert!(d >= 0.0);
            prop_assert!(d <= PI * EARTH_RADIUS_METERS + 1e-6, "{}", d);
        }
    }
}
