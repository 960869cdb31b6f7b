// src/gps/nmea.rs
//! NMEA sentence parsing

use super::data::PositionSample;
use crate::geo::GeoPoint;

/// Rough user-equivalent range error used to turn HDOP into meters
const NOMINAL_UERE_METERS: f64 = 5.0;

/// Turns a stream of NMEA sentences into position samples.
///
/// GGA sentences are the primary source. RMC sentences only produce samples
/// until the receiver has been seen sending GGA, so one epoch yields one
/// sample rather than two.
#[derive(Debug, Default)]
pub struct NmeaParser {
    hdop: Option<f64>,
    seen_gga: bool,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single NMEA sentence, returning a sample for valid fixes
    pub fn parse_sentence(&mut self, line: &str) -> Option<PositionSample> {
        if !line.starts_with('$') || !checksum_ok(line) {
            return None;
        }

        let body = line.split('*').next().unwrap_or(line);
        let parts: Vec<&str> = body.split(',').collect();
        let kind = parts.first()?.get(3..)?;

        match kind {
            "GGA" => self.parse_gga(&parts),
            "RMC" if !self.seen_gga => self.parse_rmc(&parts),
            _ => None,
        }
    }

    /// Parse GGA (Global Positioning System Fix Data) sentence
    fn parse_gga(&mut self, parts: &[&str]) -> Option<PositionSample> {
        if parts.len() < 10 {
            return None;
        }
        self.seen_gga = true;

        // HDOP (field 8)
        if let Ok(hdop) = parts[8].parse::<f64>() {
            self.hdop = Some(hdop);
        }

        // Fix quality (field 6), 0 means no fix
        let quality = parts[6].parse::<u8>().unwrap_or(0);
        if quality == 0 {
            return None;
        }

        let point = parse_position(parts[2], parts[3], parts[4], parts[5])?;
        Some(PositionSample::new(point, self.accuracy()))
    }

    /// Parse RMC (Recommended Minimum Course) sentence
    fn parse_rmc(&mut self, parts: &[&str]) -> Option<PositionSample> {
        if parts.len() < 7 {
            return None;
        }

        // Status (field 2): A = valid, V = warning
        if parts[2] != "A" {
            return None;
        }

        let point = parse_position(parts[3], parts[4], parts[5], parts[6])?;
        Some(PositionSample::new(point, self.accuracy()))
    }

    fn accuracy(&self) -> Option<f64> {
        self.hdop.map(|hdop| hdop * NOMINAL_UERE_METERS)
    }
}

/// Verify the `*hh` XOR checksum when the sentence carries one
pub fn checksum_ok(line: &str) -> bool {
    let Some(body) = line.strip_prefix('$') else {
        return false;
    };
    match body.split_once('*') {
        Some((payload, checksum)) => {
            let expected = payload.bytes().fold(0u8, |acc, b| acc ^ b);
            u8::from_str_radix(checksum.trim(), 16).map_or(false, |c| c == expected)
        }
        None => true,
    }
}

/// Combine ddmm.mmmm / dddmm.mmmm fields and hemispheres into a point
fn parse_position(lat: &str, lat_hemi: &str, lon: &str, lon_hemi: &str) -> Option<GeoPoint> {
    let mut latitude = parse_degrees_minutes(lat)?;
    if lat_hemi == "S" {
        latitude = -latitude;
    }

    let mut longitude = parse_degrees_minutes(lon)?;
    if lon_hemi == "W" {
        longitude = -longitude;
    }

    GeoPoint::new(latitude, longitude).ok()
}

fn parse_degrees_minutes(field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    let value = field.parse::<f64>().ok()?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    Some(degrees + minutes / 60.0)
}
