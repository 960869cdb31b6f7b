// src/gps/data.rs
//! Position samples and the events a position source emits

use crate::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One position fix as delivered by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub point: GeoPoint,
    pub accuracy_meters: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(point: GeoPoint, accuracy_meters: Option<f64>) -> Self {
        Self {
            point,
            accuracy_meters,
            captured_at: Utc::now(),
        }
    }

    pub fn with_time(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Age of the fix relative to `now`, never negative
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.captured_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Format accuracy for display
    pub fn format_accuracy(&self) -> String {
        match self.accuracy_meters {
            Some(acc) => format!("±{:.0} m", acc),
            None => "unknown".to_string(),
        }
    }
}

/// Non-fatal failure reported by a position source
#[derive(Debug, Clone, PartialEq)]
pub enum PositionError {
    PermissionDenied,
    Timeout,
    Unavailable(String),
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::PermissionDenied => write!(f, "access to the position source was denied"),
            PositionError::Timeout => write!(f, "timed out waiting for a position fix"),
            PositionError::Unavailable(reason) => write!(f, "position source unavailable ({})", reason),
        }
    }
}

impl std::error::Error for PositionError {}

impl From<std::io::Error> for PositionError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => PositionError::PermissionDenied,
            std::io::ErrorKind::TimedOut => PositionError::Timeout,
            _ => PositionError::Unavailable(error.to_string()),
        }
    }
}

/// What a subscription delivers, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Sample(PositionSample),
    Error(PositionError),
}
