// src/error.rs
//! Error types for the proximity alarm

use crate::gps::PositionError;
use std::fmt;

pub type Result<T> = std::result::Result<T, ProximityError>;

#[derive(Debug)]
pub enum ProximityError {
    /// Monitoring was requested before any destination was chosen
    NoDestination,
    /// The position source denied access, timed out or went away
    PositionUnavailable(PositionError),
    /// The geocoder answered but had nothing for the query
    LocationNotFound(String),
    /// The geocoder could not be reached or its answer could not be read
    SearchFailed(String),
    InvalidCoordinate(String),
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Connection(String),
    Parse(String),
    Config(String),
    Other(String),
}

impl ProximityError {
    /// Core errors never end a session; the caller shows them and carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProximityError::NoDestination
                | ProximityError::PositionUnavailable(_)
                | ProximityError::LocationNotFound(_)
                | ProximityError::SearchFailed(_)
                | ProximityError::InvalidCoordinate(_)
        )
    }
}

impl fmt::Display for ProximityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProximityError::NoDestination => {
                write!(f, "No destination set: choose a destination first")
            }
            ProximityError::PositionUnavailable(e) => write!(f, "Position unavailable: {}", e),
            ProximityError::LocationNotFound(query) => {
                write!(f, "Location not found: no results for \"{}\"", query)
            }
            ProximityError::SearchFailed(msg) => write!(f, "Search failed: {}", msg),
            ProximityError::InvalidCoordinate(msg) => write!(f, "Invalid coordinate: {}", msg),
            ProximityError::Io(e) => write!(f, "IO error: {}", e),
            ProximityError::Serial(e) => write!(f, "Serial error: {}", e),
            ProximityError::Json(e) => write!(f, "JSON error: {}", e),
            ProximityError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ProximityError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ProximityError::Config(msg) => write!(f, "Config error: {}", msg),
            ProximityError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for ProximityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProximityError::Io(e) => Some(e),
            ProximityError::Serial(e) => Some(e),
            ProximityError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProximityError {
    fn from(error: std::io::Error) -> Self {
        ProximityError::Io(error)
    }
}

impl From<tokio_serial::Error> for ProximityError {
    fn from(error: tokio_serial::Error) -> Self {
        ProximityError::Serial(error)
    }
}

impl From<serde_json::Error> for ProximityError {
    fn from(error: serde_json::Error) -> Self {
        ProximityError::Json(error)
    }
}

impl From<PositionError> for ProximityError {
    fn from(error: PositionError) -> Self {
        ProximityError::PositionUnavailable(error)
    }
}

impl From<reqwest::Error> for ProximityError {
    fn from(error: reqwest::Error) -> Self {
        ProximityError::SearchFailed(error.to_string())
    }
}

impl From<anyhow::Error> for ProximityError {
    fn from(error: anyhow::Error) -> Self {
        ProximityError::Other(error.to_string())
    }
}
