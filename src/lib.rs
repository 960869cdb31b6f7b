// src/lib.rs
//! Proximity Alarm Library
//!
//! Watches a live position stream and rings an alarm once the traveller
//! comes within a kilometre of a chosen destination.

pub mod alarm;
pub mod config;
pub mod destination;
pub mod display;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod gps;
pub mod logging;
pub mod monitor;
pub mod session;

// Re-export main types for convenience
pub use destination::{Destination, DestinationResolver};
pub use error::{ProximityError, Result};
pub use geo::{distance, GeoPoint};
pub use gps::{PositionSample, PositionSource};
pub use monitor::{MonitoringState, ProximityMonitor, ALARM_THRESHOLD_METERS};
