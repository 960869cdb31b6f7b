// src/display/mod.rs
//! Display surfaces the session mirrors monitor state onto

pub mod terminal;

pub use terminal::TerminalDisplay;

use crate::geo::GeoPoint;

/// Zoom level used whenever the view follows a position
pub const DEFAULT_ZOOM: u8 = 13;

/// Where the view starts before any fix arrives (central London)
pub const DEFAULT_CENTER: (f64, f64) = (51.5074, -0.1278);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerRole {
    Current,
    Destination,
}

impl MarkerRole {
    pub fn label(&self) -> &'static str {
        match self {
            MarkerRole::Current => "You",
            MarkerRole::Destination => "Destination",
        }
    }
}

/// A map the session can drop markers on and pan.
///
/// Placing a marker for a role replaces any earlier marker of that role.
pub trait MapSurface {
    fn place_marker(&mut self, role: MarkerRole, point: GeoPoint);
    fn clear_marker(&mut self, role: MarkerRole);
    fn center_on(&mut self, point: GeoPoint, zoom: u8);
}
