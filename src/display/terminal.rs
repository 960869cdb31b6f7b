// src/display/terminal.rs
//! Terminal-based status display

use super::{MapSurface, MarkerRole, DEFAULT_CENTER, DEFAULT_ZOOM};
use crate::{
    error::Result,
    geo::{compass_point, GeoPoint},
    monitor::MonitorSnapshot,
};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::Write;

/// Text rendition of the map: remembers where the markers and the view are,
/// and prints the monitor status on demand.
#[derive(Debug, Clone)]
pub struct TerminalDisplay {
    current: Option<GeoPoint>,
    destination: Option<GeoPoint>,
    center: Option<GeoPoint>,
    zoom: u8,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            current: None,
            destination: None,
            center: GeoPoint::new(DEFAULT_CENTER.0, DEFAULT_CENTER.1).ok(),
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn marker(&self, role: MarkerRole) -> Option<GeoPoint> {
        match role {
            MarkerRole::Current => self.current,
            MarkerRole::Destination => self.destination,
        }
    }

    pub fn view(&self) -> (Option<GeoPoint>, u8) {
        (self.center, self.zoom)
    }

    /// Distance badge text, kilometres to one decimal
    pub fn format_distance(meters: f64) -> String {
        format!("{:.1} km", meters / 1000.0)
    }

    /// One-line summary suitable for a scrolling log
    pub fn status_line(snapshot: &MonitorSnapshot) -> String {
        let badge = match snapshot.state {
            "idle" => "Ready",
            "armed" => "Active",
            _ => "ALARM",
        };

        let mut line = format!("[{}]", badge);
        if let Some(meters) = snapshot.distance_meters {
            line.push_str(&format!(" {} to go", Self::format_distance(meters)));
            if let Some(bearing) = snapshot.bearing_degrees {
                line.push_str(&format!(" {}", compass_point(bearing)));
            }
        }
        if let Some(position) = &snapshot.position {
            line.push_str(&format!(" (fix {})", position.format_accuracy()));
        }
        line
    }

    /// Print the full status block
    pub fn render(&self, out: &mut impl Write, snapshot: &MonitorSnapshot) -> Result<()> {
        let header_color = match snapshot.state {
            "alarming" => Color::Red,
            "armed" => Color::Green,
            _ => Color::DarkGrey,
        };

        execute!(
            out,
            SetForegroundColor(header_color),
            Print("=".repeat(60)),
            Print("\n"),
            Print(Self::status_line(snapshot)),
            Print("\n"),
            Print("=".repeat(60)),
            Print("\n"),
            ResetColor
        )?;

        self.render_destination_section(out, snapshot)?;
        self.render_position_section(out, snapshot)?;

        out.flush()?;
        Ok(())
    }

    fn render_destination_section(&self, out: &mut impl Write, snapshot: &MonitorSnapshot) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Yellow),
            Print("DESTINATION:\n"),
            ResetColor
        )?;

        match &snapshot.destination {
            Some(destination) => execute!(
                out,
                Print(format!("  {}\n", destination.label())),
                Print(format!("  At:        {}\n\n", destination.point))
            )?,
            None => execute!(out, Print("  Not set (use `to LAT,LON` or `search PLACE`)\n\n"))?,
        }
        Ok(())
    }

    fn render_position_section(&self, out: &mut impl Write, snapshot: &MonitorSnapshot) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Cyan),
            Print("POSITION:\n"),
            ResetColor
        )?;

        match &snapshot.position {
            Some(position) => execute!(
                out,
                Print(format!("  At:        {}\n", position.point)),
                Print(format!("  Accuracy:  {}\n", position.format_accuracy())),
                Print(format!(
                    "  Fix time:  {}\n\n",
                    position.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
                ))
            )?,
            None => execute!(out, Print("  No fix yet\n\n"))?,
        }
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl MapSurface for TerminalDisplay {
    fn place_marker(&mut self, role: MarkerRole, point: GeoPoint) {
        tracing::debug!("{} marker at {}", role.label(), point);
        match role {
            MarkerRole::Current => self.current = Some(point),
            MarkerRole::Destination => self.destination = Some(point),
        }
    }

    fn clear_marker(&mut self, role: MarkerRole) {
        match role {
            MarkerRole::Current => self.current = None,
            MarkerRole::Destination => self.destination = None,
        }
    }

    fn center_on(&mut self, point: GeoPoint, zoom: u8) {
        self.center = Some(point);
        self.zoom = zoom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{destination::Destination, gps::PositionSample};

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn snapshot(state: &'static str, distance: Option<f64>) -> MonitorSnapshot {
        MonitorSnapshot {
            state,
            destination: Some(Destination::map_tap(point(51.5007, -0.1246))),
            position: Some(PositionSample::new(point(51.5074, -0.1278), Some(8.0))),
            distance_meters: distance,
            bearing_degrees: Some(160.0),
        }
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(TerminalDisplay::format_distance(777.2), "0.8 km");
        assert_eq!(TerminalDisplay::format_distance(59_324.0), "59.3 km");
        assert_eq!(TerminalDisplay::format_distance(0.0), "0.0 km");
    }

    #[test]
    fn test_status_line() {
        let line = TerminalDisplay::status_line(&snapshot("armed", Some(1500.0)));
        assert!(line.starts_with("[Active]"));
        assert!(line.contains("1.5 km to go"));
        assert!(line.ends_with(" S (fix ±8 m)"));

        let idle = MonitorSnapshot {
            state: "idle",
            destination: None,
            position: None,
            distance_meters: None,
            bearing_degrees: None,
        };
        assert_eq!(TerminalDisplay::status_line(&idle), "[Ready]");
    }

    #[test]
    fn test_render_sections() {
        let display = TerminalDisplay::new();
        let mut out = Vec::new();
        display.render(&mut out, &snapshot("alarming", Some(777.2))).unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("[ALARM] 0.8 km to go"));
        assert!(text.contains("DESTINATION:"));
        assert!(text.contains("51.500700, -0.124600"));
        assert!(text.contains("POSITION:"));
    }

    #[test]
    fn test_markers_replace_and_clear() {
        let mut display = TerminalDisplay::new();
        assert_eq!(display.view().1, DEFAULT_ZOOM);

        display.place_marker(MarkerRole::Destination, point(1.0, 1.0));
        display.place_marker(MarkerRole::Destination, point(2.0, 2.0));
        assert_eq!(display.marker(MarkerRole::Destination), Some(point(2.0, 2.0)));
        assert_eq!(display.marker(MarkerRole::Current), None);

        display.clear_marker(MarkerRole::Destination);
        assert_eq!(display.marker(MarkerRole::Destination), None);

        display.center_on(point(3.0, 3.0), 15);
        assert_eq!(display.view(), (Some(point(3.0, 3.0)), 15));
    }
}
