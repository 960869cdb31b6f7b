// src/gps/mod.rs
//! Position sources and the subscription layer over them

pub mod data;
pub mod gpsd;
pub mod nmea;
pub mod replay;
pub mod serial;
pub mod stream;

pub use data::{PositionError, PositionEvent, PositionSample};
pub use gpsd::GpsdSource;
pub use replay::ReplaySource;
pub use serial::SerialSource;
pub use stream::{
    channel, ManualFeed, ManualSource, PositionSink, PositionSource, SourceEvent,
    SubscriptionHandle, SubscriptionId, WatchOptions,
};

use crate::{
    config::AppConfig,
    error::{ProximityError, Result},
};
use std::time::Duration;

/// Build the position source named by `config.source_type`
pub fn source_from_config(config: &AppConfig) -> Result<Box<dyn PositionSource + Send>> {
    match config.source_type.as_str() {
        "gpsd" => {
            let host = config.gpsd_host.clone().unwrap_or_else(|| "localhost".to_string());
            let port = config.gpsd_port.unwrap_or(2947);
            Ok(Box::new(GpsdSource::new(host, port)))
        }
        "serial" => {
            let port = config.serial_port.clone().ok_or_else(|| {
                ProximityError::Config("serial source needs a port (--port)".to_string())
            })?;
            Ok(Box::new(SerialSource::new(port, config.serial_baudrate.unwrap_or(9600))))
        }
        "replay" => {
            let path = config.replay_path.clone().ok_or_else(|| {
                ProximityError::Config("replay source needs a file (--replay)".to_string())
            })?;
            let interval = Duration::from_millis(config.replay_interval_ms);
            Ok(Box::new(ReplaySource::new(path, interval)))
        }
        other => Err(ProximityError::Config(format!("Unknown source type '{}'", other))),
    }
}
