// src/gps/gpsd.rs
//! GPSD client implementation

use super::{
    data::{PositionError, PositionSample},
    stream::{watch_lines, FixCache, PositionSink, PositionSource, SubscriptionHandle, WatchOptions},
};
use crate::{
    error::{ProximityError, Result},
    geo::GeoPoint,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
    time::sleep,
};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> std::io::Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect((host, port)).await?;

    // Send WATCH command to start receiving JSON data
    stream
        .write_all(b"?WATCH={\"enable\":true,\"json\":true}\n")
        .await?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data.
///
/// Returns a sample for TPV reports that carry a 2D or 3D fix; every other
/// report class is accepted and ignored.
pub fn parse_gpsd_json(line: &str) -> Result<Option<PositionSample>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| ProximityError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    match msg.class.as_str() {
        "TPV" => parse_tpv_message(&msg.data),
        "VERSION" => {
            if let Some(version) = msg.data.get("release").and_then(|v| v.as_str()) {
                tracing::info!(version, "Connected to gpsd");
            }
            Ok(None)
        }
        "DEVICES" => {
            if let Some(devices) = msg.data.get("devices").and_then(|v| v.as_array()) {
                tracing::info!(count = devices.len(), "gpsd managing devices");
            }
            Ok(None)
        }
        // Ignore other message types
        _ => Ok(None),
    }
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> Result<Option<PositionSample>> {
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        return Ok(None);
    }

    let (Some(lat), Some(lon)) = (
        msg_data.get("lat").and_then(|v| v.as_f64()),
        msg_data.get("lon").and_then(|v| v.as_f64()),
    ) else {
        return Ok(None);
    };

    let point = GeoPoint::new(lat, lon)?;

    // Horizontal error: prefer eph, otherwise the larger of the axis estimates
    let epx = msg_data.get("epx").and_then(|v| v.as_f64());
    let epy = msg_data.get("epy").and_then(|v| v.as_f64());
    let accuracy = msg_data
        .get("eph")
        .and_then(|v| v.as_f64())
        .or(match (epx, epy) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (x, y) => x.or(y),
        });

    let mut sample = PositionSample::new(point, accuracy);
    if let Some(time) = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    {
        sample = sample.with_time(time.with_timezone(&Utc));
    }

    Ok(Some(sample))
}

fn parse_gpsd_line(line: &str) -> Option<PositionSample> {
    match parse_gpsd_json(line) {
        Ok(sample) => sample,
        Err(e) => {
            tracing::debug!("Skipping gpsd line: {}", e);
            None
        }
    }
}

/// Position source backed by a gpsd daemon
#[derive(Debug, Clone)]
pub struct GpsdSource {
    host: String,
    port: u16,
    cache: FixCache,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cache: FixCache::default(),
        }
    }
}

impl PositionSource for GpsdSource {
    fn subscribe(&mut self, options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle {
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        self.cache.replay_to(&watcher, &options);

        let host = self.host.clone();
        let port = self.port;
        let cache = self.cache.clone();

        tokio::spawn(async move {
            // Keep reconnecting while the subscription is open; a daemon that
            // restarts or comes up late still ends up feeding this watcher
            while watcher.is_open() {
                tracing::info!(subscription = %watcher.handle().id(), "Connecting to gpsd at {}:{}", host, port);

                match connect_gpsd(&host, port).await {
                    Ok(reader) => {
                        watch_lines(reader, watcher.clone(), options, cache.clone(), parse_gpsd_line).await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to connect to gpsd at {}:{}: {}", host, port, e);
                        if !watcher.error(PositionError::from(e)) {
                            break;
                        }
                    }
                }

                if watcher.is_open() {
                    sleep(options.reconnect_pause()).await;
                }
            }
        });

        handle
    }

    fn describe(&self) -> String {
        format!("gpsd {}:{}", self.host, self.port)
    }
}
