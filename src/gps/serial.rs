// src/gps/serial.rs
//! Serial NMEA receivers

use super::{
    data::PositionError,
    nmea::NmeaParser,
    stream::{watch_lines, FixCache, PositionSink, PositionSource, SubscriptionHandle, WatchOptions},
};
use crate::error::Result;
use std::time::Duration;
use tokio::{io::BufReader, time::sleep};
use tokio_serial::SerialPortBuilderExt;

/// Position source reading NMEA sentences from a serial port
#[derive(Debug, Clone)]
pub struct SerialSource {
    port: String,
    baudrate: u32,
    cache: FixCache,
}

impl SerialSource {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            cache: FixCache::default(),
        }
    }
}

impl PositionSource for SerialSource {
    fn subscribe(&mut self, options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle {
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        self.cache.replay_to(&watcher, &options);

        let port = self.port.clone();
        let baudrate = self.baudrate;
        let cache = self.cache.clone();

        tokio::spawn(async move {
            while watcher.is_open() {
                tracing::info!(
                    subscription = %watcher.handle().id(),
                    "Connecting to GPS on {} at {} baud",
                    port,
                    baudrate
                );

                match tokio_serial::new(&port, baudrate)
                    .timeout(Duration::from_millis(1000))
                    .open_native_async()
                {
                    Ok(serial) => {
                        let mut parser = NmeaParser::new();
                        watch_lines(BufReader::new(serial), watcher.clone(), options, cache.clone(), |line| {
                            parser.parse_sentence(line)
                        })
                        .await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to open serial port {}: {}", port, e);
                        let error = open_error(&e);
                        let denied = error == PositionError::PermissionDenied;
                        if !watcher.error(error) || denied {
                            // Permissions do not change between attempts
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
        format!("serial {} @ {} baud", self.port, self.baudrate)
    }
}

fn open_error(error: &tokio_serial::Error) -> PositionError {
    match error.kind() {
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => PositionError::PermissionDenied,
        _ => PositionError::Unavailable(error.to_string()),
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::{stream::channel, PositionEvent};

    #[test]
    fn test_open_error_mapping() {
        let denied = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "denied",
        );
        assert_eq!(open_error(&denied), PositionError::PermissionDenied);

        let missing = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "gone");
        assert!(matches!(open_error(&missing), PositionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_port_is_retried() {
        let (sink, mut rx) = channel();
        let mut source = SerialSource::new("/dev/proximity-alarm-no-such-port", 9600);
        let options = WatchOptions {
            timeout: Duration::from_millis(100),
            ..WatchOptions::default()
        };
        let handle = source.subscribe(options, &sink);

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.subscription, handle.id());
            assert!(matches!(event.event, PositionEvent::Error(PositionError::Unavailable(_))));
        }
        source.unsubscribe(&handle);
    }
}
