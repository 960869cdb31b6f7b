// src/gps/replay.rs
//! Replaying a recorded journey as a position source
//!
//! Each non-empty line is either an NMEA sentence (starting with `$`) or a
//! `lat,lon[,accuracy]` triple. Lines starting with `#` are comments.

use super::{
    data::{PositionError, PositionSample},
    nmea::NmeaParser,
    stream::{PositionSink, PositionSource, SubscriptionHandle, WatchOptions},
};
use crate::geo::GeoPoint;
use std::{path::PathBuf, time::Duration};

/// Position source that plays back a file at a fixed pace
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    interval: Duration,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }
}

/// Parse a whole replay file into samples, skipping lines that carry no fix
pub fn parse_replay(contents: &str) -> Vec<PositionSample> {
    let mut parser = NmeaParser::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            if line.starts_with('$') {
                parser.parse_sentence(line)
            } else {
                parse_csv_line(line)
            }
        })
        .collect()
}

fn parse_csv_line(line: &str) -> Option<PositionSample> {
    let mut fields = line.split(',').map(str::trim);
    let lat = fields.next()?.parse::<f64>().ok()?;
    let lon = fields.next()?.parse::<f64>().ok()?;
    let accuracy = fields.next().and_then(|a| a.parse::<f64>().ok());
    let point = GeoPoint::new(lat, lon).ok()?;
    Some(PositionSample::new(point, accuracy))
}

impl PositionSource for ReplaySource {
    fn subscribe(&mut self, _options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle {
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        let path = self.path.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!("Failed to read replay file {}: {}", path.display(), e);
                    watcher.error(PositionError::from(e));
                    return;
                }
            };

            let samples = parse_replay(&contents);
            tracing::info!(count = samples.len(), "Replaying {}", path.display());

            for sample in samples {
                // Stamp with playback time so the fix looks live
                if !watcher.sample(PositionSample::new(sample.point, sample.accuracy_meters)) {
                    return;
                }
                tokio::time::sleep(interval).await;
            }

            tracing::info!("Replay finished");
        });

        handle
    }

    fn describe(&self) -> String {
        format!("replay {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::{stream::channel, PositionEvent};
    use std::io::Write;

    const JOURNEY: &str = "\
# Reading towards Westminster
51.4545,-0.9780,12
51.4800,-0.6000

$GNGGA,101010,5130.042,N,00007.476,W,1,10,1.2,20.0,M,47.0,M,,*7F
not a fix
";

    #[test]
    fn test_parse_mixed_file() {
        let samples = parse_replay(JOURNEY);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].accuracy_meters, Some(12.0));
        assert_eq!(samples[1].accuracy_meters, None);
        assert!((samples[2].point.latitude() - 51.5007).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_lines_skipped() {
        assert!(parse_replay("95.0,10.0\n").is_empty());
    }

    #[tokio::test]
    async fn test_replay_plays_file_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(JOURNEY.as_bytes()).unwrap();

        let (sink, mut rx) = channel();
        let mut source = ReplaySource::new(file.path(), Duration::from_millis(5));
        source.subscribe(WatchOptions::default(), &sink);

        let mut latitudes = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.unwrap().event {
                PositionEvent::Sample(s) => latitudes.push(s.point.latitude()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(latitudes[0], 51.4545);
        assert_eq!(latitudes[1], 51.48);
    }

    #[tokio::test]
    async fn test_missing_file_reports_error() {
        let (sink, mut rx) = channel();
        let mut source = ReplaySource::new("/nonexistent/journey.txt", Duration::from_millis(10));
        source.subscribe(WatchOptions::default(), &sink);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.event, PositionEvent::Error(_)));
    }
}
