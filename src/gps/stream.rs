// src/gps/stream.rs
//! Cancellable position subscriptions
//!
//! A [`PositionSource`] turns some live feed into a subscription. Every
//! subscription gets its own [`SubscriptionHandle`]; closing the handle
//! stops delivery immediately, even while the source's worker is still
//! blocked on I/O. Events travel to the consumer through a single channel
//! created by [`channel`], each tagged with the id of the subscription that
//! produced it so a consumer can drop anything from a handle it no longer
//! holds.

use super::data::{PositionError, PositionEvent, PositionSample};
use chrono::Utc;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    time::{timeout_at, Instant},
};

/// Options a source honors for one subscription
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached fix the source may hand out on subscribe; zero never replays one
    pub max_sample_age: Duration,
    /// Longest wait for a fix before a `Timeout` error is delivered
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: false,
            max_sample_age: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }
}

const MIN_RECONNECT_PAUSE: Duration = Duration::from_millis(100);

impl WatchOptions {
    /// Wait between attempts to reach a receiver that failed or went away
    pub fn reconnect_pause(&self) -> Duration {
        self.timeout.max(MIN_RECONNECT_PAUSE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to one subscription. Clones share the open flag.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    open: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns true only for the call that actually closed the handle.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }
}

/// An event together with the subscription that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub subscription: SubscriptionId,
    pub event: PositionEvent,
}

/// Sending side of the event channel; sources open watchers on it.
#[derive(Debug, Clone)]
pub struct PositionSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
    next_id: Arc<AtomicU64>,
}

/// Create the event channel shared by every subscription of one consumer
pub fn channel() -> (PositionSink, mpsc::UnboundedReceiver<SourceEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = PositionSink {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    (sink, rx)
}

impl PositionSink {
    /// Allocate a new open subscription
    pub fn open(&self) -> Watcher {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Watcher {
            handle: SubscriptionHandle {
                id,
                open: Arc::new(AtomicBool::new(true)),
            },
            tx: self.tx.clone(),
        }
    }
}

/// Delivery end of one subscription, owned by the source's worker
#[derive(Debug, Clone)]
pub struct Watcher {
    handle: SubscriptionHandle,
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl Watcher {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// False once the handle is closed or the consumer has gone away
    pub fn is_open(&self) -> bool {
        self.handle.is_open() && !self.tx.is_closed()
    }

    pub fn sample(&self, sample: PositionSample) -> bool {
        self.emit(PositionEvent::Sample(sample))
    }

    pub fn error(&self, error: PositionError) -> bool {
        self.emit(PositionEvent::Error(error))
    }

    fn emit(&self, event: PositionEvent) -> bool {
        if !self.handle.is_open() {
            return false;
        }
        self.tx
            .send(SourceEvent {
                subscription: self.handle.id,
                event,
            })
            .is_ok()
    }
}

/// Anything that can feed position samples to a subscriber
pub trait PositionSource {
    /// Start delivering events for a new subscription on `sink`
    fn subscribe(&mut self, options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle;

    /// Stop a subscription. Closing an already closed handle does nothing.
    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        if handle.close() {
            tracing::debug!(subscription = %handle.id(), "Subscription closed");
        }
    }

    /// Short label for status output
    fn describe(&self) -> String;
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn subscribe(&mut self, options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle {
        (**self).subscribe(options, sink)
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        (**self).unsubscribe(handle)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Last fix seen by a source, shared with its workers
#[derive(Debug, Clone, Default)]
pub struct FixCache {
    last: Arc<Mutex<Option<PositionSample>>>,
}

impl FixCache {
    pub fn store(&self, sample: &PositionSample) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(sample.clone());
        }
    }

    /// Cached fix if it is no older than `max_age`; a zero age never matches
    pub fn fresh(&self, max_age: Duration) -> Option<PositionSample> {
        if max_age.is_zero() {
            return None;
        }
        let last = self.last.lock().ok()?;
        let fresh = last
            .as_ref()
            .filter(|sample| sample.age(Utc::now()) <= max_age)
            .cloned();
        fresh
    }

    /// Hand the cached fix to a fresh subscriber when the options allow it
    pub fn replay_to(&self, watcher: &Watcher, options: &WatchOptions) {
        if let Some(sample) = self.fresh(options.max_sample_age) {
            tracing::debug!(subscription = %watcher.handle().id(), "Replaying cached fix");
            watcher.sample(sample);
        }
    }
}

/// Read lines from `reader` until the subscription closes or the stream ends,
/// turning each line into zero or one sample with `parse`.
///
/// A `Timeout` error is delivered whenever `options.timeout` passes without a
/// fix; the worker then keeps waiting. Read failures and end of stream are
/// reported as `Unavailable` and end the worker.
pub async fn watch_lines<R, F>(
    mut reader: R,
    watcher: Watcher,
    options: WatchOptions,
    cache: FixCache,
    mut parse: F,
) where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str) -> Option<PositionSample>,
{
    // Bytes survive a timed-out read, so a fix split across the deadline is
    // completed by the next read instead of being lost
    let mut line = Vec::new();
    let mut deadline = Instant::now() + options.timeout;

    while watcher.is_open() {
        match timeout_at(deadline, reader.read_until(b'\n', &mut line)).await {
            Err(_) => {
                tracing::debug!(subscription = %watcher.handle().id(), "No fix within timeout");
                if !watcher.error(PositionError::Timeout) {
                    break;
                }
                deadline = Instant::now() + options.timeout;
            }
            Ok(Ok(0)) => {
                watcher.error(PositionError::Unavailable("stream closed".to_string()));
                break;
            }
            Ok(Ok(_)) => {
                let parsed = {
                    let text = String::from_utf8_lossy(&line);
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        parse(trimmed)
                    }
                };
                line.clear();

                if let Some(sample) = parsed {
                    cache.store(&sample);
                    if !watcher.sample(sample) {
                        break;
                    }
                    deadline = Instant::now() + options.timeout;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(subscription = %watcher.handle().id(), "Read failed: {}", e);
                watcher.error(PositionError::from(e));
                break;
            }
        }
    }

    tracing::debug!(subscription = %watcher.handle().id(), "Position worker finished");
}

/// Source driven by hand, for embedding and tests
#[derive(Debug, Default)]
pub struct ManualSource {
    feed: ManualFeed,
}

/// Pushes events into every open subscription of a [`ManualSource`]
#[derive(Debug, Clone, Default)]
pub struct ManualFeed {
    watchers: Arc<Mutex<Vec<Watcher>>>,
    options: Arc<Mutex<Vec<WatchOptions>>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualFeed) {
        let feed = ManualFeed::default();
        (Self { feed: feed.clone() }, feed)
    }
}

impl PositionSource for ManualSource {
    fn subscribe(&mut self, options: WatchOptions, sink: &PositionSink) -> SubscriptionHandle {
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        if let Ok(mut watchers) = self.feed.watchers.lock() {
            watchers.push(watcher);
        }
        if let Ok(mut all) = self.feed.options.lock() {
            all.push(options);
        }
        handle
    }

    fn describe(&self) -> String {
        "manual".to_string()
    }
}

impl ManualFeed {
    /// Deliver a sample; returns how many subscriptions received it
    pub fn push_sample(&self, sample: PositionSample) -> usize {
        self.broadcast(PositionEvent::Sample(sample))
    }

    pub fn push_error(&self, error: PositionError) -> usize {
        self.broadcast(PositionEvent::Error(error))
    }

    fn broadcast(&self, event: PositionEvent) -> usize {
        let Ok(mut watchers) = self.watchers.lock() else {
            return 0;
        };
        watchers.retain(|w| w.is_open());
        watchers
            .iter()
            .filter(|w| w.emit(event.clone()))
            .count()
    }

    /// Number of subscriptions still open
    pub fn open_subscriptions(&self) -> usize {
        self.watchers
            .lock()
            .map(|w| w.iter().filter(|w| w.is_open()).count())
            .unwrap_or(0)
    }

    /// Options of every subscribe call so far, oldest first
    pub fn subscribe_calls(&self) -> Vec<WatchOptions> {
        self.options.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use tokio::io::BufReader;

    fn sample(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(GeoPoint::new(lat, lon).unwrap(), Some(5.0))
    }

    #[test]
    fn test_close_is_idempotent() {
        let (sink, _rx) = channel();
        let handle = sink.open().handle().clone();
        assert!(handle.is_open());
        assert!(handle.close());
        assert!(!handle.close());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_reconnect_pause_has_a_floor() {
        let options = WatchOptions {
            timeout: Duration::ZERO,
            ..WatchOptions::default()
        };
        assert_eq!(options.reconnect_pause(), MIN_RECONNECT_PAUSE);
        assert_eq!(WatchOptions::default().reconnect_pause(), Duration::from_secs(5));
    }

    #[test]
    fn test_ids_are_unique() {
        let (sink, _rx) = channel();
        let a = sink.open().handle().id();
        let b = sink.open().handle().id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_closed_watcher_drops_events() {
        let (sink, mut rx) = channel();
        let watcher = sink.open();

        assert!(watcher.sample(sample(1.0, 1.0)));
        watcher.handle().close();
        assert!(!watcher.sample(sample(2.0, 2.0)));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.subscription, watcher.handle().id());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_manual_feed_skips_closed_subscriptions() {
        let (sink, mut rx) = channel();
        let (mut source, feed) = ManualSource::new();

        let first = source.subscribe(WatchOptions::default(), &sink);
        let second = source.subscribe(WatchOptions::default(), &sink);
        source.unsubscribe(&first);
        source.unsubscribe(&first);

        assert_eq!(feed.open_subscriptions(), 1);
        assert_eq!(feed.push_error(PositionError::Timeout), 1);
        assert_eq!(rx.try_recv().unwrap().subscription, second.id());
        assert_eq!(feed.subscribe_calls().len(), 2);
    }

    #[test]
    fn test_fix_cache_zero_age_never_replays() {
        let cache = FixCache::default();
        cache.store(&sample(1.0, 1.0));
        assert!(cache.fresh(Duration::ZERO).is_none());
        assert!(cache.fresh(Duration::from_secs(60)).is_some());

        let stale = sample(1.0, 1.0).with_time(Utc::now() - chrono::Duration::seconds(120));
        cache.store(&stale);
        assert!(cache.fresh(Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn test_watch_lines_delivers_in_order_then_reports_close() {
        let (sink, mut rx) = channel();
        let watcher = sink.open();
        let input: &[u8] = b"1.0,1.0\n\ngarbage\n2.0,2.0\n";
        let cache = FixCache::default();

        watch_lines(
            BufReader::new(input),
            watcher,
            WatchOptions::default(),
            cache.clone(),
            |line| line.parse::<GeoPoint>().ok().map(|p| PositionSample::new(p, None)),
        )
        .await;

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev.event);
        }
        assert_eq!(events.len(), 3);
        match &events[0] {
            PositionEvent::Sample(s) => assert_eq!(s.point.latitude(), 1.0),
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            PositionEvent::Sample(s) => assert_eq!(s.point.latitude(), 2.0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(events[2], PositionEvent::Error(PositionError::Unavailable(_))));
        assert!(cache.fresh(Duration::from_secs(60)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_lines_reports_timeout_and_keeps_waiting() {
        let (sink, mut rx) = channel();
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        let (client, server) = tokio::io::duplex(64);

        let options = WatchOptions {
            timeout: Duration::from_secs(5),
            ..WatchOptions::default()
        };
        let worker = tokio::spawn(watch_lines(
            BufReader::new(server),
            watcher,
            options,
            FixCache::default(),
            |line| line.parse::<GeoPoint>().ok().map(|p| PositionSample::new(p, None)),
        ));

        tokio::time::sleep(Duration::from_secs(6)).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, PositionEvent::Error(PositionError::Timeout));
        assert!(handle.is_open());

        handle.close();
        drop(client);
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_lines_keeps_partial_line_across_timeout() {
        use tokio::io::AsyncWriteExt;

        let (sink, mut rx) = channel();
        let watcher = sink.open();
        let handle = watcher.handle().clone();
        let (mut client, server) = tokio::io::duplex(64);

        let options = WatchOptions {
            timeout: Duration::from_secs(5),
            ..WatchOptions::default()
        };
        let worker = tokio::spawn(watch_lines(
            BufReader::new(server),
            watcher,
            options,
            FixCache::default(),
            |line| line.parse::<GeoPoint>().ok().map(|p| PositionSample::new(p, None)),
        ));

        client.write_all(b"51.5,").await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, PositionEvent::Error(PositionError::Timeout));

        client.write_all(b"-0.12\n").await.unwrap();
        let second = rx.recv().await.unwrap();
        match second.event {
            PositionEvent::Sample(s) => {
                assert_eq!(s.point.latitude(), 51.5);
                assert_eq!(s.point.longitude(), -0.12);
            }
            other => panic!("unexpected {:?}", other),
        }

        handle.close();
        drop(client);
        worker.await.unwrap();
    }
}
