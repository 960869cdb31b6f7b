// src/monitor.rs
//! Proximity monitoring: the state machine between position samples and the alarm

use crate::{
    alarm::AlarmSink,
    destination::Destination,
    error::{ProximityError, Result},
    geo::{distance, initial_bearing},
    gps::{
        PositionEvent, PositionSample, PositionSink, PositionSource, SourceEvent,
        SubscriptionHandle, SubscriptionId, WatchOptions,
    },
};
use serde::Serialize;
use std::time::Duration;

/// Radius around the destination that sets off the alarm
pub const ALARM_THRESHOLD_METERS: f64 = 1000.0;

/// Subscription options used for every monitoring session
pub const MONITOR_WATCH_OPTIONS: WatchOptions = WatchOptions {
    high_accuracy: true,
    max_sample_age: Duration::ZERO,
    timeout: Duration::from_secs(5),
};

/// Inclusive: a fix exactly on the threshold counts as arrived
pub fn within_threshold(meters: f64) -> bool {
    meters <= ALARM_THRESHOLD_METERS
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitoringState {
    Idle,
    Armed(Destination),
    Alarming(Destination),
}

impl MonitoringState {
    pub fn name(&self) -> &'static str {
        match self {
            MonitoringState::Idle => "idle",
            MonitoringState::Armed(_) => "armed",
            MonitoringState::Alarming(_) => "alarming",
        }
    }
}

/// How the monitor treated a destination command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationChange {
    Accepted,
    /// Same destination as the one already set
    Unchanged,
    /// Monitoring is running; stop or cancel first
    Locked,
}

/// What a position event did to the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorUpdate {
    /// Event from an inactive subscription, or none is active
    Ignored,
    Tracking { distance_meters: f64 },
    /// The threshold was crossed by this sample and the alarm started
    AlarmTriggered { distance_meters: f64 },
}

/// Point-in-time view of the monitor for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub state: &'static str,
    pub destination: Option<Destination>,
    pub position: Option<PositionSample>,
    pub distance_meters: Option<f64>,
    pub bearing_degrees: Option<f64>,
}

/// Owns the destination, monitoring state and the single position
/// subscription, and rings `A` when the destination comes within
/// [`ALARM_THRESHOLD_METERS`].
///
/// All mutation goes through `&mut self`, so whoever drives the monitor
/// serializes commands and position events by construction.
pub struct ProximityMonitor<S, A> {
    source: S,
    alarm: A,
    sink: PositionSink,
    destination: Option<Destination>,
    state: MonitoringState,
    subscription: Option<SubscriptionHandle>,
    current_position: Option<PositionSample>,
    current_distance: Option<f64>,
}

impl<S: PositionSource, A: AlarmSink> ProximityMonitor<S, A> {
    /// Create an idle monitor. Events for subscriptions it opens arrive on
    /// the receiver paired with `sink` and must be fed back through
    /// [`handle_event`](Self::handle_event).
    pub fn new(source: S, alarm: A, sink: PositionSink) -> Self {
        Self {
            source,
            alarm,
            sink,
            destination: None,
            state: MonitoringState::Idle,
            subscription: None,
            current_position: None,
            current_distance: None,
        }
    }

    /// Record a destination. Ignored while monitoring is running.
    pub fn set_destination(&mut self, destination: Destination) -> DestinationChange {
        if self.is_monitoring() {
            tracing::debug!("Destination locked while monitoring, ignoring {}", destination);
            return DestinationChange::Locked;
        }
        if self.destination.as_ref() == Some(&destination) {
            return DestinationChange::Unchanged;
        }

        tracing::info!(point = %destination.point, "Destination set to {}", destination);
        self.destination = Some(destination);
        DestinationChange::Accepted
    }

    /// Forget the destination. Ignored while monitoring is running.
    pub fn clear_destination(&mut self) -> DestinationChange {
        if self.is_monitoring() {
            return DestinationChange::Locked;
        }
        match self.destination.take() {
            Some(_) => DestinationChange::Accepted,
            None => DestinationChange::Unchanged,
        }
    }

    /// Arm the alarm and open a fresh position subscription.
    ///
    /// Re-arming while armed replaces the subscription. While alarming this
    /// does nothing and returns the running subscription.
    pub fn start_monitoring(&mut self) -> Result<SubscriptionId> {
        if let (MonitoringState::Alarming(_), Some(handle)) = (&self.state, &self.subscription) {
            return Ok(handle.id());
        }

        let destination = self.destination.clone().ok_or(ProximityError::NoDestination)?;

        self.close_subscription();
        let handle = self.source.subscribe(MONITOR_WATCH_OPTIONS, &self.sink);
        let id = handle.id();
        self.subscription = Some(handle);

        tracing::info!(
            subscription = %id,
            source = %self.source.describe(),
            "Monitoring {} within {} m",
            destination,
            ALARM_THRESHOLD_METERS
        );
        self.state = MonitoringState::Armed(destination);
        Ok(id)
    }

    /// End monitoring and clear the destination. Returns false when idle.
    pub fn stop(&mut self) -> bool {
        self.halt(true)
    }

    /// End monitoring. The destination survives a cancel before arrival so
    /// it can be re-armed; cancelling a ringing alarm means the trip is over
    /// and clears it. Returns false when idle.
    pub fn cancel(&mut self) -> bool {
        let arrived = matches!(self.state, MonitoringState::Alarming(_));
        self.halt(arrived)
    }

    fn halt(&mut self, clear_destination: bool) -> bool {
        let was_alarming = match self.state {
            MonitoringState::Idle => return false,
            MonitoringState::Armed(_) => false,
            MonitoringState::Alarming(_) => true,
        };

        self.close_subscription();
        self.state = MonitoringState::Idle;
        self.current_distance = None;
        if was_alarming {
            self.alarm.stop();
        }
        if clear_destination {
            self.destination = None;
        }

        tracing::info!(cleared = clear_destination, "Monitoring halted");
        true
    }

    fn close_subscription(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.source.unsubscribe(&handle);
        }
    }

    /// Feed one event from the position channel.
    ///
    /// Source errors leave the state untouched and come back as
    /// `PositionUnavailable`; the subscription stays open so the source can
    /// recover.
    pub fn handle_event(&mut self, event: SourceEvent) -> Result<MonitorUpdate> {
        let active = self
            .subscription
            .as_ref()
            .filter(|handle| handle.is_open())
            .map(SubscriptionHandle::id);

        if active != Some(event.subscription) {
            tracing::trace!(subscription = %event.subscription, "Dropping event from inactive subscription");
            return Ok(MonitorUpdate::Ignored);
        }

        match event.event {
            PositionEvent::Sample(sample) => Ok(self.on_sample(sample)),
            PositionEvent::Error(error) => {
                tracing::warn!(state = self.state.name(), "Position source error: {}", error);
                Err(ProximityError::PositionUnavailable(error))
            }
        }
    }

    fn on_sample(&mut self, sample: PositionSample) -> MonitorUpdate {
        let target = match &self.state {
            MonitoringState::Idle => return MonitorUpdate::Ignored,
            MonitoringState::Armed(d) | MonitoringState::Alarming(d) => d.point,
        };

        let meters = distance(sample.point, target);
        tracing::debug!(
            distance_m = meters,
            accuracy_m = sample.accuracy_meters,
            "Position {}",
            sample.point
        );
        self.current_position = Some(sample);
        self.current_distance = Some(meters);

        // Only the Armed -> Alarming edge rings the alarm
        match std::mem::replace(&mut self.state, MonitoringState::Idle) {
            MonitoringState::Armed(destination) if within_threshold(meters) => {
                tracing::warn!(distance_m = meters, "Arrived near {}", destination);
                self.state = MonitoringState::Alarming(destination);
                self.alarm.start();
                MonitorUpdate::AlarmTriggered {
                    distance_meters: meters,
                }
            }
            other => {
                self.state = other;
                MonitorUpdate::Tracking {
                    distance_meters: meters,
                }
            }
        }
    }

    pub fn state(&self) -> &MonitoringState {
        &self.state
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn current_distance(&self) -> Option<f64> {
        self.current_distance
    }

    pub fn current_position(&self) -> Option<&PositionSample> {
        self.current_position.as_ref()
    }

    pub fn is_monitoring(&self) -> bool {
        !matches!(self.state, MonitoringState::Idle)
    }

    pub fn is_alarming(&self) -> bool {
        matches!(self.state, MonitoringState::Alarming(_))
    }

    /// Id of the open subscription, if monitoring
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(SubscriptionHandle::id)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let bearing = match (&self.current_position, &self.destination) {
            (Some(position), Some(destination)) => {
                Some(initial_bearing(position.point, destination.point))
            }
            _ => None,
        };

        MonitorSnapshot {
            state: self.state.name(),
            destination: self.destination.clone(),
            position: self.current_position.clone(),
            distance_meters: self.current_distance,
            bearing_degrees: bearing,
        }
    }
}

impl<S, A> Drop for ProximityMonitor<S, A> {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.close();
        }
    }
}
