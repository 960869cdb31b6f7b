// src/session.rs
//! Interactive session: one monitor driven by typed commands, position
//! events and place lookups, all handled from a single task

use crate::{
    alarm::AlarmSink,
    destination::{Destination, DestinationResolver, Lookup, SearchOutcome},
    display::{MapSurface, MarkerRole, TerminalDisplay, DEFAULT_ZOOM},
    error::{ProximityError, Result},
    geo::GeoPoint,
    geocode::Geocoder,
    gps::{channel, PositionSource, SourceEvent},
    monitor::{DestinationChange, MonitorUpdate, ProximityMonitor},
};
use std::{
    io::{self, Write},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};

const HELP: &str = "\
Commands:
  to LAT,LON      set the destination to a point
  search PLACE    look up a place and use the nearest match
  pick N          use match N from the last search instead
  start           arm the alarm
  stop            silence the alarm and forget the destination
  cancel          stop monitoring (keeps the destination unless the alarm rang)
  status          show the current state
  quit            leave";

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    To(GeoPoint),
    Search(String),
    /// 1-based index into the last search's matches
    Pick(usize),
    Start,
    Stop,
    Cancel,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ProximityError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "to" => Ok(Command::To(rest.parse()?)),
            "search" | "find" => Ok(Command::Search(rest.to_string())),
            "pick" => rest
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .map(Command::Pick)
                .ok_or_else(|| ProximityError::Parse(format!("pick needs a match number, got \"{}\"", rest))),
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "cancel" => Ok(Command::Cancel),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "" => Err(ProximityError::Parse("empty command".to_string())),
            other => Err(ProximityError::Parse(format!(
                "unknown command \"{}\", try `help`",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session<S, A, G, W = io::Stdout> {
    monitor: ProximityMonitor<S, A>,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    resolver: Arc<DestinationResolver<G>>,
    lookup_tx: mpsc::UnboundedSender<Result<Lookup>>,
    lookup_rx: mpsc::UnboundedReceiver<Result<Lookup>>,
    display: TerminalDisplay,
    out: W,
    last_search: Option<SearchOutcome>,
    near: Option<GeoPoint>,
    centered: bool,
}

impl<S, A, G> Session<S, A, G>
where
    S: PositionSource,
    A: AlarmSink,
    G: Geocoder + Send + Sync + 'static,
{
    pub fn new(source: S, alarm: A, geocoder: G) -> Self {
        Self::with_output(source, alarm, geocoder, io::stdout())
    }
}

impl<S, A, G, W> Session<S, A, G, W>
where
    S: PositionSource,
    A: AlarmSink,
    G: Geocoder + Send + Sync + 'static,
    W: Write,
{
    pub fn with_output(source: S, alarm: A, geocoder: G, out: W) -> Self {
        let (sink, events) = channel();
        let (lookup_tx, lookup_rx) = mpsc::unbounded_channel();

        Self {
            monitor: ProximityMonitor::new(source, alarm, sink),
            events,
            resolver: Arc::new(DestinationResolver::new(geocoder)),
            lookup_tx,
            lookup_rx,
            display: TerminalDisplay::new(),
            out,
            last_search: None,
            near: None,
            centered: false,
        }
    }

    /// Search bias used until the first fix arrives
    pub fn with_near(mut self, near: Option<GeoPoint>) -> Self {
        self.near = near;
        self
    }

    pub fn monitor(&self) -> &ProximityMonitor<S, A> {
        &self.monitor
    }

    pub fn display(&self) -> &TerminalDisplay {
        &self.display
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn notice(&mut self, message: impl AsRef<str>) {
        if let Err(e) = writeln!(self.out, "{}", message.as_ref()) {
            tracing::warn!("Failed to write to output: {}", e);
        }
    }

    /// Show a failure without ending the session
    pub fn report(&mut self, error: &ProximityError) {
        let message = match error {
            ProximityError::NoDestination => {
                "No destination set: choose one with `to LAT,LON` or `search PLACE` first".to_string()
            }
            ProximityError::PositionUnavailable(e) => format!("Unable to track your location: {}", e),
            other => other.to_string(),
        };
        tracing::debug!("Reported: {}", error);
        self.notice(message);
    }

    fn search_bias(&self) -> Option<GeoPoint> {
        self.monitor
            .current_position()
            .map(|sample| sample.point)
            .or(self.near)
    }

    pub fn apply(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::To(point) => {
                let destination = self.resolver.from_map_click(point);
                self.choose(destination);
            }
            Command::Search(query) => self.spawn_search(query),
            Command::Pick(n) => {
                let picked = n
                    .checked_sub(1)
                    .and_then(|index| self.last_search.as_ref()?.select(index));
                match picked {
                    Some(destination) => {
                        self.choose(destination);
                    }
                    None => self.notice(format!("No match #{} in the last search", n)),
                }
            }
            Command::Start => {
                self.monitor.start_monitoring()?;
                self.notice("Alarm set: you will be woken within 1 km of your destination");
            }
            Command::Stop => {
                if self.monitor.stop() {
                    self.display.clear_marker(MarkerRole::Destination);
                    self.notice("Alarm stopped. Have a great day!");
                }
            }
            Command::Cancel => {
                if self.monitor.cancel() {
                    if self.monitor.destination().is_none() {
                        self.display.clear_marker(MarkerRole::Destination);
                    }
                    self.notice("Monitoring cancelled");
                }
            }
            Command::Status => {
                let snapshot = self.monitor.snapshot();
                self.display.render(&mut self.out, &snapshot)?;
            }
            Command::Help => self.notice(HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn choose(&mut self, destination: Destination) -> DestinationChange {
        let point = destination.point;
        let change = self.monitor.set_destination(destination);
        match change {
            DestinationChange::Accepted => {
                self.display.place_marker(MarkerRole::Destination, point);
                let label = self.monitor.destination().map(Destination::label).unwrap_or_default();
                self.notice(format!("Destination: {}", label));
            }
            DestinationChange::Unchanged => {}
            DestinationChange::Locked => {
                self.notice("The destination is locked while the alarm is set; stop or cancel first")
            }
        }
        change
    }

    /// Run a lookup in the background; the result comes back through
    /// [`on_lookup`](Self::on_lookup)
    fn spawn_search(&mut self, query: String) {
        if query.trim().is_empty() {
            return;
        }

        let resolver = Arc::clone(&self.resolver);
        let tx = self.lookup_tx.clone();
        let near = self.search_bias();
        self.notice(format!("Searching for \"{}\"...", query.trim()));

        tokio::spawn(async move {
            let result = resolver.submit(&query, near).await;
            // The session may be gone already
            let _ = tx.send(result);
        });
    }

    /// Look a place up and wait for the answer
    pub async fn search_now(&mut self, query: &str) -> Result<()> {
        let result = self.resolver.submit(query, self.search_bias()).await;
        self.on_lookup(result)
    }

    pub fn on_lookup(&mut self, result: Result<Lookup>) -> Result<()> {
        let outcome = match result? {
            Lookup::Found(outcome) => outcome,
            Lookup::Skipped | Lookup::Stale => return Ok(()),
        };

        for (i, place) in outcome.candidates().iter().enumerate() {
            self.notice(format!("  {}. {}", i + 1, place.display_name));
        }
        if !outcome.alternatives().is_empty() {
            self.notice("Using match 1; `pick N` for another");
        }

        let best = outcome.accept();
        let point = best.point;
        if self.choose(best) != DestinationChange::Locked {
            self.display.center_on(point, DEFAULT_ZOOM);
            self.last_search = Some(outcome);
        }
        Ok(())
    }

    pub fn on_position(&mut self, event: SourceEvent) -> Result<()> {
        let update = self.monitor.handle_event(event)?;
        if update == MonitorUpdate::Ignored {
            return Ok(());
        }

        if let Some(point) = self.monitor.current_position().map(|sample| sample.point) {
            self.display.place_marker(MarkerRole::Current, point);
            if !self.centered {
                self.display.center_on(point, DEFAULT_ZOOM);
                self.centered = true;
            }
        }

        let line = TerminalDisplay::status_line(&self.monitor.snapshot());
        self.notice(line);

        if let MonitorUpdate::AlarmTriggered { .. } = update {
            self.notice("You are close to your destination! Type `stop` to silence the alarm");
        }
        Ok(())
    }

    /// Drive the session until `quit`, Ctrl+C, or end of input while idle.
    /// Monitoring is stopped on the way out.
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.on_position(event) {
                        self.report(&e);
                    }
                }
                Some(result) = self.lookup_rx.recv() => {
                    if let Err(e) = self.on_lookup(result) {
                        self.report(&e);
                    }
                }
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match line.parse::<Command>().and_then(|command| self.apply(command)) {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Quit) => break,
                            Err(e) => self.report(&e),
                        }
                    }
                    Ok(None) => {
                        input_open = false;
                        tracing::debug!("Command input closed");
                        if !self.monitor.is_monitoring() {
                            break;
                        }
                    }
                    Err(e) => {
                        input_open = false;
                        tracing::warn!("Failed to read command input: {}", e);
                    }
                },
                _ = &mut shutdown => {
                    self.notice("Interrupted");
                    break;
                }
            }
        }

        if self.monitor.stop() {
            tracing::info!("Monitoring stopped on exit");
        }
        Ok(())
    }
}
