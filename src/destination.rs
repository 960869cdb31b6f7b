// src/destination.rs
//! Destinations and the resolver that turns map taps and place searches into them

use crate::{
    error::{ProximityError, Result},
    geo::{distance, GeoPoint, Viewbox},
    geocode::{Geocoder, Place},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Queries shorter than this (after trimming) never trigger a suggestion fetch
pub const SUGGEST_MIN_CHARS: usize = 3;

/// Half width of the search bias box around the current position, roughly 100 km
pub const VIEWBOX_HALF_SPAN_DEG: f64 = 0.9;

/// Where a destination came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Provenance {
    MapTap,
    SearchResult { display_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub point: GeoPoint,
    pub provenance: Provenance,
}

impl Destination {
    pub fn map_tap(point: GeoPoint) -> Self {
        Self {
            point,
            provenance: Provenance::MapTap,
        }
    }

    pub fn from_place(place: &Place) -> Self {
        Self {
            point: place.point,
            provenance: Provenance::SearchResult {
                display_name: place.display_name.clone(),
            },
        }
    }

    /// Human readable name for status output
    pub fn label(&self) -> String {
        match &self.provenance {
            Provenance::MapTap => format!("pinned point ({})", self.point),
            Provenance::SearchResult { display_name } => display_name.clone(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Identifies one lookup; only the most recent ticket's results are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// Ranked matches for one query. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub ticket: SearchTicket,
    pub query: String,
    candidates: Vec<Place>,
}

impl SearchOutcome {
    /// The default accept target
    pub fn best(&self) -> &Place {
        &self.candidates[0]
    }

    /// Everything after the best match, for manual selection
    pub fn alternatives(&self) -> &[Place] {
        &self.candidates[1..]
    }

    pub fn candidates(&self) -> &[Place] {
        &self.candidates
    }

    pub fn accept(&self) -> Destination {
        Destination::from_place(self.best())
    }

    /// Pick a candidate by its position in [`candidates`](Self::candidates)
    pub fn select(&self, index: usize) -> Option<Destination> {
        self.candidates.get(index).map(Destination::from_place)
    }
}

/// Result of asking the resolver for a lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(SearchOutcome),
    /// Nothing was fetched: empty query, or too short for a suggestion
    Skipped,
    /// A newer lookup started while this one was in flight
    Stale,
}

/// Orders candidates nearest first when a reference position is known.
/// The sort is stable, so ties and the no-position case keep geocoder order.
pub fn rank_candidates(places: &mut [Place], near: Option<GeoPoint>) {
    if let Some(origin) = near {
        places.sort_by(|a, b| {
            distance(origin, a.point).total_cmp(&distance(origin, b.point))
        });
    }
}

pub fn should_suggest(query: &str) -> bool {
    query.trim().chars().count() >= SUGGEST_MIN_CHARS
}

/// Normalizes map taps and place searches into destinations
pub struct DestinationResolver<G> {
    geocoder: G,
    latest: AtomicU64,
}

impl<G: Geocoder> DestinationResolver<G> {
    pub fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            latest: AtomicU64::new(0),
        }
    }

    pub fn from_map_click(&self, point: GeoPoint) -> Destination {
        Destination::map_tap(point)
    }

    /// Whether `ticket` belongs to the most recently started lookup
    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// Type-ahead lookup: only fetches for queries of at least three characters
    pub async fn suggest(&self, query: &str, near: Option<GeoPoint>) -> Result<Lookup> {
        if !should_suggest(query) {
            return Ok(Lookup::Skipped);
        }
        self.lookup(query.trim(), near).await
    }

    /// Explicit submit: any non-blank query is looked up
    pub async fn submit(&self, query: &str, near: Option<GeoPoint>) -> Result<Lookup> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Lookup::Skipped);
        }
        self.lookup(query, near).await
    }

    async fn lookup(&self, query: &str, near: Option<GeoPoint>) -> Result<Lookup> {
        let ticket = SearchTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1);
        let viewbox = near.map(|p| Viewbox::around(p, VIEWBOX_HALF_SPAN_DEG));

        let result = self.geocoder.search(query, viewbox).await;

        // A newer query owns the outcome, including its failures
        if !self.is_current(ticket) {
            tracing::debug!(query, "Discarding results of superseded search");
            return Ok(Lookup::Stale);
        }

        let mut places = result?;

        if places.is_empty() {
            return Err(ProximityError::LocationNotFound(query.to_string()));
        }

        rank_candidates(&mut places, near);
        Ok(Lookup::Found(SearchOutcome {
            ticket,
            query: query.to_string(),
            candidates: places,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    fn place(name: &str, lat: f64, lon: f64) -> Place {
        Place {
            display_name: name.to_string(),
            point: GeoPoint::new(lat, lon).unwrap(),
        }
    }

    /// Canned geocoder that records every call
    #[derive(Clone, Default)]
    struct FakeGeocoder {
        results: Vec<Place>,
        fail: bool,
        calls: Arc<Mutex<Vec<(String, Option<Viewbox>)>>>,
    }

    impl FakeGeocoder {
        fn with(results: Vec<Place>) -> Self {
            Self {
                results,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Option<Viewbox>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Geocoder for FakeGeocoder {
        async fn search(&self, query: &str, viewbox: Option<Viewbox>) -> Result<Vec<Place>> {
            self.calls.lock().unwrap().push((query.to_string(), viewbox));
            if self.fail {
                return Err(ProximityError::SearchFailed("connection reset".to_string()));
            }
            Ok(self.results.clone())
        }
    }

    fn springfields() -> Vec<Place> {
        vec![
            place("Springfield, Illinois", 39.7817, -89.6501),
            place("Springfield, Massachusetts", 42.1015, -72.5898),
            place("Springfield, Missouri", 37.2090, -93.2923),
        ]
    }

    #[tokio::test]
    async fn test_short_queries_do_not_fetch_suggestions() {
        let geocoder = FakeGeocoder::with(springfields());
        let resolver = DestinationResolver::new(geocoder.clone());

        assert_eq!(resolver.suggest("ab", None).await.unwrap(), Lookup::Skipped);
        assert!(geocoder.calls().is_empty());

        assert!(matches!(resolver.suggest("abc", None).await.unwrap(), Lookup::Found(_)));
        assert_eq!(geocoder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_short_query_still_submits() {
        let geocoder = FakeGeocoder::with(springfields());
        let resolver = DestinationResolver::new(geocoder.clone());

        assert!(matches!(resolver.submit("ab", None).await.unwrap(), Lookup::Found(_)));
        assert_eq!(geocoder.calls()[0].0, "ab");
    }

    #[tokio::test]
    async fn test_blank_query_is_noop() {
        let geocoder = FakeGeocoder::with(springfields());
        let resolver = DestinationResolver::new(geocoder.clone());

        assert_eq!(resolver.submit("", None).await.unwrap(), Lookup::Skipped);
        assert_eq!(resolver.submit("   \t", None).await.unwrap(), Lookup::Skipped);
        assert_eq!(resolver.suggest("     ", None).await.unwrap(), Lookup::Skipped);
        assert!(geocoder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_native_order_without_position() {
        let resolver = DestinationResolver::new(FakeGeocoder::with(springfields()));

        let Lookup::Found(outcome) = resolver.submit("springfield", None).await.unwrap() else {
            panic!("expected results");
        };
        assert_eq!(outcome.best().display_name, "Springfield, Illinois");
        assert_eq!(outcome.alternatives().len(), 2);
    }

    #[tokio::test]
    async fn test_ranked_by_distance_and_biased_near_position() {
        let geocoder = FakeGeocoder::with(springfields());
        let resolver = DestinationResolver::new(geocoder.clone());
        let boston = GeoPoint::new(42.3601, -71.0589).unwrap();

        let Lookup::Found(outcome) = resolver.submit("springfield", Some(boston)).await.unwrap() else {
            panic!("expected results");
        };
        let names: Vec<_> = outcome.candidates().iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(
            names,
            ["Springfield, Massachusetts", "Springfield, Illinois", "Springfield, Missouri"]
        );

        let viewbox = geocoder.calls()[0].1.unwrap();
        assert!(viewbox.contains(boston));
        assert!((viewbox.max_lat - viewbox.min_lat - 1.8).abs() < 1e-9);

        let picked = outcome.select(2).unwrap();
        assert_eq!(picked.label(), "Springfield, Missouri");
        assert!(outcome.select(3).is_none());
        assert_eq!(outcome.accept().label(), "Springfield, Massachusetts");
    }

    #[tokio::test]
    async fn test_no_results_is_location_not_found() {
        let resolver = DestinationResolver::new(FakeGeocoder::with(Vec::new()));
        let err = resolver.submit("Atlantis", None).await.unwrap_err();
        assert!(matches!(err, ProximityError::LocationNotFound(q) if q == "Atlantis"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_search_failed() {
        let geocoder = FakeGeocoder {
            fail: true,
            ..FakeGeocoder::default()
        };
        let resolver = DestinationResolver::new(geocoder);
        let err = resolver.submit("Big Ben", None).await.unwrap_err();
        assert!(matches!(err, ProximityError::SearchFailed(_)));
    }

    /// Geocoder whose first call blocks until released
    struct GatedGeocoder {
        gate: Arc<Notify>,
        calls: Mutex<usize>,
        fail_first: bool,
    }

    impl Geocoder for GatedGeocoder {
        async fn search(&self, query: &str, _viewbox: Option<Viewbox>) -> Result<Vec<Place>> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls == 1
            };
            if first {
                self.gate.notified().await;
                if self.fail_first {
                    return Err(ProximityError::SearchFailed("connection reset".to_string()));
                }
            }
            Ok(vec![place(query, 1.0, 1.0)])
        }
    }

    #[tokio::test]
    async fn test_superseded_search_is_stale() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(DestinationResolver::new(GatedGeocoder {
            gate: Arc::clone(&gate),
            calls: Mutex::new(0),
            fail_first: false,
        }));

        let slow = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.submit("first", None).await })
        };
        tokio::task::yield_now().await;
        while *resolver.geocoder.calls.lock().unwrap() == 0 {
            tokio::task::yield_now().await;
        }

        let Lookup::Found(second) = resolver.submit("second", None).await.unwrap() else {
            panic!("expected results");
        };
        assert!(resolver.is_current(second.ticket));

        gate.notify_one();
        assert_eq!(slow.await.unwrap().unwrap(), Lookup::Stale);
    }

    #[tokio::test]
    async fn test_superseded_search_failure_is_stale() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(DestinationResolver::new(GatedGeocoder {
            gate: Arc::clone(&gate),
            calls: Mutex::new(0),
            fail_first: true,
        }));

        let slow = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.submit("first", None).await })
        };
        while *resolver.geocoder.calls.lock().unwrap() == 0 {
            tokio::task::yield_now().await;
        }

        let latest = resolver.submit("second", None).await.unwrap();
        assert!(matches!(latest, Lookup::Found(_)));

        gate.notify_one();
        assert_eq!(slow.await.unwrap().unwrap(), Lookup::Stale);
    }

    #[test]
    fn test_rank_keeps_order_on_ties() {
        let mut places = vec![place("a", 1.0, 0.0), place("b", -1.0, 0.0), place("c", 0.0, 5.0)];
        rank_candidates(&mut places, Some(GeoPoint::new(0.0, 0.0).unwrap()));
        let names: Vec<_> = places.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_destination_labels() {
        let point = GeoPoint::new(51.5007, -0.1246).unwrap();
        assert!(Destination::map_tap(point).label().contains("51.500700"));
        let from_search = Destination::from_place(&place("Big Ben", 51.5007, -0.1246));
        assert_eq!(from_search.to_string(), "Big Ben");
        assert_ne!(Destination::map_tap(point), from_search);
    }
}
