// src/geocode.rs
//! Place search against a Nominatim-compatible geocoder

use crate::{
    error::{ProximityError, Result},
    geo::{GeoPoint, Viewbox},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "ProximityAlarm/0.1 (Rust wake-me-near-destination alarm)";

/// One geocoder match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub display_name: String,
    pub point: GeoPoint,
}

/// Free-text place lookup.
///
/// Transport and decoding failures are reported as `SearchFailed`. An empty
/// result list is not an error at this level.
pub trait Geocoder {
    fn search(
        &self,
        query: &str,
        viewbox: Option<Viewbox>,
    ) -> impl Future<Output = Result<Vec<Place>>> + Send;
}

/// Raw Nominatim search hit; coordinates arrive as strings
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

/// Decode a Nominatim `format=json` search response.
///
/// Entries with unreadable or out-of-range coordinates are skipped.
pub fn parse_nominatim_response(body: &str) -> Result<Vec<Place>> {
    let raw: Vec<NominatimPlace> = serde_json::from_str(body)
        .map_err(|e| ProximityError::SearchFailed(format!("Unreadable geocoder response: {}", e)))?;

    let places = raw
        .into_iter()
        .filter_map(|hit| {
            let lat = hit.lat.parse::<f64>().ok()?;
            let lon = hit.lon.parse::<f64>().ok()?;
            match GeoPoint::new(lat, lon) {
                Ok(point) => Some(Place {
                    display_name: hit.display_name,
                    point,
                }),
                Err(e) => {
                    tracing::debug!("Skipping geocoder hit {}: {}", hit.display_name, e);
                    None
                }
            }
        })
        .collect();

    Ok(places)
}

/// HTTP client for Nominatim's `/search` endpoint
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    limit: usize,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProximityError::SearchFailed(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit: limit.max(1),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str, viewbox: Option<Viewbox>) -> Result<Vec<Place>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(viewbox) = viewbox {
            params.push(("viewbox", viewbox.to_query_value()));
        }

        tracing::debug!(query, ?viewbox, "Geocoder request");

        let response = self
            .client
            .get(self.search_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| ProximityError::SearchFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProximityError::SearchFailed(format!(
                "HTTP {} from geocoder",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProximityError::SearchFailed(format!("Failed to read response: {}", e)))?;

        let places = parse_nominatim_response(&body)?;
        tracing::debug!(query, count = places.len(), "Geocoder response");
        Ok(places)
    }
}
