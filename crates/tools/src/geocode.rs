//! Place-name geocoding.

use async_trait::async_trait;
use escapist_config::GeocoderConfig;
use escapist_core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Formatted address of the match
    pub address: String,
}

/// Resolves free-text place names to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no such place.
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>, ToolError>;
}

/// OpenStreetMap Nominatim search endpoint.
pub struct NominatimGeocoder {
    url: String,
    user_agent: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| upstream(format!("HTTP client: {e}")))?;

        Ok(Self {
            url: config.url.clone(),
            user_agent: config.user_agent.clone(),
            client,
        })
    }
}

fn upstream(reason: impl Into<String>) -> ToolError {
    ToolError::Upstream {
        service: "geocoder".into(),
        reason: reason.into(),
    }
}

fn parse_place(place: NominatimPlace) -> Result<GeoPoint, ToolError> {
    let latitude = place
        .lat
        .parse::<f64>()
        .map_err(|e| upstream(format!("bad latitude '{}': {e}", place.lat)))?;
    let longitude = place
        .lon
        .parse::<f64>()
        .map_err(|e| upstream(format!("bad longitude '{}': {e}", place.lon)))?;

    Ok(GeoPoint {
        latitude,
        longitude,
        address: place.display_name,
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>, ToolError> {
        debug!(place, "Geocoding");

        let response = self
            .client
            .get(&self.url)
            .header("User-Agent", &self.user_agent)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("HTTP {status}")));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| upstream(format!("unreadable response: {e}")))?;

        places.into_iter().next().map(parse_place).transpose()
    }
}
