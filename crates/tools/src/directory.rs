//! Client for the escape-room directory (Morty GraphQL API).
//!
//! One POST per search: a fixed query document plus the coordinates and
//! filters as variables. Any non-2xx status, or a GraphQL `errors` array
//! without `data`, is a hard error.

use async_trait::async_trait;
use escapist_config::DirectoryConfig;
use escapist_core::error::ToolError;
use std::time::Duration;
use tracing::{debug, warn};

/// Fields requested for every listing. [`crate::listing`] reads this shape.
pub const GAMES_QUERY: &str = r#"query Games(
  $client: String
  $distance: Int
  $filters: GameFilters
  $isUser: Boolean
  $lat: Float!
  $lng: Float!
  $groupByLocation: Boolean
  $pageSize: Int
  $sortBy: GameSort
) {
  games(
    client: $client
    distance: $distance
    filters: $filters
    isUser: $isUser
    lat: $lat
    lng: $lng
    groupByLocation: $groupByLocation
    pageSize: $pageSize
    sortBy: $sortBy
  ) {
    items {
      name
      description
      minutes
      minAge
      playersMin
      playersMax
      difficulty
      category
      isScary
      company { name url }
      location { address latitude longitude }
      communityScore { bucket ratingsCount likePercent lovePercent dislikePercent }
      awards { description }
    }
  }
}"#;

/// The directory collaborator: coordinates in, raw response document out.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn search(&self, latitude: f64, longitude: f64) -> Result<serde_json::Value, ToolError>;
}

pub struct MortyClient {
    url: String,
    page_size: u32,
    distance_miles: u32,
    client: reqwest::Client,
}

impl MortyClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| upstream(format!("HTTP client: {e}")))?;

        Ok(Self {
            url: config.graphql_url.clone(),
            page_size: config.page_size,
            distance_miles: config.distance_miles,
            client,
        })
    }

    /// The GraphQL request body for a search around `(latitude, longitude)`.
    pub fn request_body(&self, latitude: f64, longitude: f64) -> serde_json::Value {
        serde_json::json!({
            "operationName": "Games",
            "variables": {
                "client": "webapp",
                "distance": self.distance_miles,
                "filters": { "status": ["COMING_SOON", "OPEN"] },
                "isUser": false,
                "lat": latitude,
                "lng": longitude,
                "groupByLocation": false,
                "pageSize": self.page_size,
                "sortBy": "COMMUNITY_SCORE",
            },
            "query": GAMES_QUERY,
        })
    }
}

fn upstream(reason: impl Into<String>) -> ToolError {
    ToolError::Upstream {
        service: "directory".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl DirectoryApi for MortyClient {
    async fn search(&self, latitude: f64, longitude: f64) -> Result<serde_json::Value, ToolError> {
        debug!(latitude, longitude, page_size = self.page_size, "Querying directory");

        let response = self
            .client
            .post(&self.url)
            .header("accept", "*/*")
            .json(&self.request_body(latitude, longitude))
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Directory API error");
            return Err(upstream(format!("HTTP {status}: {body}")));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| upstream(format!("unreadable response: {e}")))?;

        if document.get("data").is_none_or(|d| d.is_null()) {
            let errors = document
                .get("errors")
                .map(|e| e.to_string())
                .unwrap_or_else(|| "response has no data".into());
            return Err(upstream(errors));
        }

        Ok(document)
    }
}
