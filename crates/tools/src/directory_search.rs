//! `search_escape_rooms`: geocode a region, then return its listings from
//! the freshness cache or, on a miss, from one directory query.
//!
//! Failures never escape as errors to the control loop. A region that cannot
//! be geocoded, or a directory outage, comes back as a failed [`ToolResult`]
//! whose text tells the model what went wrong. Cache trouble is logged and
//! treated as a miss.

use async_trait::async_trait;
use escapist_core::cache::CacheStore;
use escapist_core::error::ToolError;
use escapist_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::directory::DirectoryApi;
use crate::geocode::Geocoder;
use crate::listing::{Listing, listings_from_response};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Could not find coordinates for '{0}'. Try a more specific location.")]
    UnknownRegion(String),

    #[error("Error searching for escape rooms: {0}")]
    Geocoding(ToolError),

    #[error("API error searching for escape rooms: {0}")]
    Directory(ToolError),
}

pub struct DirectorySearchTool {
    geocoder: Arc<dyn Geocoder>,
    directory: Arc<dyn DirectoryApi>,
    cache: Arc<dyn CacheStore>,
}

impl DirectorySearchTool {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        directory: Arc<dyn DirectoryApi>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            geocoder,
            directory,
            cache,
        }
    }

    /// Cache key for a region's listings.
    pub fn cache_key(region: &str) -> String {
        format!("{region}_escape_rooms")
    }

    async fn cached(&self, key: &str) -> Option<Vec<Listing>> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_value(payload) {
                Ok(listings) => Some(listings),
                Err(e) => {
                    warn!(key, error = %e, "Cached listings unreadable, refetching");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, cache = self.cache.name(), error = %e, "Cache read failed, refetching");
                None
            }
        }
    }

    /// Listings for `region`.
    pub async fn search(&self, region: &str) -> Result<Vec<Listing>, SearchError> {
        let point = self
            .geocoder
            .geocode(region)
            .await
            .map_err(SearchError::Geocoding)?
            .ok_or_else(|| SearchError::UnknownRegion(region.to_string()))?;

        info!(
            region,
            address = %point.address,
            latitude = point.latitude,
            longitude = point.longitude,
            "Searching near"
        );

        let key = Self::cache_key(region);
        if let Some(listings) = self.cached(&key).await {
            debug!(key, count = listings.len(), "Using cached listings");
            return Ok(listings);
        }

        let response = self
            .directory
            .search(point.latitude, point.longitude)
            .await
            .map_err(SearchError::Directory)?;
        let listings = listings_from_response(&response);
        info!(region, count = listings.len(), "Fetched listings from directory");

        match serde_json::to_value(&listings) {
            Ok(payload) => {
                if let Err(e) = self.cache.put(&key, payload).await {
                    warn!(key, error = %e, "Cache write failed, continuing uncached");
                }
            }
            Err(e) => warn!(key, error = %e, "Listings not serializable for cache"),
        }

        Ok(listings)
    }
}

#[async_trait]
impl Tool for DirectorySearchTool {
    fn name(&self) -> &str {
        "search_escape_rooms"
    }

    fn description(&self) -> &str {
        "Search for escape rooms in a specific region. Returns listings with company name, \
         booking URL, address, community rating, awards, duration, player counts, \
         difficulty and category."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "region": {
                    "type": "string",
                    "description": "The region or city to search (e.g., \"Boston\")"
                }
            },
            "required": ["region"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let region = arguments["region"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'region' argument".into()))?;

        match self.search(region).await {
            Ok(listings) => {
                let encode = |e: serde_json::Error| ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: e.to_string(),
                };
                let data = serde_json::to_value(&listings).map_err(encode)?;
                let output = serde_json::to_string_pretty(&listings).map_err(encode)?;
                Ok(ToolResult::ok(output).with_data(data))
            }
            Err(e) => {
                warn!(region, error = %e, "Escape room search failed");
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }
}
