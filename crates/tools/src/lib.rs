//! Tools exposed to the Escapist agents.
//!
//! - [`DirectorySearchTool`]: geocode a region, then query the escape-room
//!   directory through the freshness cache.
//! - [`browser`]: an allow-listed bridge onto a browser automation host.

pub mod browser;
pub mod directory;
pub mod directory_search;
pub mod geocode;
pub mod listing;

pub use browser::{
    ALLOWED_BROWSER_TOOLS, BrowserCallResult, BrowserLauncher, BrowserSession, BrowserTool,
    BrowserToolSpec, McpBrowserHost, browser_registry,
};
pub use directory::{DirectoryApi, MortyClient};
pub use directory_search::{DirectorySearchTool, SearchError};
pub use geocode::{GeoPoint, Geocoder, NominatimGeocoder};
pub use listing::{Listing, listings_from_response};
