pub mod availability;
pub mod cache;
pub mod doctor;
pub mod plan;
pub mod recommend;
pub mod search;

use escapist_agent::{Guide, LoopSettings, Reservationist};
use escapist_cache::FileCache;
use escapist_config::{AppConfig, ConfigError};
use escapist_core::error::Error;
use escapist_core::provider::Provider;
use escapist_providers::AnthropicProvider;
use escapist_tools::{DirectorySearchTool, McpBrowserHost, MortyClient, NominatimGeocoder};
use std::sync::Arc;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(config_error)?)
}

fn config_error(e: ConfigError) -> Error {
    Error::Config { message: e.to_string() }
}

/// Print setup instructions when no key is configured. Returns whether a
/// key is available.
pub fn check_api_key(config: &AppConfig) -> bool {
    if config.has_api_key() {
        return true;
    }
    eprintln!();
    eprintln!("  No API key configured.");
    eprintln!();
    eprintln!("  Set ANTHROPIC_API_KEY (or ESCAPIST_API_KEY) in your environment or .env file,");
    eprintln!("  or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    false
}

pub fn file_cache(config: &AppConfig) -> FileCache {
    FileCache::new(config.cache.dir.clone()).with_ttl(config.cache.ttl())
}

pub fn search_tool(config: &AppConfig) -> Result<DirectorySearchTool, Box<dyn std::error::Error>> {
    Ok(DirectorySearchTool::new(
        Arc::new(NominatimGeocoder::new(&config.geocoder)?),
        Arc::new(MortyClient::new(&config.directory)?),
        Arc::new(file_cache(config)),
    ))
}

pub fn provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    Ok(Arc::new(AnthropicProvider::from_config(config)?))
}

pub fn guide(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Guide, Box<dyn std::error::Error>> {
    Ok(Guide::new(provider, LoopSettings::from_config(config), search_tool(config)?))
}

pub fn reservationist(config: &AppConfig, provider: Arc<dyn Provider>) -> Reservationist {
    Reservationist::new(
        Some(provider),
        LoopSettings::from_config(config),
        Arc::new(McpBrowserHost::new(&config.browser)),
    )
}
