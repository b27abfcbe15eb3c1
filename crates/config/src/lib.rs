//! Configuration loading, validation, and management for Escapist.
//!
//! Loads configuration from `~/.escapist/config.toml` (or the file named by
//! `ESCAPIST_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.escapist/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used by all three agents
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Override for the Anthropic API base URL (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub geocoder: GeocoderConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub planner: PlannerConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .field("directory", &self.directory)
            .field("geocoder", &self.geocoder)
            .field("browser", &self.browser)
            .field("planner", &self.planner)
            .finish()
    }
}

/// Rate-limit retry policy shared by every agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,

    /// Symmetric jitter as a fraction of the delay (0.25 = ±25%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Shown to the user once retries are exhausted
    #[serde(default = "default_rate_limit_message")]
    pub rate_limit_message: String,
}

fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_secs() -> f64 {
    60.0
}
fn default_max_delay_secs() -> f64 {
    300.0
}
fn default_jitter() -> f64 {
    0.25
}
fn default_rate_limit_message() -> String {
    "Service temporarily unavailable due to rate limiting. Please try again later.".into()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            jitter: default_jitter(),
            rate_limit_message: default_rate_limit_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_ttl_days() -> u64 {
    30
}

impl CacheConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_days * 24 * 60 * 60)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_days: default_ttl_days(),
        }
    }
}

/// The escape-room directory (Morty GraphQL API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Search radius around the geocoded point
    #[serde(default = "default_distance_miles")]
    pub distance_miles: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_graphql_url() -> String {
    "https://api.mortyapp.com/graphql".into()
}
fn default_page_size() -> u32 {
    50
}
fn default_distance_miles() -> u32 {
    50
}
fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            page_size: default_page_size(),
            distance_miles: default_distance_miles(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_url")]
    pub url: String,

    /// Nominatim's usage policy requires an identifying user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".into()
}
fn default_user_agent() -> String {
    "escape-trip-planner".into()
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: default_geocoder_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// The browser automation host (an MCP server spoken to over stdio).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_command")]
    pub command: String,

    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,

    #[serde(default = "default_browser_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_browser_command() -> String {
    "npx".into()
}
fn default_browser_args() -> Vec<String> {
    vec!["@playwright/mcp@latest".into(), "--headless".into()]
}
fn default_browser_timeout_secs() -> u64 {
    120
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: default_browser_command(),
            args: default_browser_args(),
            request_timeout_secs: default_browser_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_num_days")]
    pub num_days: u32,

    #[serde(default = "default_group_size")]
    pub group_size: u32,

    #[serde(default = "default_itineraries_dir")]
    pub itineraries_dir: PathBuf,
}

fn default_num_days() -> u32 {
    4
}
fn default_group_size() -> u32 {
    4
}
fn default_itineraries_dir() -> PathBuf {
    PathBuf::from("itineraries")
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            num_days: default_num_days(),
            group_size: default_group_size(),
            itineraries_dir: default_itineraries_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, then apply the process
    /// environment.
    ///
    /// Environment variables:
    /// - `ESCAPIST_CONFIG`: alternate config file path
    /// - `ESCAPIST_API_KEY` (highest priority), then `ANTHROPIC_API_KEY`
    /// - `ESCAPIST_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("ESCAPIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env_key = lookup("ESCAPIST_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }

        if let Some(model) = lookup("ESCAPIST_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".escapist")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.base_delay_secs < 0.0 || self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_secs must be >= retry.base_delay_secs >= 0".into(),
            ));
        }

        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::ValidationError(
                "retry.jitter must be in [0.0, 1.0)".into(),
            ));
        }

        if self.cache.ttl_days == 0 {
            return Err(ConfigError::ValidationError("cache.ttl_days must be > 0".into()));
        }

        if self.planner.num_days == 0 {
            return Err(ConfigError::ValidationError("planner.num_days must be >= 1".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            anthropic_base_url: None,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            directory: DirectoryConfig::default(),
            geocoder: GeocoderConfig::default(),
            browser: BrowserConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
