//! Error types for the Escapist domain.
//!
//! One enum per bounded context. Only provider failures and configuration
//! problems are folded into the top-level [`Error`]: an agent run returns
//! provider failures, the CLI reports configuration problems, and tool and
//! cache failures are recovered where they occur.

use thiserror::Error;

/// The top-level error type for all Escapist operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether this failure is the provider telling us to slow down.
    ///
    /// Both the typed variant and a raw HTTP 429 count; everything else is
    /// an unexpected failure that the control loop does not retry.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::ApiError { status_code: 429, .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Upstream service unavailable: {service}: {reason}")]
    Upstream { service: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be read or written.
    ///
    /// Callers treat this as "no cache" and go to the source instead.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache entry for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}
