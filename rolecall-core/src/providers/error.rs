//! Provider error types and handling

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when routing to or calling an LLM provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Bad or missing settings (unknown role, unknown provider, bad key)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic provider failure, optionally carrying the HTTP status
    #[error("Provider error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Provider {
        message: String,
        status: Option<u16>,
    },

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Authentication failed (HTTP 401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Client-side timeout
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The provider's circuit breaker refused to dispatch
    #[error("Circuit open for provider '{provider}', retry after {retry_after_ms}ms")]
    CircuitOpen {
        provider: String,
        retry_after_ms: u64,
    },
}

impl ProviderError {
    /// Generic provider failure without an HTTP status
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: None,
        }
    }

    /// Generic provider failure with an HTTP status
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Provider {
            message: message.into(),
            status: Some(status),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Short stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Provider { .. } => "provider",
            Self::RateLimit { .. } => "rate_limit",
            Self::Authentication(_) => "authentication",
            Self::Timeout { .. } => "timeout",
            Self::CircuitOpen { .. } => "circuit_open",
        }
    }
}

impl From<ConfigError> for ProviderError {
    fn from(err: ConfigError) -> Self {
        ProviderError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::provider(format!("Failed to parse response: {}", err))
    }
}
