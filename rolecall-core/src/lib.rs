//! Rolecall Core Library
//!
//! Role-based routing for LLM back-ends: callers name a role, the router
//! resolves it to a provider and model, translates the request to that
//! provider's wire format and calls it behind a circuit breaker and retry
//! policy, with one fallback hop on failure.

pub mod config;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod router;
pub mod telemetry;

pub use config::Config;
pub use providers::{Provider, ProviderError, ProviderResult, ProviderType};
pub use router::{AgentConfig, AgentResponse, InvokeRequest, RoleResolver, RouterEngine};

/// Returns the version of the Rolecall Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
