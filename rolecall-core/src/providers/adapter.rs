//! Provider adapter trait and the built-in provider types
//!
//! Defines the core abstraction every LLM back-end implements. Adapters
//! translate normalized requests to a wire format, perform the HTTP call and
//! translate the response (or stream) back.

use crate::config::ProviderConfig;
use crate::http::{HttpClient, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::{AnthropicProvider, OpenAIProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

/// Stream of normalized chunks returned by [`Provider::complete_stream`]
pub type ChunkStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Core provider trait that all LLM back-ends must implement
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured name of this provider instance
    fn name(&self) -> &str;

    /// Wire format spoken by this provider
    fn provider_type(&self) -> ProviderType;

    /// Perform one non-streaming completion
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<CompletionResponse>;

    /// Perform one streaming completion
    ///
    /// Errors before the first byte (status, transport) are returned directly;
    /// read errors after that surface as stream items.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<ChunkStream>;

    /// Check connectivity and credentials by listing models
    async fn health_check(&self) -> ProviderResult<()>;
}

/// Built-in provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAI,
}

impl ProviderType {
    /// All built-in types
    pub fn all() -> &'static [ProviderType] {
        &[ProviderType::Anthropic, ProviderType::OpenAI]
    }

    /// Type tag used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => "anthropic",
            ProviderType::OpenAI => "openai",
        }
    }

    /// Create a provider instance for this type
    pub fn create_provider(
        &self,
        name: &str,
        config: &ProviderConfig,
        http: &HttpClient,
    ) -> ProviderResult<Arc<dyn Provider>> {
        Ok(match self {
            ProviderType::Anthropic => {
                Arc::new(AnthropicProvider::new(name, config, http.clone())?)
            }
            ProviderType::OpenAI => Arc::new(OpenAIProvider::new(name, config, http.clone())?),
        })
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            other => Err(ProviderError::Configuration(format!(
                "Unknown provider type '{}'",
                other
            ))),
        }
    }
}

/// Join a configured base URL with an endpoint path
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
