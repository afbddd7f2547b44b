//! Anthropic client implementation

use super::converter::{from_anthropic_response, to_anthropic_request};
use super::streaming::translate_stream;
use super::types::AnthropicResponse;
use crate::config::{ProviderConfig, SecretString};
use crate::http::{HttpClient, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse};
use crate::providers::adapter::endpoint_url;
use crate::providers::sse::decode_response;
use crate::providers::{ChunkStream, Provider, ProviderError, ProviderResult, ProviderType};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version sent with every request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    extra_headers: HashMap<String, String>,
    http: HttpClient,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(name: &str, config: &ProviderConfig, http: HttpClient) -> ProviderResult<Self> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "Provider '{}' has no API key",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            extra_headers: config.headers.clone(),
            http,
        })
    }

    fn build_headers(&self, options: &RequestOptions) -> ProviderResult<HeaderMap> {
        let auth = [
            ("x-api-key", self.api_key.expose_secret().to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];
        HttpClient::build_headers(&auth, &self.extra_headers, options)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<CompletionResponse> {
        debug!(
            provider = %self.name,
            model = %request.model,
            "Sending messages request [request_id: {}]",
            options.request_id
        );

        let body = to_anthropic_request(request, false);
        let url = endpoint_url(&self.base_url, "messages");
        let headers = self.build_headers(options)?;

        let response = self.http.post_json(&url, headers, &body, options).await?;
        let wire: AnthropicResponse = self.http.read_json(response, options).await?;

        Ok(from_anthropic_response(wire))
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<ChunkStream> {
        debug!(
            provider = %self.name,
            model = %request.model,
            "Opening messages stream [request_id: {}]",
            options.request_id
        );

        let body = to_anthropic_request(request, true);
        let url = endpoint_url(&self.base_url, "messages");
        let mut headers = self.build_headers(options)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self.http.post_json(&url, headers, &body, options).await?;
        Ok(translate_stream(decode_response(response, options.clone())))
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let options = RequestOptions::default().with_timeout(HEALTH_CHECK_TIMEOUT);
        let url = endpoint_url(&self.base_url, "models");
        let headers = self.build_headers(&options)?;

        self.http.get(&url, headers, &options).await?;
        Ok(())
    }
}
