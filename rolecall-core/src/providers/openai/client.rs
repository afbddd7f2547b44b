//! OpenAI client implementation

use super::converter::{from_openai_response, to_openai_request};
use super::streaming::translate_stream;
use super::types::OpenAIResponse;
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
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI Chat Completions provider
pub struct OpenAIProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    organization: Option<String>,
    project: Option<String>,
    extra_headers: HashMap<String, String>,
    http: HttpClient,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
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
            organization: config.organization.clone(),
            project: config.project.clone(),
            extra_headers: config.headers.clone(),
            http,
        })
    }

    /// Build request headers
    fn build_headers(&self, options: &RequestOptions) -> ProviderResult<HeaderMap> {
        let mut auth = vec![(
            "authorization",
            format!("Bearer {}", self.api_key.expose_secret()),
        )];

        if let Some(org_id) = &self.organization {
            auth.push(("openai-organization", org_id.clone()));
        }
        if let Some(project) = &self.project {
            auth.push(("openai-project", project.clone()));
        }

        HttpClient::build_headers(&auth, &self.extra_headers, options)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<CompletionResponse> {
        debug!(
            provider = %self.name,
            model = %request.model,
            "Sending chat completion [request_id: {}]",
            options.request_id
        );

        let body = to_openai_request(request, false);
        let url = endpoint_url(&self.base_url, "chat/completions");
        let headers = self.build_headers(options)?;

        let response = self.http.post_json(&url, headers, &body, options).await?;
        let wire: OpenAIResponse = self.http.read_json(response, options).await?;

        from_openai_response(wire)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<ChunkStream> {
        debug!(
            provider = %self.name,
            model = %request.model,
            "Opening chat completion stream [request_id: {}]",
            options.request_id
        );

        let body = to_openai_request(request, true);
        let url = endpoint_url(&self.base_url, "chat/completions");
        let mut headers = self.build_headers(options)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self.http.post_json(&url, headers, &body, options).await?;
        Ok(translate_stream(decode_response(response, options.clone())))
    }

    async fn health_check(&self) -> ProviderResult<()> {
        // A models list request checks connectivity and credentials
        let options = RequestOptions::default().with_timeout(HEALTH_CHECK_TIMEOUT);
        let url = endpoint_url(&self.base_url, "models");
        let headers = self.build_headers(&options)?;

        self.http.get(&url, headers, &options).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_rejected() {
        let err = OpenAIProvider::new("openai", &ProviderConfig::new(""), HttpClient::new().unwrap())
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_headers_include_org_and_project() {
        let mut config = ProviderConfig::new("sk-test");
        config.organization = Some("org-1".to_string());
        config.project = Some("proj-9".to_string());
        let provider = OpenAIProvider::new("openai", &config, HttpClient::new().unwrap()).unwrap();

        let headers = provider.build_headers(&RequestOptions::default()).unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(headers["openai-organization"], "org-1");
        assert_eq!(headers["openai-project"], "proj-9");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }
}
