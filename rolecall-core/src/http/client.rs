//! HTTP client implementation using reqwest

use crate::config::redact_by_field_name;
use crate::http::error::{classify_status, map_transport_error};
use crate::http::RequestOptions;
use crate::providers::{ProviderError, ProviderResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Maximum response size accepted for a non-streaming body
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Default user agent
const USER_AGENT: &str = concat!("rolecall/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: Arc<Client>,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> ProviderResult<Self> {
        Self::with_config(Duration::from_secs(10), 10)
    }

    /// Create a new HTTP client with custom pool settings
    ///
    /// Request timeouts are applied per call from [`RequestOptions`].
    pub fn with_config(connect_timeout: Duration, max_idle_per_host: usize) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// Build a header map from adapter auth headers and configured extras
    ///
    /// Configured extras are applied last and may override adapter headers.
    pub fn build_headers(
        auth: &[(&str, String)],
        extra: &HashMap<String, String>,
        options: &RequestOptions,
    ) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let pairs = auth
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .chain(extra.iter().map(|(n, v)| (n.as_str(), v.as_str())));

        for (name, value) in pairs {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProviderError::Configuration(format!("Invalid header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                ProviderError::Configuration(format!(
                    "Invalid value for header '{}': {}",
                    name,
                    redact_by_field_name(name, value)
                ))
            })?;
            headers.insert(header_name, header_value);
        }

        // Add request ID header for correlation
        if let Ok(value) = HeaderValue::from_str(&options.request_id.to_string()) {
            headers.insert("x-request-id", value);
        }

        Ok(headers)
    }

    /// POST a JSON body and return the response once its status is 2xx
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        let request_id = options.request_id;
        debug!("POST {} [request_id: {}]", url, request_id);

        let builder = self
            .client
            .post(url)
            .headers(headers)
            .timeout(options.timeout)
            .json(body);

        self.send(builder, options).await
    }

    /// GET a URL and return the response once its status is 2xx
    pub async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        debug!("GET {} [request_id: {}]", url, options.request_id);

        let builder = self.client.get(url).headers(headers).timeout(options.timeout);
        self.send(builder, options).await
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        let request_id = options.request_id;

        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(e, options.timeout, request_id))?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            // Capture headers for retry-after parsing
            let headers = response.headers().clone();

            // Try to get response body for error details
            let body = response.text().await.ok();

            warn!(
                "Request failed with status {} [request_id: {}]",
                status, request_id
            );

            return Err(classify_status(status, &headers, body, request_id));
        }

        Ok(response)
    }

    /// Read a successful response body and decode it as JSON
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        options: &RequestOptions,
    ) -> ProviderResult<T> {
        let request_id = options.request_id;

        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_size {
                return Err(ProviderError::provider(format!(
                    "Response size {} exceeds maximum {} [request_id: {}]",
                    content_length, self.max_response_size, request_id
                )));
            }
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_ms: options.timeout_ms(),
                }
            } else {
                ProviderError::provider(format!(
                    "Failed to read response body: {} [request_id: {}]",
                    e, request_id
                ))
            }
        })?;

        if text.len() > self.max_response_size {
            return Err(ProviderError::provider(format!(
                "Response size {} exceeds maximum {} [request_id: {}]",
                text.len(),
                self.max_response_size,
                request_id
            )));
        }

        let parsed = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse response [request_id: {}]: {}", request_id, e);
            ProviderError::provider(format!(
                "Invalid response format: {} [request_id: {}]",
                e, request_id
            ))
        })?;

        info!("Request completed successfully [request_id: {}]", request_id);
        Ok(parsed)
    }
}
