//! HTTP error mapping utilities

use crate::providers::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Map a non-2xx status, its headers and body to a [`ProviderError`]
///
/// 401/403 become `Authentication`, 429 becomes `RateLimit` carrying the
/// parsed `Retry-After`, anything else becomes `Provider` with the status.
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: Option<String>,
    request_id: Uuid,
) -> ProviderError {
    let error_message = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_message(&v))
        .or_else(|| body.filter(|b| !b.trim().is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    // Include request ID in error message
    let message = format!("{} [request_id: {}]", error_message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_ms = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);

            ProviderError::RateLimit {
                message,
                retry_after_ms,
            }
        }

        status => ProviderError::with_status(message, status.as_u16()),
    }
}

/// Map a transport-level `reqwest` failure
pub fn map_transport_error(err: reqwest::Error, timeout: Duration, request_id: Uuid) -> ProviderError {
    if err.is_timeout() {
        warn!("Request timeout after {:?} [request_id: {}]", timeout, request_id);
        ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        warn!("Connection error [request_id: {}]: {}", request_id, err);
        ProviderError::provider(format!("Connection failed: {} [request_id: {}]", err, request_id))
    } else {
        warn!("Request error [request_id: {}]: {}", request_id, err);
        ProviderError::provider(format!("{} [request_id: {}]", err, request_id))
    }
}

/// Extract a human readable message from common error body shapes
fn extract_error_message(json: &Value) -> Option<String> {
    // OpenAI and Anthropic: { "error": { "message": "...", "type": "..." } }
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return Some(message.to_string());
    }

    // Generic format: { "message": "..." }
    if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }

    // { "error": "..." }
    json.get("error")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Parse a `Retry-After` header value into milliseconds
///
/// Accepts delta-seconds or an HTTP date; a date in the past yields 0.
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    let value = header_value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(remaining.num_milliseconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test_case(401 ; "unauthorized")]
    #[test_case(403 ; "forbidden")]
    fn test_auth_statuses(code: u16) {
        let status = StatusCode::from_u16(code).unwrap();
        let err = classify_status(status, &HeaderMap::new(), None, Uuid::new_v4());
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[test_case(400 ; "bad request")]
    #[test_case(404 ; "not found")]
    #[test_case(500 ; "internal")]
    #[test_case(503 ; "unavailable")]
    fn test_other_statuses_carry_status(code: u16) {
        let status = StatusCode::from_u16(code).unwrap();
        let err = classify_status(status, &HeaderMap::new(), None, Uuid::new_v4());
        assert_eq!(err.status(), Some(code));
        assert!(matches!(err, ProviderError::Provider { .. }));
    }

    #[test]
    fn test_rate_limit_with_retry_after_seconds() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("3"),
            None,
            Uuid::new_v4(),
        );
        match err {
            ProviderError::RateLimit { retry_after_ms, .. } => assert_eq!(retry_after_ms, Some(3000)),
            other => panic!("Expected RateLimit, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_without_header() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            None,
            Uuid::new_v4(),
        );
        assert!(matches!(err, ProviderError::RateLimit { retry_after_ms: None, .. }));
    }

    #[test]
    fn test_message_extracted_from_body() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens too large"}}"#;
        let request_id = Uuid::new_v4();
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            Some(body.to_string()),
            request_id,
        );
        let msg = err.to_string();
        assert!(msg.contains("max_tokens too large"));
        assert!(msg.contains(&request_id.to_string()));
    }

    #[test]
    fn test_parse_retry_after_formats() {
        assert_eq!(parse_retry_after("120"), Some(120_000));
        assert_eq!(parse_retry_after(" 0 "), Some(0));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), Some(0));
        assert_eq!(parse_retry_after("soon"), None);

        let future = (chrono::Utc::now() + chrono::Duration::seconds(60)).to_rfc2822();
        let ms = parse_retry_after(&future).unwrap();
        assert!(ms > 50_000 && ms <= 60_000, "got {}", ms);
    }
}
