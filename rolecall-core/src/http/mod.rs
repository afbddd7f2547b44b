//! HTTP plumbing shared by every provider adapter
//!
//! This module implements the transport layer, handling:
//! - Connection pooling and client management
//! - Per-request timeouts and request ID correlation
//! - Status classification and retry hints

pub mod client;
pub mod error;

pub use client::HttpClient;
pub use error::{classify_status, map_transport_error, parse_retry_after};

use std::time::Duration;
use uuid::Uuid;

/// Default per-request timeout when the caller does not supply one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Options for a single provider call
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Unique request ID for correlation, sent as `X-Request-ID`
    pub request_id: Uuid,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RequestOptions {
    /// Create options with a fresh request ID and the given timeout
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        }
    }

    /// Set the timeout for this request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}
