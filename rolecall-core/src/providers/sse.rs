//! Server-Sent Events decoding shared by the streaming adapters
//!
//! Only `data:` lines matter to the adapters. Lines may arrive split across
//! network reads, so bytes are buffered until a newline completes them.

use crate::http::RequestOptions;
use crate::providers::{ProviderError, ProviderResult};
use futures::{Stream, StreamExt};
use reqwest::Response;
use tracing::debug;

/// Sentinel payload that ends an OpenAI-style stream
const DONE_SENTINEL: &str = "[DONE]";

/// A decoded SSE line the adapters care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental line decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the events completed by them
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline terminated
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\n', '\r']);

    // Skip blank separators, comments and non-data fields
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(SseEvent::Data(data.to_string()))
}

/// Turn a streaming response body into decoded SSE events
///
/// The body is consumed lazily; dropping the returned stream releases the
/// connection.
pub fn decode_response(
    response: Response,
    options: RequestOptions,
) -> impl Stream<Item = ProviderResult<SseEvent>> + Send + 'static {
    async_stream::stream! {
        let mut bytes = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.feed(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    debug!("Stream read error [request_id: {}]: {}", options.request_id, e);
                    if e.is_timeout() {
                        yield Err(ProviderError::Timeout {
                            timeout_ms: options.timeout_ms(),
                        });
                    } else {
                        yield Err(ProviderError::provider(format!(
                            "Stream read error: {} [request_id: {}]",
                            e, options.request_id
                        )));
                    }
                    return;
                }
            }
        }

        if let Some(event) = decoder.finish() {
            yield Ok(event);
        }
    }
}
