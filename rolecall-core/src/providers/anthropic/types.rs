//! Anthropic Messages API wire types

use crate::protocol::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages API request
///
/// Content blocks share the normalized shape, so messages pass through as is.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
}

/// Tool definition
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicTool {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub input_schema: Value,
}

/// Messages API response
///
/// Content is kept as raw values so block types this crate does not model
/// (e.g. thinking) can be skipped instead of failing the whole response.
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub content: Vec<Value>,

    #[serde(default)]
    pub stop_reason: Option<String>,

    #[serde(default)]
    pub usage: AnthropicUsage,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Streaming event, keyed by its `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    ContentBlockStart { index: usize, content_block: Value },
    ContentBlockDelta { index: usize, delta: Value },
    MessageStop,
    Error { error: Value },
    /// `ping`, `message_start`, `message_delta`, `content_block_stop`, ...
    #[serde(other)]
    Ignored,
}
