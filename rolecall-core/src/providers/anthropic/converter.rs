//! Conversion between the normalized protocol and Anthropic format

use super::types::*;
use crate::protocol::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};
use tracing::debug;

/// Used when a request leaves `max_tokens` unset; the API requires it
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Convert a normalized request to Anthropic format
pub fn to_anthropic_request(request: &CompletionRequest, stream: bool) -> AnthropicRequest {
    AnthropicRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: request.system.clone(),
        temperature: request.temperature,
        stream: stream.then_some(true),
        tools: request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect()
        }),
    }
}

/// Convert an Anthropic response to the normalized shape
pub fn from_anthropic_response(response: AnthropicResponse) -> CompletionResponse {
    let content = response
        .content
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ContentBlock>(raw) {
            Ok(block) => Some(block),
            Err(e) => {
                debug!("Skipping unsupported content block: {}", e);
                None
            }
        })
        .collect();

    CompletionResponse {
        id: response.id,
        model: response.model,
        content,
        stop_reason: response.stop_reason.as_deref().and_then(map_stop_reason),
        usage: Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    }
}

/// Map an Anthropic stop reason to the normalized vocabulary
pub fn map_stop_reason(reason: &str) -> Option<StopReason> {
    match reason {
        "refusal" => Some(StopReason::ContentFilter),
        other => StopReason::from_wire(other),
    }
}
