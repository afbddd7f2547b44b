//! Conversion between the normalized protocol and OpenAI format

use super::types::*;
use crate::protocol::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, StopReason,
    ToolDefinition, Usage,
};
use crate::providers::{ProviderError, ProviderResult};
use serde_json::Value;

/// Convert a normalized request to OpenAI format
pub fn to_openai_request(request: &CompletionRequest, stream: bool) -> OpenAIRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        messages.push(OpenAIMessage::text("system", system.clone()));
    }

    for message in &request.messages {
        messages.extend(to_openai_messages(message));
    }

    OpenAIRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: stream.then_some(true),
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(to_openai_tool).collect()),
    }
}

/// Convert one normalized message into one or more OpenAI messages
///
/// Tool results become separate `tool` messages placed ahead of the
/// message's remaining content, so they directly follow the assistant turn
/// that requested them.
fn to_openai_messages(message: &Message) -> Vec<OpenAIMessage> {
    let role = message.role.as_str();

    let blocks = match &message.content {
        MessageContent::Text(text) => return vec![OpenAIMessage::text(role, text.clone())],
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(OpenAIToolCall {
                id: id.clone(),
                tool_type: "function".to_string(),
                function: OpenAIFunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => out.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            }),
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        out.push(OpenAIMessage {
            role: role.to_string(),
            content: (!text.is_empty()).then_some(text),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }

    out
}

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

/// Convert an OpenAI response to the normalized shape
pub fn from_openai_response(response: OpenAIResponse) -> ProviderResult<CompletionResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::provider("No choices in response"))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::Text { text });
    }
    for call in choice.message.tool_calls.unwrap_or_default() {
        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input: parse_arguments(call.function.arguments),
        });
    }

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        id: response.id,
        model: response.model,
        content,
        stop_reason: choice.finish_reason.as_deref().and_then(map_finish_reason),
        usage,
    })
}

/// Parse tool arguments, keeping unparseable text as a JSON string
fn parse_arguments(arguments: String) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(&arguments).unwrap_or(Value::String(arguments))
}

/// Map an OpenAI finish reason to the normalized vocabulary
pub fn map_finish_reason(reason: &str) -> Option<StopReason> {
    match reason {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "tool_calls" | "function_call" => Some(StopReason::ToolUse),
        "content_filter" => Some(StopReason::ContentFilter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageRole;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_system_prompt_leads() {
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")])
            .with_system("be brief")
            .with_temperature(0.2);
        let wire = to_openai_request(&request, false);

        assert_eq!(wire.messages[0], OpenAIMessage::text("system", "be brief"));
        assert_eq!(wire.messages[1], OpenAIMessage::text("user", "hi"));
        assert_eq!(wire.stream, None);
        assert_eq!(wire.temperature, Some(0.2));
    }

    #[test]
    fn test_tool_use_and_results() {
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::with_blocks(
                    MessageRole::Assistant,
                    vec![
                        ContentBlock::text("Checking."),
                        ContentBlock::tool_use("call_1", "get_weather", json!({"city": "Paris"})),
                    ],
                ),
                Message::with_blocks(
                    MessageRole::User,
                    vec![
                        ContentBlock::tool_result("call_1", "18C"),
                        ContentBlock::text("And tomorrow?"),
                    ],
                ),
            ],
        );
        let wire = to_openai_request(&request, true);
        assert_eq!(wire.stream, Some(true));
        assert_eq!(wire.messages.len(), 3);

        let assistant = &wire.messages[0];
        assert_eq!(assistant.role, "assistant");
        assert_eq!(assistant.content.as_deref(), Some("Checking."));
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args, json!({"city": "Paris"}));

        assert_eq!(wire.messages[1].role, "tool");
        assert_eq!(wire.messages[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(wire.messages[2], OpenAIMessage::text("user", "And tomorrow?"));
    }

    #[test]
    fn test_tools_become_functions() {
        let request = CompletionRequest::new("m", vec![Message::user("x")]).with_tools(vec![
            ToolDefinition {
                name: "search".to_string(),
                description: Some("Search the web".to_string()),
                input_schema: json!({"type": "object"}),
            },
        ]);
        let value = serde_json::to_value(to_openai_request(&request, false)).unwrap();
        assert_eq!(
            value["tools"][0],
            json!({
                "type": "function",
                "function": {
                    "name": "search",
                    "description": "Search the web",
                    "parameters": {"type": "object"}
                }
            })
        );
    }

    #[test]
    fn test_response_with_tool_calls() {
        let response: OpenAIResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Let me look.",
                    "tool_calls": [
                        {"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{\"a\":1}"}},
                        {"id": "c2", "type": "function", "function": {"name": "g", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 11, "completion_tokens": 7, "total_tokens": 18}
        }))
        .unwrap();

        let normalized = from_openai_response(response).unwrap();
        assert_eq!(normalized.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(normalized.usage, Usage { input_tokens: 11, output_tokens: 7 });
        assert_eq!(
            normalized.content,
            vec![
                ContentBlock::text("Let me look."),
                ContentBlock::tool_use("c1", "f", json!({"a": 1})),
                ContentBlock::tool_use("c2", "g", json!("not json")),
            ]
        );
    }

    #[test]
    fn test_response_without_choices() {
        let response: OpenAIResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            from_openai_response(response),
            Err(ProviderError::Provider { status: None, .. })
        ));
    }

    #[test_case("stop", Some(StopReason::EndTurn))]
    #[test_case("length", Some(StopReason::MaxTokens))]
    #[test_case("tool_calls", Some(StopReason::ToolUse))]
    #[test_case("content_filter", Some(StopReason::ContentFilter))]
    #[test_case("something_new", None)]
    fn test_finish_reasons(reason: &str, expected: Option<StopReason>) {
        assert_eq!(map_finish_reason(reason), expected);
    }
}
