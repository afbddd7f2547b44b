//! Router request and response types

use crate::config::FallbackConfig;
use crate::http::RequestOptions;
use crate::protocol::{CompletionRequest, ContentBlock, Message, StopReason, Usage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A role merged onto the defaults
///
/// Sampling parameters and the timeout are always set after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: String,
    pub provider: String,
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
}

impl AgentConfig {
    /// Build the completion request for `model` carrying one user message
    pub fn completion_request(&self, model: &str, user_message: String) -> CompletionRequest {
        let mut request = CompletionRequest::new(model, vec![Message::user(user_message)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(system) = &self.system_prompt {
            request = request.with_system(system.clone());
        }
        request
    }

    /// Fresh per-call options bound to this agent's timeout
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::with_timeout_ms(self.timeout_ms)
    }
}

/// Input to [`RouterEngine::invoke_agent`](super::RouterEngine::invoke_agent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub role: String,
    pub task: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl InvokeRequest {
    pub fn new(role: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            task: task.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The single user message sent to the model: context first, then task
    pub fn user_message(&self) -> String {
        match self.context.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(context) => format!("Context:\n{}\n\nTask:\n{}", context, self.task),
            None => self.task.clone(),
        }
    }
}

/// Normalized answer of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub role: String,

    /// Provider that actually answered (the fallback's, if one was used)
    pub provider: String,
    pub model: String,
    pub content: Vec<ContentBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,

    /// Unique per invocation
    pub trace_id: Uuid,
    pub duration_ms: u64,
    pub used_fallback: bool,
}

impl AgentResponse {
    /// Concatenate all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentConfig {
        AgentConfig {
            role: "coder".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            system_prompt: Some("You write Rust.".to_string()),
            temperature: 0.2,
            max_tokens: 1024,
            timeout_ms: 5_000,
            fallback: None,
        }
    }

    #[test]
    fn test_user_message_layout() {
        let plain = InvokeRequest::new("coder", "Write a parser");
        assert_eq!(plain.user_message(), "Write a parser");

        let blank = plain.clone().with_context("   ");
        assert_eq!(blank.user_message(), "Write a parser");

        let with_context = plain.with_context("fn main() {}");
        assert_eq!(
            with_context.user_message(),
            "Context:\nfn main() {}\n\nTask:\nWrite a parser"
        );
    }

    #[test]
    fn test_completion_request_carries_agent_settings() {
        let request = agent().completion_request("gpt-4o-mini", "hi".to_string());
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.system.as_deref(), Some("You write Rust."));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(1024));
        assert_eq!(request.messages, vec![Message::user("hi")]);
        assert!(!request.stream);

        assert_eq!(agent().request_options().timeout_ms(), 5_000);
    }
}
