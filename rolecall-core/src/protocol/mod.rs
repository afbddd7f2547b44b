//! Protocol module for normalized LLM request/response structures
//!
//! This module defines the canonical data models shared by every provider
//! adapter. These structures are designed to be:
//! - Provider-agnostic
//! - Ordered (content blocks follow generation order)
//! - Streaming-aware through a small chunk vocabulary
//! - Type-safe and serializable

pub mod types;

pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, ContentDelta, Message, MessageContent,
    MessageRole, StopReason, StreamChunk, ToolDefinition, Usage,
};
