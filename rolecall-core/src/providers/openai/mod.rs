//! OpenAI provider implementation
//!
//! This module provides an adapter for the OpenAI Chat Completions API,
//! translating between the normalized protocol and OpenAI's format.

mod client;
pub mod converter;
pub mod streaming;
pub mod types;

pub use client::{OpenAIProvider, DEFAULT_BASE_URL};
pub use streaming::StreamTranslator;
pub use types::{OpenAIRequest, OpenAIResponse, OpenAIStreamChunk};
