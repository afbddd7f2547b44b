//! Anthropic provider implementation
//!
//! Adapter for the Anthropic Messages API. The wire format is close to the
//! normalized protocol, so translation is mostly pass-through.

mod client;
pub mod converter;
pub mod streaming;
pub mod types;

pub use client::{AnthropicProvider, ANTHROPIC_VERSION, DEFAULT_BASE_URL};
