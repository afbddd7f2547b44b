//! Provider adapters and the resilience layer around them
//!
//! Every LLM back-end implements [`Provider`]. Calls to a provider go through
//! a [`CircuitBreaker`] wrapping a [`RetryExecutor`], and adapter instances
//! are owned by the [`ProviderManager`].

pub mod adapter;
pub mod anthropic;
pub mod circuit_breaker;
pub mod error;
pub mod manager;
pub mod openai;
pub mod retry;
pub mod sse;

pub use adapter::{ChunkStream, Provider, ProviderType};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, ListenerId,
    StateTransition, TransitionListener,
};
pub use error::{ProviderError, ProviderResult};
pub use manager::{ProviderFactory, ProviderManager};
pub use retry::{is_retryable_error, RetryExecutor, RetryPolicy};

// Re-export concrete providers
pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;
