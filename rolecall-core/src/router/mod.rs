//! Role-based routing
//!
//! Maps role names to providers and models and runs invocations through the
//! resilience layer.

mod engine;
mod resolver;
mod types;

pub use engine::RouterEngine;
pub use resolver::RoleResolver;
pub use types::{AgentConfig, AgentResponse, InvokeRequest};
