//! Rolecall demo
//!
//! Loads a configuration file, lists the configured roles and, when a role
//! and task are given, invokes the agent and prints its answer.
//!
//! Run with: cargo run --example demo -- config.yaml coder "Write a haiku about Rust"
//!
//! Set `RUST_LOG=rolecall_core=debug` to see routing, retry and breaker logs.

use anyhow::{bail, Context, Result};
use rolecall_core::config::load_from_yaml;
use rolecall_core::providers::ProviderManager;
use rolecall_core::router::{InvokeRequest, RouterEngine};
use rolecall_core::telemetry::{InMemoryRecorder, REQUESTS, RETRIES};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let Some(config_path) = args.next() else {
        bail!("usage: demo <config.yaml> [role] [task]");
    };

    let config = load_from_yaml(&config_path)
        .with_context(|| format!("failed to load {}", config_path))?;

    let metrics = Arc::new(InMemoryRecorder::new());
    let engine = RouterEngine::with_components(
        &config,
        Arc::new(ProviderManager::with_default_client()?),
        metrics.clone(),
    )?;

    println!("Roles:");
    for role in engine.list_roles() {
        let agent = engine.resolve_role(&role)?;
        let fallback = agent
            .fallback
            .as_ref()
            .map(|f| format!(" (fallback {}/{})", f.provider, f.model))
            .unwrap_or_default();
        println!("  {:<12} {}/{}{}", role, agent.provider, agent.model, fallback);
    }

    let (Some(role), Some(task)) = (args.next(), args.next()) else {
        return Ok(());
    };

    let response = engine.invoke_agent(InvokeRequest::new(role, task)).await?;

    println!();
    println!("{}", response.text());
    println!();
    println!(
        "provider={} model={} tokens={}/{} duration={}ms fallback={} trace={}",
        response.provider,
        response.model,
        response.usage.input_tokens,
        response.usage.output_tokens,
        response.duration_ms,
        response.used_fallback,
        response.trace_id
    );
    println!(
        "requests={} retries={}",
        metrics.counter(REQUESTS, &[]),
        metrics.counter(RETRIES, &[])
    );

    Ok(())
}
