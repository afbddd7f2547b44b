//! Router engine
//!
//! Resolves a role, calls its provider through the circuit breaker and retry
//! executor, falls back once on failure and stamps the answer with a trace id.

use super::resolver::RoleResolver;
use super::types::{AgentConfig, AgentResponse, InvokeRequest};
use crate::config::{Config, ConfigError};
use crate::protocol::CompletionResponse;
use crate::providers::{
    ChunkStream, CircuitBreakerRegistry, CircuitState, ProviderError, ProviderManager,
    ProviderResult, RetryExecutor, RetryPolicy,
};
use crate::telemetry::{
    MetricsRecorder, NoopRecorder, CIRCUIT_TRANSITIONS, FALLBACKS, REQUESTS,
    REQUEST_DURATION_MS, RETRIES, TOKENS_INPUT, TOKENS_OUTPUT,
};
use futures::future::join_all;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Role-based router over the configured providers
pub struct RouterEngine {
    resolver: RoleResolver,
    providers: Arc<ProviderManager>,
    breakers: CircuitBreakerRegistry,
    retry_policy: RwLock<RetryPolicy>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("resolver", &self.resolver)
            .field("providers", &self.providers)
            .field("breakers", &self.breakers)
            .field("retry_policy", &*self.retry_policy.read())
            .finish()
    }
}

impl RouterEngine {
    /// Build an engine with the built-in provider types and no metrics
    pub fn new(config: &Config) -> ProviderResult<Self> {
        let manager = ProviderManager::with_default_client()?;
        Self::with_components(config, Arc::new(manager), Arc::new(NoopRecorder))
    }

    /// Build an engine around a prepared provider manager and metrics sink
    ///
    /// The manager's instances are rebuilt from `config.providers`.
    pub fn with_components(
        config: &Config,
        providers: Arc<ProviderManager>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> ProviderResult<Self> {
        validate(config)?;
        providers.update_config(&config.providers)?;

        let recorder = metrics.clone();
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone()).with_listener(
            move |transition| {
                recorder.increment_counter(
                    CIRCUIT_TRANSITIONS,
                    1,
                    &[
                        ("provider", transition.provider.as_str()),
                        ("from", transition.from.as_str()),
                        ("to", transition.to.as_str()),
                    ],
                );
            },
        );

        info!(
            roles = config.roles.len(),
            providers = config.providers.len(),
            "Router engine initialized"
        );

        Ok(Self {
            resolver: RoleResolver::new(config),
            providers,
            breakers,
            retry_policy: RwLock::new(config.retry.clone()),
            metrics,
        })
    }

    /// Run one role against its provider, with one fallback hop
    ///
    /// When both the primary and the fallback fail, the primary's error is
    /// returned.
    pub async fn invoke_agent(&self, request: InvokeRequest) -> ProviderResult<AgentResponse> {
        let started = Instant::now();
        let trace_id = Uuid::new_v4();
        let agent = self.resolver.resolve(&request.role)?;
        let user_message = request.user_message();

        info!(
            role = %agent.role,
            provider = %agent.provider,
            model = %agent.model,
            trace_id = %trace_id,
            "Invoking agent"
        );

        let primary = self
            .call_provider(&agent, &agent.provider, &agent.model, &user_message)
            .await;

        let (completion, provider, model, used_fallback) = match primary {
            Ok(completion) => (completion, agent.provider.clone(), agent.model.clone(), false),
            Err(primary_error) => {
                let Some(fallback) = agent.fallback.clone() else {
                    warn!(role = %agent.role, trace_id = %trace_id, "Agent failed: {}", primary_error);
                    return Err(primary_error);
                };

                warn!(
                    role = %agent.role,
                    provider = %agent.provider,
                    fallback = %fallback.provider,
                    trace_id = %trace_id,
                    "Primary provider failed, trying fallback: {}",
                    primary_error
                );
                self.metrics.increment_counter(
                    FALLBACKS,
                    1,
                    &[("role", agent.role.as_str()), ("provider", fallback.provider.as_str())],
                );

                match self
                    .call_provider(&agent, &fallback.provider, &fallback.model, &user_message)
                    .await
                {
                    Ok(completion) => (completion, fallback.provider, fallback.model, true),
                    Err(fallback_error) => {
                        error!(
                            role = %agent.role,
                            trace_id = %trace_id,
                            "Fallback provider '{}' also failed: {}",
                            fallback.provider,
                            fallback_error
                        );
                        return Err(primary_error);
                    }
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let labels = [("provider", provider.as_str()), ("model", model.as_str())];
        self.metrics
            .record_histogram(REQUEST_DURATION_MS, duration_ms as f64, &labels);
        self.metrics
            .record_histogram(TOKENS_INPUT, completion.usage.input_tokens as f64, &labels);
        self.metrics
            .record_histogram(TOKENS_OUTPUT, completion.usage.output_tokens as f64, &labels);

        info!(
            role = %agent.role,
            provider = %provider,
            model = %model,
            trace_id = %trace_id,
            duration_ms,
            used_fallback,
            "Agent completed"
        );

        Ok(AgentResponse {
            role: agent.role,
            provider,
            model,
            content: completion.content,
            stop_reason: completion.stop_reason,
            usage: completion.usage,
            trace_id,
            duration_ms,
            used_fallback,
        })
    }

    /// Run the same task on several roles concurrently
    ///
    /// Roles whose invocation fails are left out of the result.
    pub async fn compare_agents<I, S>(&self, roles: I, task: &str) -> BTreeMap<String, AgentResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocations = roles.into_iter().map(|role| {
            let role: String = role.into();
            async move {
                let result = self.invoke_agent(InvokeRequest::new(role.clone(), task)).await;
                (role, result)
            }
        });

        join_all(invocations)
            .await
            .into_iter()
            .filter_map(|(role, result)| match result {
                Ok(response) => Some((role, response)),
                Err(e) => {
                    warn!(role = %role, "Dropping role from comparison: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Open a stream on the role's primary provider
    ///
    /// The breaker gates the call and records one outcome per stream: a
    /// failure if opening fails or the stream yields an error, a success once
    /// it ends cleanly. There is no retry or fallback.
    pub async fn invoke_agent_stream(&self, request: InvokeRequest) -> ProviderResult<ChunkStream> {
        let agent = self.resolver.resolve(&request.role)?;
        let provider = self.providers.get(&agent.provider)?;
        let breaker = self.breakers.get_or_create(&agent.provider);
        breaker.try_acquire()?;

        let mut completion = agent.completion_request(&agent.model, request.user_message());
        completion.stream = true;
        let options = agent.request_options();

        debug!(
            role = %agent.role,
            provider = %agent.provider,
            model = %agent.model,
            "Opening agent stream [request_id: {}]",
            options.request_id
        );

        let mut stream = match provider.complete_stream(&completion, &options).await {
            Ok(stream) => stream,
            Err(e) => {
                breaker.record_failure(&e);
                return Err(e);
            }
        };

        Ok(Box::pin(async_stream::stream! {
            let mut failed = false;
            while let Some(item) = stream.next().await {
                if let Err(e) = &item {
                    if !failed {
                        breaker.record_failure(e);
                        failed = true;
                    }
                }
                yield item;
            }
            if !failed {
                breaker.record_success();
            }
        }))
    }

    pub fn list_roles(&self) -> Vec<String> {
        self.resolver.list_roles()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.resolver.has_role(role)
    }

    pub fn resolve_role(&self, role: &str) -> ProviderResult<AgentConfig> {
        self.resolver.resolve(role)
    }

    /// Apply a new configuration
    ///
    /// Providers are rebuilt first; if that fails nothing changes. Breaker
    /// state survives the update.
    pub fn update_config(&self, config: &Config) -> ProviderResult<()> {
        validate(config)?;
        self.providers.update_config(&config.providers)?;
        self.resolver.update_config(config);
        *self.retry_policy.write() = config.retry.clone();
        self.breakers.update_config(config.circuit_breaker.clone());

        info!(
            roles = config.roles.len(),
            providers = config.providers.len(),
            "Router configuration updated"
        );
        Ok(())
    }

    /// Apply every configuration published on `receiver`
    ///
    /// The task ends when the sender is dropped or the engine is gone.
    pub fn watch_config(self: &Arc<Self>, mut receiver: watch::Receiver<Config>) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let config = receiver.borrow_and_update().clone();
                if let Err(e) = engine.update_config(&config) {
                    error!("Rejected configuration update: {}", e);
                }
            }
            debug!("Configuration watcher stopped");
        })
    }

    /// Breaker state of a provider; providers never called report closed
    pub fn circuit_state(&self, provider: &str) -> CircuitState {
        self.breakers.state(provider)
    }

    /// Force a provider's breaker closed; returns whether it existed
    pub fn reset_circuit(&self, provider: &str) -> bool {
        self.breakers.reset(provider)
    }

    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        self.breakers.states()
    }

    pub fn provider_manager(&self) -> &Arc<ProviderManager> {
        &self.providers
    }

    pub async fn health_check_all(&self) -> Vec<(String, ProviderResult<()>)> {
        self.providers.health_check_all().await
    }

    /// One breaker-protected, retried completion against `provider_name`
    async fn call_provider(
        &self,
        agent: &AgentConfig,
        provider_name: &str,
        model: &str,
        user_message: &str,
    ) -> ProviderResult<CompletionResponse> {
        let provider = self.providers.get(provider_name)?;
        let request = agent.completion_request(model, user_message.to_string());
        let breaker = self.breakers.get_or_create(provider_name);
        let retry = self.retry_executor(provider_name);

        let result = breaker
            .execute(|| {
                retry.execute(|| {
                    let provider = provider.clone();
                    let request = &request;
                    let options = agent.request_options();
                    async move { provider.complete(request, &options).await }
                })
            })
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics.increment_counter(
            REQUESTS,
            1,
            &[("provider", provider_name), ("model", model), ("outcome", outcome)],
        );

        result
    }

    fn retry_executor(&self, provider_name: &str) -> RetryExecutor {
        let metrics = self.metrics.clone();
        let provider = provider_name.to_string();

        RetryExecutor::new(self.retry_policy.read().clone()).on_retry(move |error, attempt, delay| {
            warn!(
                provider = %provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Provider call failed, retrying: {}",
                error
            );
            metrics.increment_counter(RETRIES, 1, &[("provider", provider.as_str())]);
        })
    }
}

fn validate(config: &Config) -> ProviderResult<()> {
    config
        .validate()
        .map_err(|e| ProviderError::from(ConfigError::from(e)))
}
