//! Per-provider circuit breaker
//!
//! Consecutive failures trip the circuit open; after a cooldown the circuit
//! goes half-open and a run of successes closes it again. Transitions are
//! evaluated lazily on each call or state read, so no background task is
//! needed.

use crate::config::ValidationError;
use crate::providers::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Maximum number of listeners a single breaker accepts
pub const MAX_LISTENERS: usize = 32;

/// Circuit breaker thresholds and timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Half-open successes that close the circuit
    pub success_threshold: u32,

    /// How long the circuit stays open after the last failure (milliseconds)
    pub timeout_ms: u64,

    /// Age after which a closed-state failure streak is forgotten (milliseconds)
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 30_000,
            reset_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.failure_threshold", path),
                "Must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.success_threshold", path),
                "Must be at least 1",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_ms", path),
                "Must be greater than 0",
            ));
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, delivered to listeners after the breaker lock is released
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub provider: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub timestamp: DateTime<Utc>,
    /// Message of the error that caused the change, if any
    pub error: Option<String>,
}

/// Handle returned by [`CircuitBreaker::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Transition callback
pub type TransitionListener = Arc<dyn Fn(&StateTransition) + Send + Sync>;

#[derive(Debug)]
struct BreakerState {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    first_failure: Option<Instant>,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            first_failure: None,
            last_failure: None,
        }
    }

    fn clear_counters(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.first_failure = None;
    }

    /// Apply time-based transitions
    fn refresh(&mut self, now: Instant) -> Option<(CircuitState, CircuitState)> {
        match self.state {
            CircuitState::Open => {
                let cooled = self
                    .last_failure
                    .map_or(true, |at| now.duration_since(at) >= self.config.timeout());
                if cooled {
                    self.success_count = 0;
                    return self.move_to(CircuitState::HalfOpen);
                }
            }
            CircuitState::Closed => {
                let stale = self
                    .first_failure
                    .is_some_and(|at| now.duration_since(at) >= self.config.reset_timeout());
                if stale {
                    self.clear_counters();
                }
            }
            CircuitState::HalfOpen => {}
        }
        None
    }

    fn move_to(&mut self, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        self.state = to;
        (from != to).then_some((from, to))
    }

    fn retry_after_ms(&self, now: Instant) -> u64 {
        let elapsed = self
            .last_failure
            .map_or(Duration::ZERO, |at| now.duration_since(at));
        self.config.timeout().saturating_sub(elapsed).as_millis() as u64
    }
}

/// Circuit breaker guarding one provider
pub struct CircuitBreaker {
    name: String,
    state: Mutex<BreakerState>,
    listeners: RwLock<Vec<(ListenerId, TransitionListener)>>,
    next_listener_id: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(BreakerState::new(config)),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, after applying any due time-based transition
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.state.lock();
            let moved = inner.refresh(Instant::now());
            (inner.state, moved.map(|m| self.transition(&inner, m, None)))
        };
        self.notify(transition);
        state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.state.lock().success_count
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.state.lock().config.clone()
    }

    /// Replace thresholds and timings; counters and state are kept
    pub fn set_config(&self, config: CircuitBreakerConfig) {
        self.state.lock().config = config;
    }

    /// Run `operation` if the circuit admits it and record the outcome
    ///
    /// When open, returns [`ProviderError::CircuitOpen`] without invoking the
    /// operation. The operation's own error is always returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ProviderResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    /// Admission check used by [`execute`](Self::execute) and by callers
    /// that cannot wrap the whole operation (streams)
    pub fn try_acquire(&self) -> ProviderResult<()> {
        let now = Instant::now();
        let (result, transition) = {
            let mut inner = self.state.lock();
            let moved = inner.refresh(now);
            let transition = moved.map(|m| self.transition(&inner, m, None));

            let result = if inner.state == CircuitState::Open {
                Err(ProviderError::CircuitOpen {
                    provider: self.name.clone(),
                    retry_after_ms: inner.retry_after_ms(now),
                })
            } else {
                Ok(())
            };
            (result, transition)
        };
        self.notify(transition);
        result
    }

    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.state.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.clear_counters();
                    None
                }
                CircuitState::HalfOpen => {
                    inner.success_count += 1;
                    if inner.success_count >= inner.config.success_threshold {
                        let moved = inner.move_to(CircuitState::Closed);
                        let transition = moved.map(|m| self.transition(&inner, m, None));
                        inner.clear_counters();
                        transition
                    } else {
                        None
                    }
                }
                // A call admitted before a concurrent trip; the trip wins.
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    pub fn record_failure(&self, error: &ProviderError) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.state.lock();
            inner.refresh(now);
            inner.last_failure = Some(now);

            let moved = match inner.state {
                CircuitState::Closed => {
                    if inner.failure_count == 0 {
                        inner.first_failure = Some(now);
                    }
                    inner.failure_count += 1;
                    if inner.failure_count >= inner.config.failure_threshold {
                        inner.move_to(CircuitState::Open)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.failure_count += 1;
                    inner.success_count = 0;
                    inner.move_to(CircuitState::Open)
                }
                CircuitState::Open => None,
            };
            moved.map(|m| self.transition(&inner, m, Some(error.to_string())))
        };
        self.notify(transition);
    }

    /// Force the circuit closed and clear all counters
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.state.lock();
            let moved = inner.move_to(CircuitState::Closed);
            inner.clear_counters();
            inner.last_failure = None;
            moved.map(|m| self.transition(&inner, m, None))
        };
        self.notify(transition);
    }

    /// Register a transition listener
    ///
    /// Fails once [`MAX_LISTENERS`] are registered.
    pub fn subscribe<F>(&self, listener: F) -> ProviderResult<ListenerId>
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    pub fn subscribe_arc(&self, listener: TransitionListener) -> ProviderResult<ListenerId> {
        let mut listeners = self.listeners.write();
        if listeners.len() >= MAX_LISTENERS {
            return Err(ProviderError::Configuration(format!(
                "Circuit breaker '{}' already has {} listeners",
                self.name, MAX_LISTENERS
            )));
        }
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        listeners.push((id, listener));
        Ok(id)
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn transition(
        &self,
        inner: &BreakerState,
        (from, to): (CircuitState, CircuitState),
        error: Option<String>,
    ) -> StateTransition {
        StateTransition {
            provider: self.name.clone(),
            from,
            to,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            timestamp: Utc::now(),
            error,
        }
    }

    fn notify(&self, transition: Option<StateTransition>) {
        let Some(transition) = transition else {
            return;
        };

        match transition.to {
            CircuitState::Open => warn!(
                provider = %self.name,
                failures = transition.failure_count,
                error = transition.error.as_deref().unwrap_or(""),
                "Circuit opened"
            ),
            _ => info!(
                provider = %self.name,
                from = %transition.from,
                to = %transition.to,
                "Circuit state changed"
            ),
        }

        let listeners: Vec<TransitionListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&transition))).is_err() {
                error!(provider = %self.name, "Circuit breaker listener panicked");
            }
        }
    }
}

/// Breakers keyed by provider name
///
/// Breakers are created on first use and live for the registry's lifetime,
/// independent of adapter rebuilds.
pub struct CircuitBreakerRegistry {
    config: RwLock<CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    listeners: Vec<TransitionListener>,
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &*self.config.read())
            .field("breakers", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            breakers: RwLock::new(HashMap::new()),
            listeners: Vec::new(),
        }
    }

    /// Attach a listener to every breaker this registry creates
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Breaker for `provider`, created on first use
    pub fn get_or_create(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(provider) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                let breaker = CircuitBreaker::new(provider, self.config.read().clone());
                for listener in &self.listeners {
                    if let Err(e) = breaker.subscribe_arc(listener.clone()) {
                        warn!("{}", e);
                    }
                }
                Arc::new(breaker)
            })
            .clone()
    }

    pub fn get(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(provider).cloned()
    }

    /// Current state of `provider`'s breaker; untouched providers are closed
    pub fn state(&self, provider: &str) -> CircuitState {
        self.get(provider)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    /// Reset one breaker; returns whether it existed
    pub fn reset(&self, provider: &str) -> bool {
        match self.get(provider) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Apply new thresholds to existing and future breakers without resetting them
    pub fn update_config(&self, config: CircuitBreakerConfig) {
        *self.config.write() = config.clone();
        for breaker in self.breakers.read().values() {
            breaker.set_config(config.clone());
        }
    }

    /// Snapshot of every known breaker's state, sorted by provider name
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut states: Vec<(String, CircuitState)> = breakers
            .iter()
            .map(|b| (b.name().to_string(), b.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            timeout_ms,
            ..Default::default()
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> ProviderResult<()> {
        breaker
            .execute(|| async { Err(ProviderError::with_status("boom", 500)) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> ProviderResult<()> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new("p", config(3, 1000));
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let breaker = CircuitBreaker::new("p", config(2, 1000));
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_then_recovers() {
        let breaker = CircuitBreaker::new("flaky", config(2, 100));
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        let mut invoked = false;
        let result: ProviderResult<()> = breaker
            .execute(|| {
                invoked = true;
                async { Ok(()) }
            })
            .await;
        match result {
            Err(ProviderError::CircuitOpen {
                provider,
                retry_after_ms,
            }) => {
                assert_eq!(provider, "flaky");
                assert!(retry_after_ms <= 100);
            }
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
        assert!(!invoked);

        tokio::time::advance(Duration::from_millis(101)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("p", config(1, 50));
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(60)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.success_count(), 1);
        let err = fail(&breaker).await.unwrap_err();
        assert_eq!(err, ProviderError::with_status("boom", 500));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.success_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_concurrent_calls() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout_ms: 100,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new("p", cfg);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(150)).await;

        let dispatched = std::sync::atomic::AtomicU32::new(0);
        let release_failure = tokio::sync::Notify::new();
        let release_success = tokio::sync::Notify::new();

        let failing = breaker.execute(|| async {
            dispatched.fetch_add(1, Ordering::SeqCst);
            release_failure.notified().await;
            Err::<(), _>(ProviderError::with_status("boom", 500))
        });
        let succeeding = breaker.execute(|| async {
            dispatched.fetch_add(1, Ordering::SeqCst);
            release_success.notified().await;
            Ok(())
        });
        let driver = async {
            while dispatched.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
            assert_eq!(breaker.state(), CircuitState::HalfOpen);

            release_failure.notify_one();
            while breaker.state() != CircuitState::Open {
                tokio::task::yield_now().await;
            }
            release_success.notify_one();
        };

        let (failed, succeeded, ()) = tokio::join!(failing, succeeding, driver);
        assert!(failed.is_err());
        assert!(succeeded.is_ok());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_streak_decays() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 1000,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new("p", cfg);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(1500)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_listeners_and_panic_isolation() {
        let breaker = CircuitBreaker::new("p", config(1, 60_000));
        let seen = Arc::new(Mutex::new(Vec::new()));

        breaker.subscribe(|_| panic!("listener bug")).unwrap();
        let sink = seen.clone();
        let id = breaker
            .subscribe(move |t: &StateTransition| sink.lock().push(t.clone()))
            .unwrap();

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);

        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].from, CircuitState::Closed);
            assert_eq!(seen[0].to, CircuitState::Open);
            assert_eq!(seen[0].failure_count, 1);
            assert_eq!(seen[0].error.as_deref(), Some("Provider error (500): boom"));
            assert_eq!(seen[1].to, CircuitState::Closed);
        }

        assert!(breaker.unsubscribe(id));
        assert!(!breaker.unsubscribe(id));
        fail(&breaker).await.unwrap_err();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_listener_limit() {
        let breaker = CircuitBreaker::new("p", CircuitBreakerConfig::default());
        for _ in 0..MAX_LISTENERS {
            breaker.subscribe(|_| {}).unwrap();
        }
        assert!(matches!(
            breaker.subscribe(|_| {}),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[test]
    fn test_reset_without_change_is_silent() {
        let breaker = CircuitBreaker::new("p", CircuitBreakerConfig::default());
        breaker.subscribe(|_| panic!("no transition expected")).unwrap();
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_registry_keeps_state_across_config_updates() {
        let transitions = Arc::new(AtomicU64::new(0));
        let counter = transitions.clone();
        let registry = CircuitBreakerRegistry::new(config(1, 60_000)).with_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.state("openai"), CircuitState::Closed);
        let breaker = registry.get_or_create("openai");
        fail(&breaker).await.unwrap_err();
        assert!(Arc::ptr_eq(&breaker, &registry.get_or_create("openai")));

        registry.update_config(config(10, 60_000));
        assert_eq!(registry.state("openai"), CircuitState::Open);
        assert_eq!(breaker.config().failure_threshold, 10);
        assert_eq!(transitions.load(Ordering::SeqCst), 1);

        assert!(registry.reset("openai"));
        assert!(!registry.reset("unknown"));
        assert_eq!(
            registry.states(),
            vec![("openai".to_string(), CircuitState::Closed)]
        );
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let cfg: CircuitBreakerConfig = serde_yaml::from_str("failure_threshold: 3").unwrap();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.success_threshold, 2);
        assert_eq!(cfg.timeout_ms, 30_000);
        assert_eq!(cfg.reset_timeout_ms, 60_000);

        let err = config(0, 10).validate("circuit_breaker").unwrap_err();
        assert_eq!(err.field_path, "circuit_breaker.failure_threshold");
    }
}
