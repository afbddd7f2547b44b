//! Retry policy for resilient provider operations
//!
//! This module implements configurable retry policies with exponential
//! backoff and jitter, plus the executor that wraps every provider call.

use crate::config::ValidationError;
use crate::providers::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
///
/// Deserializes either from a table of fields or from a preset name
/// (`default`, `aggressive`, `conservative`, `none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RetryPolicyRepr")]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Upper bound for any computed delay (milliseconds)
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and default timings
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// More attempts with shorter waits, for latency-sensitive roles
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_multiplier: 1.5,
            jitter_factor: 0.2,
        }
    }

    /// Fewer attempts with longer waits, to minimize load on the back-end
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 3.0,
            jitter_factor: 0.3,
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "aggressive" => Some(Self::aggressive()),
            "conservative" => Some(Self::conservative()),
            "none" | "no_retry" => Some(Self::no_retry()),
            _ => None,
        }
    }

    /// Compute the backoff before retry number `attempt` (0-based)
    ///
    /// `min(initial * multiplier^attempt, max)`, then uniform jitter of
    /// `± jitter_factor * delay`, floored at zero.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Validate retry policy
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_attempts", path),
                "Must be at least 1",
            ));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.backoff_multiplier", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RetryPolicyRepr {
    Preset(String),
    Fields(RetryPolicyFields),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryPolicyFields {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    jitter_factor: Option<f64>,
}

impl TryFrom<RetryPolicyRepr> for RetryPolicy {
    type Error = String;

    fn try_from(repr: RetryPolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            RetryPolicyRepr::Preset(name) => RetryPolicy::preset(&name)
                .ok_or_else(|| format!("unknown retry preset '{}'", name)),
            RetryPolicyRepr::Fields(fields) => {
                let defaults = RetryPolicy::default();
                Ok(RetryPolicy {
                    max_attempts: fields.max_attempts.unwrap_or(defaults.max_attempts),
                    initial_delay_ms: fields.initial_delay_ms.unwrap_or(defaults.initial_delay_ms),
                    max_delay_ms: fields.max_delay_ms.unwrap_or(defaults.max_delay_ms),
                    backoff_multiplier: fields
                        .backoff_multiplier
                        .unwrap_or(defaults.backoff_multiplier),
                    jitter_factor: fields.jitter_factor.unwrap_or(defaults.jitter_factor),
                })
            }
        }
    }
}

/// Default retryable-error predicate
///
/// Rate limits and timeouts always retry; generic provider errors retry only
/// with a 5xx status.
pub fn is_retryable_error(error: &ProviderError) -> bool {
    match error {
        ProviderError::RateLimit { .. } | ProviderError::Timeout { .. } => true,
        ProviderError::Provider {
            status: Some(status),
            ..
        } => (500..600).contains(status),
        _ => false,
    }
}

type RetryPredicate = Arc<dyn Fn(&ProviderError) -> bool + Send + Sync>;
type RetryCallback = Arc<dyn Fn(&ProviderError, u32, Duration) + Send + Sync>;

/// Executor for retry operations
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    retry_if: RetryPredicate,
    on_retry: Option<RetryCallback>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_if: Arc::new(is_retryable_error),
            on_retry: None,
        }
    }

    /// Replace the retryable-error predicate
    pub fn with_retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ProviderError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Called with `(error, attempt, delay)` after each failed attempt that
    /// will be retried, before sleeping; `attempt` is 1-based
    pub fn on_retry<C>(mut self, callback: C) -> Self
    where
        C: Fn(&ProviderError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before retrying after `error` on 1-based `attempt`
    fn delay_for(&self, error: &ProviderError, attempt: u32) -> Duration {
        match error {
            ProviderError::RateLimit {
                retry_after_ms: Some(ms),
                ..
            } => Duration::from_millis(*ms),
            _ => self.policy.calculate_delay(attempt.saturating_sub(1)),
        }
    }

    /// Execute an operation with retry logic
    ///
    /// Exhausting the budget returns the last error unchanged.
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if attempt >= max_attempts || !(self.retry_if)(&error) {
                return Err(error);
            }

            let delay = self.delay_for(&error, attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying provider call"
            );

            if let Some(callback) = &self.on_retry {
                callback(&error, attempt, delay);
            }

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.jitter_factor, 0.1);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = no_jitter();
        for attempt in 0..10 {
            let expected = (1000u64 * 2u64.pow(attempt)).min(30_000);
            assert_eq!(policy.calculate_delay(attempt).as_millis() as u64, expected);
        }
    }

    proptest! {
        #[test]
        fn prop_jitter_stays_in_band(attempt in 0u32..16, jitter in 0.0f64..=1.0) {
            let policy = RetryPolicy { jitter_factor: jitter, ..Default::default() };
            let base = (1000.0 * 2f64.powi(attempt as i32)).min(30_000.0);
            let delay = policy.calculate_delay(attempt).as_millis() as f64;
            prop_assert!(delay >= (base * (1.0 - jitter)).floor() - 1.0);
            prop_assert!(delay <= base * (1.0 + jitter) + 1.0);
        }
    }

    #[test_case(ProviderError::Timeout { timeout_ms: 1 }, true ; "timeout")]
    #[test_case(ProviderError::RateLimit { message: String::new(), retry_after_ms: None }, true ; "rate limit")]
    #[test_case(ProviderError::with_status("x", 503), true ; "server error")]
    #[test_case(ProviderError::with_status("x", 400), false ; "client error")]
    #[test_case(ProviderError::provider("reset"), false ; "no status")]
    #[test_case(ProviderError::Authentication("no".into()), false ; "auth")]
    #[test_case(ProviderError::Configuration("bad".into()), false ; "config")]
    fn test_default_predicate(error: ProviderError, expected: bool) {
        assert_eq!(is_retryable_error(&error), expected);
    }

    #[test]
    fn test_presets_and_deserialization() {
        assert_eq!(RetryPolicy::preset("aggressive"), Some(RetryPolicy::aggressive()));
        assert_eq!(RetryPolicy::preset("nope"), None);

        let policy: RetryPolicy = serde_yaml::from_str("conservative").unwrap();
        assert_eq!(policy, RetryPolicy::conservative());

        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 7").unwrap();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.initial_delay_ms, 1000);

        assert!(serde_yaml::from_str::<RetryPolicy>("bogus").is_err());
        assert!(serde_yaml::from_str::<RetryPolicy>("max_attemps: 2").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate("retry").is_ok());
        let err = RetryPolicy::new(0).validate("retry").unwrap_err();
        assert_eq!(err.field_path, "retry.max_attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_timeouts_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let callbacks = Arc::new(AtomicU32::new(0));

        let cb = callbacks.clone();
        let executor = RetryExecutor::new(RetryPolicy::new(3)).on_retry(move |err, attempt, _| {
            assert!(matches!(err, ProviderError::Timeout { .. }));
            assert_eq!(cb.fetch_add(1, Ordering::SeqCst) + 1, attempt);
        });

        let counter = calls.clone();
        let result = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::Timeout { timeout_ms: 100 })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(callbacks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryExecutor::new(no_jitter())
            .execute(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(ProviderError::with_status(format!("attempt {}", n), 502)) }
            })
            .await;

        assert_eq!(result, Err(ProviderError::with_status("attempt 2", 502)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryExecutor::new(RetryPolicy::default())
            .on_retry(|_, _, _| panic!("must not retry"))
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Authentication("bad key".into())) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_used_verbatim() {
        let delays = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = delays.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = RetryExecutor::new(RetryPolicy::default())
            .on_retry(move |_, _, delay| seen.lock().push(delay))
            .execute(|| {
                let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        Err(ProviderError::RateLimit {
                            message: "slow down".into(),
                            retry_after_ms: Some(4321),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*delays.lock(), vec![Duration::from_millis(4321)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryExecutor::new(RetryPolicy::new(4))
            .with_retry_if(|_| false)
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout { timeout_ms: 1 }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
