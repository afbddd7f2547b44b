//! Metrics recording
//!
//! The router reports through an injected [`MetricsRecorder`]; hosts bridge it
//! to whatever metrics backend they run. Logs go through `tracing` directly.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Requests per provider/model/outcome (counter)
pub const REQUESTS: &str = "rolecall.requests";

/// End-to-end invocation latency in milliseconds (histogram)
pub const REQUEST_DURATION_MS: &str = "rolecall.request.duration_ms";

/// Input tokens per successful invocation (histogram)
pub const TOKENS_INPUT: &str = "rolecall.tokens.input";

/// Output tokens per successful invocation (histogram)
pub const TOKENS_OUTPUT: &str = "rolecall.tokens.output";

/// Retries scheduled by the retry executor (counter)
pub const RETRIES: &str = "rolecall.retries";

/// Fallback hops taken (counter)
pub const FALLBACKS: &str = "rolecall.fallbacks";

/// Circuit breaker state changes, labelled provider/from/to (counter)
pub const CIRCUIT_TRANSITIONS: &str = "rolecall.circuit.transitions";

/// Label pairs attached to a metric sample
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Sink for router metrics
pub trait MetricsRecorder: Send + Sync {
    fn increment_counter(&self, name: &str, value: u64, labels: Labels<'_>);

    fn record_histogram(&self, name: &str, value: f64, labels: Labels<'_>);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: Labels<'_>) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: Labels<'_>) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: Labels<'_>) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }

    /// Whether this key carries `name` and every pair in `filter`
    fn matches(&self, name: &str, filter: Labels<'_>) -> bool {
        self.name == name
            && filter
                .iter()
                .all(|(k, v)| self.labels.iter().any(|(lk, lv)| lk == k && lv == v))
    }
}

/// Keeps every sample in memory; for tests and diagnostics
#[derive(Default)]
pub struct InMemoryRecorder {
    counters: Mutex<HashMap<MetricKey, u64>>,
    histograms: Mutex<HashMap<MetricKey, Vec<f64>>>,
}

impl fmt::Debug for InMemoryRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRecorder")
            .field("counters", &self.counters.lock().len())
            .field("histograms", &self.histograms.lock().len())
            .finish()
    }
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of counter `name` over every label set containing `filter`
    pub fn counter(&self, name: &str, filter: Labels<'_>) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(key, _)| key.matches(name, filter))
            .map(|(_, value)| *value)
            .sum()
    }

    /// Samples of histogram `name` over every label set containing `filter`
    pub fn histogram(&self, name: &str, filter: Labels<'_>) -> Vec<f64> {
        self.histograms
            .lock()
            .iter()
            .filter(|(key, _)| key.matches(name, filter))
            .flat_map(|(_, values)| values.iter().copied())
            .collect()
    }

    pub fn clear(&self) {
        self.counters.lock().clear();
        self.histograms.lock().clear();
    }
}

impl MetricsRecorder for InMemoryRecorder {
    fn increment_counter(&self, name: &str, value: u64, labels: Labels<'_>) {
        *self
            .counters
            .lock()
            .entry(MetricKey::new(name, labels))
            .or_insert(0) += value;
    }

    fn record_histogram(&self, name: &str, value: f64, labels: Labels<'_>) {
        self.histograms
            .lock()
            .entry(MetricKey::new(name, labels))
            .or_default()
            .push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_filter_by_label_subset() {
        let recorder = InMemoryRecorder::new();
        recorder.increment_counter(REQUESTS, 1, &[("provider", "a"), ("outcome", "success")]);
        recorder.increment_counter(REQUESTS, 2, &[("outcome", "success"), ("provider", "a")]);
        recorder.increment_counter(REQUESTS, 1, &[("provider", "b"), ("outcome", "error")]);

        assert_eq!(recorder.counter(REQUESTS, &[]), 4);
        assert_eq!(recorder.counter(REQUESTS, &[("provider", "a")]), 3);
        assert_eq!(recorder.counter(REQUESTS, &[("outcome", "error")]), 1);
        assert_eq!(recorder.counter(RETRIES, &[]), 0);
    }

    #[test]
    fn test_histograms_and_clear() {
        let recorder = InMemoryRecorder::new();
        recorder.record_histogram(TOKENS_INPUT, 12.0, &[("model", "m")]);
        recorder.record_histogram(TOKENS_INPUT, 8.0, &[("model", "m")]);
        assert_eq!(recorder.histogram(TOKENS_INPUT, &[("model", "m")]), vec![12.0, 8.0]);

        recorder.clear();
        assert!(recorder.histogram(TOKENS_INPUT, &[]).is_empty());
    }

    #[test]
    fn test_noop_is_object_safe() {
        let recorder: Box<dyn MetricsRecorder> = Box::new(NoopRecorder);
        recorder.increment_counter(FALLBACKS, 1, &[]);
    }
}
