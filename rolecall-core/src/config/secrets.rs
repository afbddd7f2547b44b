//! Secrets handling and redaction for configuration
//!
//! API keys are wrapped in [`SecretString`] so they never show up in
//! `Debug`/`Display` output, and header values are redacted by name before
//! they reach a log line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A wrapper type for sensitive strings like API keys
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    /// Create a new secret string
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value (use with caution)
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    /// Check if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Get a partially redacted version for debugging
    pub fn partial_redact(&self) -> String {
        if self.value.is_empty() {
            return "[EMPTY]".to_string();
        }

        let chars: Vec<char> = self.value.chars().collect();
        let len = chars.len();
        if len <= 8 {
            // Very short secrets get fully redacted
            return "[REDACTED]".to_string();
        }

        let head = if self.value.starts_with("sk-") || self.value.starts_with("pk-") {
            3
        } else {
            2
        };
        let tail = if head == 3 { 4 } else { 2 };
        let prefix: String = chars[..head].iter().collect();
        let suffix: String = chars[len - tail..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Redact a value when its name looks sensitive
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    const SENSITIVE_PATTERNS: [&str; 8] = [
        "api_key",
        "api-key",
        "secret",
        "token",
        "password",
        "credential",
        "auth",
        "private",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| field_lower.contains(pattern))
    {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}
