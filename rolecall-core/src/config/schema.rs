//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::providers::{CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Values applied to every role unless the role overrides them
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Named agent personas
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,

    /// Named provider endpoints
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Retry policy wrapping every provider call
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Settings for the per-provider circuit breakers
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Values every role inherits unless it sets its own
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Fallback for roles that do not name their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            system_prompt: None,
            fallback: None,
        }
    }
}

/// A named agent persona bound to one provider and model
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Name of the provider entry to call
    pub provider: String,

    /// Model identifier passed to the provider
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Alternate provider/model tried once when the primary fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
}

impl RoleConfig {
    /// Create a role bound to a provider and model
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: None,
            fallback: None,
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the fallback provider/model
    pub fn with_fallback(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.fallback = Some(FallbackConfig::new(provider, model));
        self
    }
}

/// Fallback target of a role
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    pub provider: String,
    pub model: String,
}

impl FallbackConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.provider.is_empty() {
            return Err(ValidationError::required(format!("{}.provider", path)));
        }
        if self.model.is_empty() {
            return Err(ValidationError::required(format!("{}.model", path)));
        }
        Ok(())
    }
}

/// Credentials and endpoint for one named provider
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider type tag; defaults to the provider's name
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,

    /// API key (supports environment variable interpolation)
    pub api_key: SecretString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Extra headers sent with every request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create a provider entry with only an API key
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            provider_type: None,
            api_key: api_key.into(),
            base_url: None,
            organization: None,
            project: None,
            location: None,
            headers: HashMap::new(),
        }
    }

    /// Set the type tag
    pub fn with_type(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = Some(provider_type.into());
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Type tag used to select a factory, falling back to the entry's name
    pub fn type_tag<'a>(&'a self, name: &'a str) -> &'a str {
        self.provider_type.as_deref().unwrap_or(name)
    }

    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::required(format!("{}.api_key", path)));
        }

        if let Some(base_url) = &self.base_url {
            match url::Url::parse(base_url) {
                Ok(url) => {
                    if url.scheme() != "http" && url.scheme() != "https" {
                        return Err(ValidationError::new(
                            format!("{}.base_url", path),
                            ValidationErrorKind::InvalidUrl {
                                message: format!(
                                    "URL scheme must be http or https, got: {}",
                                    url.scheme()
                                ),
                            },
                        ));
                    }
                }
                Err(e) => {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 4096 }
fn default_timeout_ms() -> u64 { 60000 }

fn validate_temperature(path: String, temperature: f32) -> Result<(), ValidationError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ValidationError::out_of_range(path, "Must be between 0.0 and 2.0"));
    }
    Ok(())
}

impl DefaultsConfig {
    /// Validate default values
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_temperature("defaults.temperature".to_string(), self.temperature)?;
        if self.max_tokens == 0 {
            return Err(ValidationError::out_of_range(
                "defaults.max_tokens",
                "Must be greater than 0",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                "defaults.timeout_ms",
                "Must be greater than 0",
            ));
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate("defaults.fallback")?;
        }
        Ok(())
    }
}

impl RoleConfig {
    /// Validate role-local values
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.provider.is_empty() {
            return Err(ValidationError::required(format!("{}.provider", path)));
        }
        if self.model.is_empty() {
            return Err(ValidationError::required(format!("{}.model", path)));
        }
        if let Some(temperature) = self.temperature {
            validate_temperature(format!("{}.temperature", path), temperature)?;
        }
        if self.max_tokens == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.max_tokens", path),
                "Must be greater than 0",
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_ms", path),
                "Must be greater than 0",
            ));
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate(&format!("{}.fallback", path))?;
        }
        Ok(())
    }
}

impl Config {
    /// Validate each section on its own; cross references are checked by
    /// [`ConfigValidator`](super::ConfigValidator)
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.defaults.validate()?;

        let mut provider_names: Vec<_> = self.providers.keys().collect();
        provider_names.sort();
        for name in provider_names {
            self.providers[name].validate(&format!("providers.{}", name))?;
        }

        let mut role_names: Vec<_> = self.roles.keys().collect();
        role_names.sort();
        for name in role_names {
            self.roles[name].validate(&format!("roles.{}", name))?;
        }

        self.retry.validate("retry")?;
        self.circuit_breaker.validate("circuit_breaker")?;
        Ok(())
    }
}
