//! Configuration module
//!
//! This module provides the configuration schema, loading and validation for
//! roles, providers and the resilience settings shared by every call.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{interpolate_config_env_vars, interpolate_env_vars};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{Config, DefaultsConfig, FallbackConfig, ProviderConfig, RoleConfig};
pub use secrets::{redact_by_field_name, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

fn read_config_file(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    // Interpolate environment variables before parsing
    env::interpolate_env_vars(&content)
}

fn finish_loading(
    mut config: Config,
    path: &Path,
    validator: &ConfigValidator,
) -> ConfigResult<Config> {
    env::interpolate_config_env_vars(&mut config)?;

    validator.validate(&config)?;
    debug!(
        path = %path.display(),
        roles = config.roles.len(),
        providers = config.providers.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
    load_from_yaml_with(path, &ConfigValidator::new())
}

/// Load a YAML configuration, validating with a custom validator
pub fn load_from_yaml_with<P: AsRef<Path>>(
    path: P,
    validator: &ConfigValidator,
) -> ConfigResult<Config> {
    let path = path.as_ref();
    let interpolated = read_config_file(path)?;

    let config: Config =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish_loading(config, path, validator)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
    load_from_json_with(path, &ConfigValidator::new())
}

/// Load a JSON configuration, validating with a custom validator
pub fn load_from_json_with<P: AsRef<Path>>(
    path: P,
    validator: &ConfigValidator,
) -> ConfigResult<Config> {
    let path = path.as_ref();
    let interpolated = read_config_file(path)?;

    let config: Config =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish_loading(config, path, validator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
defaults:
  temperature: 0.5
  max_tokens: 2048
  timeout_ms: 30000
providers:
  anthropic:
    api_key: sk-ant
  openai:
    api_key: sk-oai
    organization: org-1
roles:
  coder:
    provider: anthropic
    model: claude-sonnet-4
    system_prompt: You write code.
    fallback:
      provider: openai
      model: gpt-4o
  critic:
    provider: openai
    model: gpt-4o
    temperature: 0.1
retry:
  max_attempts: 5
circuit_breaker:
  failure_threshold: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.timeout_ms, 30000);
    }
}
