//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::Config;
use super::secrets::SecretString;
use regex::{Captures, Regex};
use std::env;

const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

fn env_var_pattern() -> Result<Regex, ConfigError> {
    Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Interpolation {
        message: format!("invalid interpolation pattern: {}", e),
    })
}

/// Replace every `${VAR}` in `content` with the variable's value.
///
/// Fails on the first variable that is not set.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let pattern = env_var_pattern()?;
    let mut missing: Option<String> = None;

    let result = pattern.replace_all(content, |cap: &Captures<'_>| {
        match env::var(&cap[1]) {
            Ok(value) => value,
            Err(_) => {
                if missing.is_none() {
                    missing = Some(cap[1].to_string());
                }
                String::new()
            }
        }
    });

    if let Some(var) = missing {
        return Err(ConfigError::EnvVarNotFound { var });
    }

    Ok(result.into_owned())
}

/// Interpolate placeholders left in provider credentials and endpoints.
///
/// Configs built in code never pass through the text-level pass, so the
/// fields that usually carry placeholders are resolved here as well.
pub fn interpolate_config_env_vars(config: &mut Config) -> Result<(), ConfigError> {
    let pattern = env_var_pattern()?;

    for provider in config.providers.values_mut() {
        let api_key = provider.api_key.expose_secret();
        if pattern.is_match(api_key) {
            provider.api_key = SecretString::new(interpolate_env_vars(api_key)?);
        }

        if let Some(base_url) = provider.base_url.as_mut() {
            if pattern.is_match(base_url) {
                *base_url = interpolate_env_vars(base_url)?;
            }
        }

        for value in provider.headers.values_mut() {
            if pattern.is_match(value) {
                *value = interpolate_env_vars(value)?;
            }
        }
    }

    Ok(())
}
