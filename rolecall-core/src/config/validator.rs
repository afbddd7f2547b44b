//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::Config;
use crate::providers::ProviderType;
use std::collections::HashSet;
use tracing::warn;

/// Configuration validator with cross-reference rules
pub struct ConfigValidator {
    /// Type tags that may appear without a registered custom factory
    known_types: HashSet<String>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Create a validator that knows the built-in provider types
    pub fn new() -> Self {
        Self {
            known_types: ProviderType::all()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        }
    }

    /// Accept an additional type tag (for custom factories)
    pub fn with_known_type(mut self, tag: impl Into<String>) -> Self {
        self.known_types.insert(tag.into());
        self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &Config) -> Result<(), ValidationError> {
        // First run the per-section validation
        config.validate()?;

        self.validate_provider_types(config)?;
        self.validate_role_references(config)?;
        self.warn_plaintext_keys(config);

        Ok(())
    }

    fn validate_provider_types(&self, config: &Config) -> Result<(), ValidationError> {
        let mut names: Vec<_> = config.providers.keys().collect();
        names.sort();

        for name in names {
            let tag = config.providers[name].type_tag(name);
            if !self.known_types.contains(tag) {
                let mut known: Vec<_> = self.known_types.iter().cloned().collect();
                known.sort();
                return Err(ValidationError::new(
                    format!("providers.{}.type", name),
                    ValidationErrorKind::UnknownProviderType {
                        tag: tag.to_string(),
                        known: known.join(", "),
                    },
                ));
            }
        }

        Ok(())
    }

    /// Every role and fallback must point at a configured provider
    fn validate_role_references(&self, config: &Config) -> Result<(), ValidationError> {
        if let Some(fallback) = &config.defaults.fallback {
            if !config.providers.contains_key(&fallback.provider) {
                return Err(ValidationError::unknown_reference(
                    "defaults.fallback.provider",
                    &fallback.provider,
                ));
            }
        }

        let mut names: Vec<_> = config.roles.keys().collect();
        names.sort();

        for name in names {
            let role = &config.roles[name];
            if !config.providers.contains_key(&role.provider) {
                return Err(ValidationError::unknown_reference(
                    format!("roles.{}.provider", name),
                    &role.provider,
                ));
            }

            if let Some(fallback) = &role.fallback {
                if !config.providers.contains_key(&fallback.provider) {
                    return Err(ValidationError::unknown_reference(
                        format!("roles.{}.fallback.provider", name),
                        &fallback.provider,
                    ));
                }

                if fallback.provider == role.provider && fallback.model == role.model {
                    return Err(ValidationError::new(
                        format!("roles.{}.fallback", name),
                        ValidationErrorKind::RedundantFallback,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Keys that are neither interpolated nor obviously placeholders are
    /// allowed, but logged once so they can be moved to the environment.
    fn warn_plaintext_keys(&self, config: &Config) {
        for (name, provider) in &config.providers {
            let key = provider.api_key.expose_secret();
            if key.len() > 16 && !key.contains("${") {
                warn!(
                    provider = %name,
                    key = %provider.api_key.partial_redact(),
                    "API key is stored in plain text; prefer ${{VAR}} interpolation"
                );
            }
        }
    }
}
