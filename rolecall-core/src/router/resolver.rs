//! Role resolution
//!
//! Merges a role's overrides onto the configured defaults to produce a fully
//! resolved [`AgentConfig`].

use super::types::AgentConfig;
use crate::config::{Config, DefaultsConfig, RoleConfig};
use crate::providers::{ProviderError, ProviderResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct RoleTable {
    defaults: DefaultsConfig,
    roles: HashMap<String, RoleConfig>,
}

/// Maps role names to agent configurations
///
/// [`update_config`](Self::update_config) swaps the table in place, so every
/// holder of the resolver observes the change.
#[derive(Debug, Default)]
pub struct RoleResolver {
    table: RwLock<RoleTable>,
}

impl RoleResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            table: RwLock::new(RoleTable {
                defaults: config.defaults.clone(),
                roles: config.roles.clone(),
            }),
        }
    }

    /// Resolve `role` against the current defaults
    pub fn resolve(&self, role: &str) -> ProviderResult<AgentConfig> {
        let table = self.table.read();

        let Some(role_config) = table.roles.get(role) else {
            return Err(ProviderError::Configuration(format!(
                "Unknown role '{}'. Available roles: {}",
                role,
                Self::describe_roles(&table.roles)
            )));
        };

        let defaults = &table.defaults;
        let agent = AgentConfig {
            role: role.to_string(),
            provider: role_config.provider.clone(),
            model: role_config.model.clone(),
            system_prompt: role_config
                .system_prompt
                .clone()
                .or_else(|| defaults.system_prompt.clone()),
            temperature: role_config.temperature.unwrap_or(defaults.temperature),
            max_tokens: role_config.max_tokens.unwrap_or(defaults.max_tokens),
            timeout_ms: role_config.timeout_ms.unwrap_or(defaults.timeout_ms),
            fallback: role_config
                .fallback
                .clone()
                .or_else(|| defaults.fallback.clone()),
        };

        debug!(role = %role, provider = %agent.provider, model = %agent.model, "Resolved role");
        Ok(agent)
    }

    /// Replace roles and defaults
    pub fn update_config(&self, config: &Config) {
        let mut table = self.table.write();
        table.defaults = config.defaults.clone();
        table.roles = config.roles.clone();
    }

    /// Configured role names, sorted
    pub fn list_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.table.read().roles.keys().cloned().collect();
        roles.sort();
        roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.table.read().roles.contains_key(role)
    }

    fn describe_roles(roles: &HashMap<String, RoleConfig>) -> String {
        if roles.is_empty() {
            return "(none configured)".to_string();
        }
        let mut names: Vec<&str> = roles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.join(", ")
    }
}
