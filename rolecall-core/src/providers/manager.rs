//! Provider manager
//!
//! Owns the factory registry (type tag to constructor) and the live adapter
//! instances (configured name to adapter). Instances are rebuilt wholesale
//! whenever the provider configuration changes.

use crate::config::ProviderConfig;
use crate::http::HttpClient;
use crate::providers::{Provider, ProviderError, ProviderResult, ProviderType};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds an adapter from its configured name and settings
pub type ProviderFactory =
    Arc<dyn Fn(&str, &ProviderConfig, &HttpClient) -> ProviderResult<Arc<dyn Provider>> + Send + Sync>;

/// Registry of provider factories and live provider instances
pub struct ProviderManager {
    http: HttpClient,
    factories: HashMap<String, ProviderFactory>,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderManager")
            .field("registered_types", &self.registered_types())
            .field("configured_providers", &self.configured_providers())
            .finish()
    }
}

impl ProviderManager {
    /// Create a manager with the built-in factories and no instances
    pub fn new(http: HttpClient) -> Self {
        let mut manager = Self {
            http,
            factories: HashMap::new(),
            providers: RwLock::new(HashMap::new()),
        };

        for provider_type in ProviderType::all() {
            let provider_type = *provider_type;
            manager.register_factory(provider_type.as_str(), move |name, config, http| {
                provider_type.create_provider(name, config, http)
            });
        }

        manager
    }

    /// Create a manager with a default pooled HTTP client
    pub fn with_default_client() -> ProviderResult<Self> {
        Ok(Self::new(HttpClient::new()?))
    }

    /// Register (or replace) the factory for a type tag
    pub fn register_factory<F>(&mut self, type_tag: impl Into<String>, factory: F)
    where
        F: Fn(&str, &ProviderConfig, &HttpClient) -> ProviderResult<Arc<dyn Provider>>
            + Send
            + Sync
            + 'static,
    {
        let type_tag = type_tag.into();
        debug!("Registering provider factory '{}'", type_tag);
        self.factories.insert(type_tag, Arc::new(factory));
    }

    pub fn has_factory(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Rebuild every instance from `providers`
    ///
    /// All instances are built before any is swapped in; if one fails the
    /// previous set stays active and the error is returned.
    pub fn update_config(&self, providers: &HashMap<String, ProviderConfig>) -> ProviderResult<()> {
        let mut built: HashMap<String, Arc<dyn Provider>> = HashMap::with_capacity(providers.len());

        for (name, config) in providers {
            let type_tag = config.type_tag(name);
            let factory = self.factories.get(type_tag).ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "Provider '{}' has unknown type '{}'. Registered types: {}",
                    name,
                    type_tag,
                    self.registered_types().join(", ")
                ))
            })?;

            let provider = factory(name, config, &self.http).map_err(|e| {
                warn!(provider = %name, "Failed to build provider: {}", e);
                e
            })?;
            built.insert(name.clone(), provider);
        }

        let count = built.len();
        *self.providers.write() = built;
        info!("Provider set rebuilt with {} instance(s)", count);
        Ok(())
    }

    /// Live instance for a configured provider name
    pub fn get(&self, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        self.providers.read().get(name).cloned().ok_or_else(|| {
            ProviderError::Configuration(format!("Provider '{}' is not configured", name))
        })
    }

    /// Type tags with a registered factory, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Names of live provider instances, sorted
    pub fn configured_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn health_check(&self, name: &str) -> ProviderResult<()> {
        let provider = self.get(name)?;
        provider.health_check().await
    }

    /// Health of every configured provider, sorted by name
    pub async fn health_check_all(&self) -> Vec<(String, ProviderResult<()>)> {
        let mut providers: Vec<(String, Arc<dyn Provider>)> = self
            .providers
            .read()
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect();
        providers.sort_by(|a, b| a.0.cmp(&b.0));

        let checks = providers.into_iter().map(|(name, provider)| async move {
            let result = provider.health_check().await;
            if let Err(e) = &result {
                warn!(provider = %name, "Health check failed: {}", e);
            }
            (name, result)
        });

        join_all(checks).await
    }
}
