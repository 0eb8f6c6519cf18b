//! Plugin-based provider registry
//!
//! DNS provider crates register a factory under their provider id; the DDNS
//! synchronizer asks the registry for a fresh client every time it rebuilds
//! its records.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In wakehub-provider-aliyun
//! pub fn register(registry: &mut ProviderRegistry, http: Arc<dyn HttpClient>) {
//!     registry.register_provider("aliyun", Box::new(AliyunFactory::new(http)));
//! }
//! ```

use crate::config::DdnsRecordConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProviderFactory, DnsRecordClient};
use std::collections::HashMap;

/// Provider registry for plugin-based DNS client creation
///
/// Registration happens once at startup, before the registry is handed to
/// the synchronizer, so plain `&mut self` registration is enough.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider id as used in `DdnsRecordConfig::provider`
    /// - `factory`: Factory object for creating per-record clients
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(&mut self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into();
        tracing::debug!("Registered DNS provider: {}", name);
        self.providers.insert(name, factory);
    }

    /// Create a client for one record
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsRecordClient>)`: Fresh client (no cached record id)
    /// - `Err(Error)`: If the provider is not registered or creation fails
    pub fn create_client(&self, record: &DdnsRecordConfig) -> Result<Box<dyn DnsRecordClient>> {
        let factory = self
            .providers
            .get(record.provider.as_str())
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", record.provider)))?;

        factory.create(record)
    }

    /// List all registered provider ids
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider id is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}
