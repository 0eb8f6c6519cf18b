// # DNS Record Client Trait
//
// Defines the interface for reading and writing one DNS record via a
// provider's signed API.
//
// ## Implementations
//
// - Alibaba Cloud DNS: `wakehub-provider-aliyun` crate
//
// ## Usage
//
// ```rust,ignore
// use wakehub_core::traits::{DnsRecordClient, UpdateResult};
//
// let mut client = registry.create_client(&record_config)?;
// match client.sync("203.0.113.7".parse()?).await? {
//     UpdateResult::Updated { previous_ip, new_ip } => { /* confirmed write */ }
//     UpdateResult::Created { new_ip } => { /* confirmed write */ }
//     UpdateResult::Unchanged { .. } => { /* nothing to do */ }
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::DdnsRecordConfig;

/// Result of a DNS sync operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// Record was successfully updated
    Updated {
        /// The previous IP address
        previous_ip: Option<IpAddr>,
        /// The new IP address
        new_ip: IpAddr,
    },
    /// Record already had the correct IP (no-op)
    Unchanged {
        /// The current IP address
        current_ip: IpAddr,
    },
    /// Record was created (didn't exist before)
    Created {
        /// The created IP address
        new_ip: IpAddr,
    },
}

impl UpdateResult {
    /// `true` when the provider confirmed a write
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Metadata about a DNS record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    /// The record ID (provider-specific)
    pub id: String,
    /// The full record name
    pub name: String,
    /// The current IP address
    pub ip: IpAddr,
    /// Time-to-live for the record
    pub ttl: Option<u32>,
}

/// Trait for a per-record DNS provider client
///
/// One client is built for every configured record and lives exactly as long
/// as the runtime record that owns it. The client may cache the provider's
/// opaque record id between calls; a config rebuild drops that cache.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTPS API calls to the provider endpoint only
/// - ✅ Cache the provider record id for its own record
/// - ✅ Return success or failure (the synchronizer schedules the next attempt)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Access the config store
/// - ❌ Resolve addresses (the synchronizer passes the address in)
#[async_trait]
pub trait DnsRecordClient: Send + Sync {
    /// Make the record point at `ip`
    ///
    /// - Record exists with a different value → update it
    /// - Record exists with the same value → `UpdateResult::Unchanged`
    /// - Record doesn't exist → create it
    ///
    /// `Updated`/`Created` are the provider's confirmation of a real write.
    async fn sync(&mut self, ip: IpAddr) -> Result<UpdateResult, crate::Error>;

    /// Read the current record from the provider
    ///
    /// `ip_hint` only selects the record type (A for IPv4, AAAA for IPv6).
    /// The first call discovers and caches the provider record id; a missing
    /// record is `Error::NotFound`.
    async fn describe(&mut self, ip_hint: IpAddr) -> Result<RecordMetadata, crate::Error>;

    /// Provider record id discovered so far
    fn cached_record_id(&self) -> Option<&str>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing record clients from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a client for one record
    ///
    /// # Parameters
    ///
    /// - `record`: Normalized record configuration (domain + credentials)
    ///
    /// # Returns
    ///
    /// A boxed DnsRecordClient trait object
    fn create(&self, record: &DdnsRecordConfig) -> Result<Box<dyn DnsRecordClient>, crate::Error>;
}
