// # Address Resolver Trait
//
// Defines the interface for finding the address a DNS record should point at.
//
// ## Implementations
//
// - Interface lookup + HTTP echo services: `wakehub-ip` crate
//
// ## Usage
//
// ```rust,ignore
// use wakehub_core::traits::{AddressResolver, AddressScope};
//
// let resolver = /* AddressResolver implementation */;
// let public_ip = resolver.resolve(AddressScope::Public).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Which address a record publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressScope {
    /// Address of the device's own network interface
    Local,
    /// Address the device is seen from on the internet
    Public,
}

impl AddressScope {
    /// Scope selected by a record's `use_local_ip` flag
    pub fn from_use_local(use_local_ip: bool) -> Self {
        if use_local_ip { Self::Local } else { Self::Public }
    }
}

/// Trait for address resolver implementations
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Query network interfaces
/// - ✅ Perform bounded HTTP requests to echo services
///
/// ## Forbidden Capabilities
/// - ❌ Perform DNS updates (use [`DnsRecordClient`](super::DnsRecordClient))
/// - ❌ Retry in a loop with sleeps (the synchronizer owns scheduling)
/// - ❌ Cache results across calls (every due record asks again)
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the current address for the given scope
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current address
    /// - `Err(Error)`: If no address could be determined
    async fn resolve(&self, scope: AddressScope) -> Result<IpAddr, crate::Error>;
}
