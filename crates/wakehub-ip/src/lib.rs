// # Address Resolver
//
// Resolves the address a DDNS record should publish.
//
// ## Sources
//
// - **Local**: first non-loopback IPv4 address of the host's interfaces
//   (`if-addrs`), falling back to IPv6 when no IPv4 address exists
// - **Public**: plain-text echo endpoints queried in order; the first
//   endpoint answering with a parseable address wins
//
// ## Architecture
//
// The resolver holds no cache and runs no background task: the DDNS
// synchronizer calls it once per due record, and every endpoint call is
// bounded by its own timeout.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wakehub_core::traits::{AddressResolver, AddressScope, HttpClient};
use wakehub_core::{Error, Result};

/// Default echo endpoints, tried in order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",  // plain text IPv4
    "https://ifconfig.me/ip", // No rate limit documented
    "https://icanhazip.com",  // trailing newline
];

/// Timeout of one echo endpoint call
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse an echo endpoint body
pub fn parse_echo_body(body: &str) -> Option<IpAddr> {
    body.trim().parse().ok()
}

/// Pick the address to publish from `(is_loopback, address)` pairs
///
/// IPv4 is preferred; IPv6 link-local addresses are never picked.
pub fn pick_local_address<I>(addrs: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = (bool, IpAddr)>,
{
    let candidates: Vec<IpAddr> = addrs
        .into_iter()
        .filter(|(loopback, ip)| !loopback && !ip.is_unspecified())
        .map(|(_, ip)| ip)
        .collect();

    candidates
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| {
            candidates.iter().copied().find(|ip| match ip {
                // fe80::/10
                IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
                IpAddr::V4(_) => false,
            })
        })
}

/// Local address from the host's interfaces
pub fn local_interface_address() -> Result<IpAddr> {
    let interfaces = if_addrs::get_if_addrs()?;
    pick_local_address(interfaces.iter().map(|iface| (iface.is_loopback(), iface.ip())))
        .ok_or_else(|| Error::address_lookup("No non-loopback interface address"))
}

/// Resolver backed by host interfaces and public echo endpoints
pub struct SystemAddressResolver {
    http: Arc<dyn HttpClient>,
    services: Vec<String>,
}

impl SystemAddressResolver {
    /// Resolver using [`DEFAULT_IP_SERVICES`]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_services(http, DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    /// Resolver using the given endpoints in order
    pub fn with_services(http: Arc<dyn HttpClient>, services: Vec<String>) -> Self {
        Self { http, services }
    }

    /// Configured endpoints
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Query the echo endpoints until one answers with an address
    pub async fn public_address(&self) -> Result<IpAddr> {
        let mut last_error = None;

        for url in &self.services {
            match self.http.get(url, ECHO_TIMEOUT).await {
                Ok(response) if response.is_ok() => match parse_echo_body(&response.body) {
                    Some(ip) => {
                        debug!("Public address {} from {}", ip, url);
                        return Ok(ip);
                    }
                    None => {
                        warn!("Unparseable address from {}", url);
                        last_error = Some(format!("{}: unparseable body", url));
                    }
                },
                Ok(response) => {
                    warn!("{} answered with status {}", url, response.status);
                    last_error = Some(format!("{}: status {}", url, response.status));
                }
                Err(e) => {
                    warn!("{} failed: {}", url, e);
                    last_error = Some(format!("{}: {}", url, e));
                }
            }
        }

        Err(Error::address_lookup(
            last_error.unwrap_or_else(|| "No echo endpoints configured".to_string()),
        ))
    }
}

impl std::fmt::Debug for SystemAddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAddressResolver")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AddressResolver for SystemAddressResolver {
    async fn resolve(&self, scope: AddressScope) -> Result<IpAddr> {
        match scope {
            AddressScope::Local => local_interface_address(),
            AddressScope::Public => self.public_address().await,
        }
    }
}
