//! Network primitives
//!
//! Thin capability interfaces over sockets and HTTP. Implementations live in
//! `wakehub-net`; tests use scripted doubles.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::wake::WakeError;

/// Broadcasts magic wake packets
#[async_trait]
pub trait WakeSender: Send + Sync {
    /// Send one magic packet for `mac`
    ///
    /// `mac` is the configured string; the implementation parses it with
    /// [`crate::wake::parse_mac`] and fails with [`WakeError::InvalidMac`].
    async fn send_magic_packet(&self, mac: &str) -> Result<(), WakeError>;
}

/// Checks whether a host accepts TCP connections
#[async_trait]
pub trait HostProber: Send + Sync {
    /// `true` if `ip:port` accepted a connection within the prober's timeout
    async fn probe(&self, ip: Ipv4Addr, port: u16) -> bool;
}

/// Response of a bounded HTTP GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Status is 200 OK
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP(S) client with per-call timeout, following redirects
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url`, failing with `Error::Timeout`/`Error::Http` on transport problems
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, crate::Error>;
}

/// Reports whether the device currently has network connectivity
pub trait LinkMonitor: Send + Sync {
    /// Connectivity flag passed to every service tick
    fn is_connected(&self) -> bool;
}
