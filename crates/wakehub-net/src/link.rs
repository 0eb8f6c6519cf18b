//! Link state from host interfaces

use std::net::IpAddr;
use tracing::warn;
use wakehub_core::traits::LinkMonitor;

/// `true` if any address is neither loopback nor link-local
pub fn has_routable_interface<I>(addrs: I) -> bool
where
    I: IntoIterator<Item = (bool, IpAddr)>,
{
    addrs.into_iter().any(|(loopback, ip)| {
        !loopback
            && match ip {
                IpAddr::V4(v4) => !v4.is_link_local() && !v4.is_unspecified(),
                IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80 && !v6.is_unspecified(),
            }
    })
}

/// Reports connectivity when an interface holds a routable address
#[derive(Debug, Clone, Default)]
pub struct InterfaceLinkMonitor;

impl InterfaceLinkMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkMonitor for InterfaceLinkMonitor {
    fn is_connected(&self) -> bool {
        match if_addrs::get_if_addrs() {
            Ok(interfaces) => has_routable_interface(
                interfaces.iter().map(|iface| (iface.is_loopback(), iface.ip())),
            ),
            Err(e) => {
                warn!("Interface enumeration failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_only_is_disconnected() {
        assert!(!has_routable_interface(vec![
            (true, "127.0.0.1".parse().unwrap()),
            (true, "::1".parse().unwrap()),
        ]));
    }

    #[test]
    fn link_local_only_is_disconnected() {
        assert!(!has_routable_interface(vec![
            (false, "169.254.10.1".parse().unwrap()),
            (false, "fe80::1".parse().unwrap()),
        ]));
    }

    #[test]
    fn lan_address_is_connected() {
        assert!(has_routable_interface(vec![
            (true, "127.0.0.1".parse().unwrap()),
            (false, "192.168.1.20".parse().unwrap()),
        ]));
    }
}
