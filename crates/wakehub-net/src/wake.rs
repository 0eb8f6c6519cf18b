//! UDP broadcast wake sender

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use wakehub_core::traits::WakeSender;
use wakehub_core::wake::{WakeError, magic_packet, parse_mac};

/// Ports a magic packet is sent to
pub const WAKE_PORTS: [u16; 2] = [9, 7];

/// Sends magic packets to a broadcast address
#[derive(Debug, Clone)]
pub struct UdpWakeSender {
    target: Ipv4Addr,
    ports: Vec<u16>,
}

impl Default for UdpWakeSender {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpWakeSender {
    /// Limited broadcast (`255.255.255.255`) on ports 9 and 7
    pub fn new() -> Self {
        Self {
            target: Ipv4Addr::BROADCAST,
            ports: WAKE_PORTS.to_vec(),
        }
    }

    /// Send to another address, e.g. a subnet broadcast
    pub fn with_target(mut self, target: Ipv4Addr, ports: Vec<u16>) -> Self {
        self.target = target;
        self.ports = ports;
        self
    }
}

#[async_trait]
impl WakeSender for UdpWakeSender {
    async fn send_magic_packet(&self, mac: &str) -> Result<(), WakeError> {
        let packet = magic_packet(parse_mac(mac)?);

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| WakeError::SocketFailed(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| WakeError::SocketFailed(e.to_string()))?;

        let mut last_error = None;
        let mut delivered = false;
        for port in &self.ports {
            let addr = SocketAddrV4::new(self.target, *port);
            match socket.send_to(&packet, addr).await {
                Ok(_) => delivered = true,
                Err(e) => {
                    warn!("Wake packet to {} failed: {}", addr, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        if delivered {
            debug!("Wake packet sent to {}", self.target);
            Ok(())
        } else {
            Err(WakeError::SendFailed(
                last_error.unwrap_or_else(|| "no ports configured".to_string()),
            ))
        }
    }
}
