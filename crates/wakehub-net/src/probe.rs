//! TCP reachability probe

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;
use wakehub_core::traits::HostProber;

/// Connect timeout of one probe
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Treats an accepted TCP connection as "host is up"
#[derive(Debug, Clone)]
pub struct TcpHostProber {
    timeout: Duration,
}

impl Default for TcpHostProber {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

impl TcpHostProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostProber for TcpHostProber {
    async fn probe(&self, ip: Ipv4Addr, port: u16) -> bool {
        match timeout(self.timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!("Probe {}:{} refused: {}", ip, port, e);
                false
            }
            Err(_) => {
                trace!("Probe {}:{} timed out", ip, port);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_port_is_up() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(TcpHostProber::default().probe(Ipv4Addr::LOCALHOST, port).await);
    }

    #[tokio::test]
    async fn closed_port_is_down() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!TcpHostProber::default().probe(Ipv4Addr::LOCALHOST, port).await);
    }
}
