//! Power-on sequencer
//!
//! Wakes the target computer and tracks its boot until it answers on the
//! probe port.
//!
//! ## State machine
//!
//! ```text
//!            request_power_on (valid)
//!  ┌──────┐ ─────────────────────────▶ ┌─────────┐  probe ok   ┌────┐
//!  │ Idle │                            │ Booting │ ──────────▶ │ On │
//!  └──────┘ ◀─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ └─────────┘             └────┘
//!     │        (next request)               │
//!     │ rejected                            │ wifi lost / timeout / send failed
//!     ▼                                     ▼
//!  ┌────────────────────────────────────────────┐
//!  │                 Failed(code)               │
//!  └────────────────────────────────────────────┘
//! ```
//!
//! While `Booting`, two independent loops share the tick: up to three wake
//! packets spaced 400 ms apart, and a reachability probe every 2 s. The first
//! successful probe wins regardless of how many packets went out.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, deadline_reached, elapsed_ms};
use crate::config::ComputerConfig;
use crate::traits::{HostProber, WakeSender};
use crate::wake::WakeError;

/// Overall boot deadline
pub const BOOT_TIMEOUT_MS: u32 = 60_000;

/// Spacing between wake packets
pub const WAKE_RETRY_INTERVAL_MS: u32 = 400;

/// Wake packets sent per request
pub const MAX_WAKE_PACKETS: u32 = 3;

/// Spacing between reachability probes
pub const PROBE_INTERVAL_MS: u32 = 2_000;

/// Why a power-on request failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PowerError {
    /// No network connectivity
    #[error("WiFi is not connected")]
    WifiNotConnected,

    /// Target MAC is empty
    #[error("target MAC address is not configured")]
    MacRequired,

    /// Target IP does not parse as IPv4
    #[error("target IP {0:?} is not a valid IPv4 address")]
    IpInvalid(String),

    /// Host did not come up in time
    #[error("host did not respond within {}s", BOOT_TIMEOUT_MS / 1000)]
    BootTimeout,

    /// Wake packet could not be sent
    #[error(transparent)]
    Wake(#[from] WakeError),
}

impl PowerError {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::WifiNotConnected => "wifi_not_connected",
            Self::MacRequired => "config_mac_required",
            Self::IpInvalid(_) => "config_ip_invalid",
            Self::BootTimeout => "boot_timeout",
            Self::Wake(e) => e.code(),
        }
    }
}

/// Accepted outcome of a power-on request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAccepted {
    /// A new boot sequence started
    Started,
    /// A sequence is already running
    AlreadyBooting,
    /// The host already came up
    AlreadyOn,
}

impl PowerAccepted {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::AlreadyBooting => "already_booting",
            Self::AlreadyOn => "already_on",
        }
    }
}

/// Sequencer state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PowerState {
    /// No request yet
    #[default]
    Idle,
    /// Waking and probing
    Booting,
    /// Host answered the probe
    On,
    /// Request rejected or sequence aborted
    Failed(PowerError),
}

impl PowerState {
    /// Lower-case state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Booting => "booting",
            Self::On => "on",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
struct BootAttempt {
    ip: Ipv4Addr,
    mac: String,
    port: u16,
    started_at: u32,
    packets_sent: u32,
    last_packet_at: u32,
    probe_attempts: u32,
    next_probe_at: u32,
    /// Frozen once the sequence ends
    finished_after_ms: Option<u32>,
}

/// Status snapshot for the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerStatus {
    pub state: String,
    pub error_code: Option<String>,
    pub message: String,
    pub packets_sent: u32,
    pub probe_attempts: u32,
    pub elapsed_ms: u32,
    pub target_ip: String,
    pub target_mac: String,
    pub target_port: u16,
}

/// Power-on sequencer
pub struct PowerSequencer {
    clock: Arc<dyn Clock>,
    sender: Arc<dyn WakeSender>,
    prober: Arc<dyn HostProber>,
    state: PowerState,
    attempt: Option<BootAttempt>,
    message: String,
}

impl PowerSequencer {
    /// Create an idle sequencer
    pub fn new(
        clock: Arc<dyn Clock>,
        sender: Arc<dyn WakeSender>,
        prober: Arc<dyn HostProber>,
    ) -> Self {
        Self {
            clock,
            sender,
            prober,
            state: PowerState::Idle,
            attempt: None,
            message: "idle".to_string(),
        }
    }

    /// Current state
    pub fn state(&self) -> &PowerState {
        &self.state
    }

    /// Start waking the configured computer
    ///
    /// Already booting or already on are accepted without side effects.
    /// Every rejection leaves the sequencer in `Failed` with the error code.
    pub fn request_power_on(
        &mut self,
        config: &ComputerConfig,
        wifi_connected: bool,
    ) -> Result<PowerAccepted, PowerError> {
        match self.state {
            PowerState::Booting => return Ok(PowerAccepted::AlreadyBooting),
            PowerState::On => return Ok(PowerAccepted::AlreadyOn),
            _ => {}
        }

        let validated = if !wifi_connected {
            Err(PowerError::WifiNotConnected)
        } else if config.mac.trim().is_empty() {
            Err(PowerError::MacRequired)
        } else {
            config
                .parsed_ip()
                .ok_or_else(|| PowerError::IpInvalid(config.ip.clone()))
        };

        let ip = match validated {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Power-on request rejected: {}", e);
                self.fail(e.clone());
                return Err(e);
            }
        };

        let now = self.clock.now_ms();
        self.attempt = Some(BootAttempt {
            ip,
            mac: config.mac.trim().to_string(),
            port: config.probe_port(),
            started_at: now,
            packets_sent: 0,
            last_packet_at: now,
            probe_attempts: 0,
            next_probe_at: now,
            finished_after_ms: None,
        });
        self.state = PowerState::Booting;
        self.message = format!("waking {} ({})", ip, config.mac.trim());
        info!("Power-on started for {} via {}", ip, config.mac.trim());

        Ok(PowerAccepted::Started)
    }

    /// Advance the boot sequence
    pub async fn tick(&mut self, wifi_connected: bool) {
        if self.state != PowerState::Booting {
            return;
        }
        let Some(mut attempt) = self.attempt.take() else {
            self.state = PowerState::Idle;
            return;
        };

        let outcome = self.step(&mut attempt, wifi_connected).await;
        if !matches!(outcome, Ok(false)) {
            attempt.finished_after_ms = Some(elapsed_ms(self.clock.now_ms(), attempt.started_at));
        }
        let ip = attempt.ip;
        let probes = attempt.probe_attempts;
        self.attempt = Some(attempt);

        match outcome {
            Ok(false) => {}
            Ok(true) => {
                self.state = PowerState::On;
                self.message = format!("{} is up", ip);
                info!("Host {} is up after {} probe(s)", ip, probes);
            }
            Err(e) => {
                warn!("Power-on sequence for {} failed: {}", ip, e);
                self.fail(e);
            }
        }
    }

    /// One booting tick; `Ok(true)` once the host answered
    async fn step(&self, attempt: &mut BootAttempt, wifi_connected: bool) -> Result<bool, PowerError> {
        if !wifi_connected {
            return Err(PowerError::WifiNotConnected);
        }

        let now = self.clock.now_ms();
        if elapsed_ms(now, attempt.started_at) >= BOOT_TIMEOUT_MS {
            return Err(PowerError::BootTimeout);
        }

        let packet_due = attempt.packets_sent == 0
            || elapsed_ms(now, attempt.last_packet_at) >= WAKE_RETRY_INTERVAL_MS;
        if attempt.packets_sent < MAX_WAKE_PACKETS && packet_due {
            self.sender.send_magic_packet(&attempt.mac).await?;
            attempt.packets_sent += 1;
            attempt.last_packet_at = now;
            debug!(
                "Wake packet {}/{} sent to {}",
                attempt.packets_sent, MAX_WAKE_PACKETS, attempt.mac
            );
        }

        if deadline_reached(now, attempt.next_probe_at) {
            attempt.probe_attempts += 1;
            attempt.next_probe_at = now.wrapping_add(PROBE_INTERVAL_MS);
            if self.prober.probe(attempt.ip, attempt.port).await {
                return Ok(true);
            }
            debug!(
                "Probe {} of {}:{} got no answer",
                attempt.probe_attempts, attempt.ip, attempt.port
            );
        }

        Ok(false)
    }

    fn fail(&mut self, error: PowerError) {
        self.message = error.to_string();
        self.state = PowerState::Failed(error);
    }

    /// Status snapshot
    pub fn status(&self) -> PowerStatus {
        let now = self.clock.now_ms();
        let (packets_sent, probe_attempts, elapsed, ip, mac, port) = match &self.attempt {
            Some(a) => (
                a.packets_sent,
                a.probe_attempts,
                a.finished_after_ms
                    .unwrap_or_else(|| elapsed_ms(now, a.started_at)),
                a.ip.to_string(),
                a.mac.clone(),
                a.port,
            ),
            None => (0, 0, 0, String::new(), String::new(), 0),
        };

        PowerStatus {
            state: self.state.name().to_string(),
            error_code: match &self.state {
                PowerState::Failed(e) => Some(e.code().to_string()),
                _ => None,
            },
            message: self.message.clone(),
            packets_sent,
            probe_attempts,
            elapsed_ms: elapsed,
            target_ip: ip,
            target_mac: mac,
            target_port: port,
        }
    }
}

impl std::fmt::Debug for PowerSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerSequencer")
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}
