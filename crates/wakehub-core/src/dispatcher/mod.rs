//! Tick dispatcher
//!
//! Drives the four services from one cooperative loop:
//!
//! ```text
//!              ┌──────────────┐
//!  interval ──▶│TickDispatcher│── link.is_connected() once per tick
//!              └──────────────┘
//!                     │ fixed order
//!     ┌───────────┬───┴───────┬────────────┐
//!     ▼           ▼           ▼            ▼
//!  ┌───────┐  ┌──────┐   ┌────────┐   ┌─────────┐
//!  │ power │  │ ddns │   │ bridge │   │   ota   │
//!  └───────┘  └──────┘   └────────┘   └─────────┘
//!                             │ take_command()
//!                             ▼
//!                  power-on / OTA request / status reply
//! ```
//!
//! No service observes a sibling mid-update: each `tick` runs to completion
//! before the next one starts.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeStatus, CloudBridge};
use crate::config::{BemfaConfig, ComputerConfig, DdnsConfig, OtaConfig};
use crate::ddns::{DdnsStatus, DdnsSynchronizer};
use crate::ota::{OtaAction, OtaError, OtaOrchestrator, OtaStatus, OtaTrigger};
use crate::power::{PowerAccepted, PowerError, PowerSequencer, PowerState, PowerStatus};
use crate::traits::LinkMonitor;

/// Default spacing of ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Why [`TickDispatcher::run_with_shutdown`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The shutdown future resolved
    Shutdown,
    /// A firmware upgrade completed and wants a restart
    RestartRequested,
}

/// A command received from the cloud bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCommand {
    PowerOn,
    Check,
    Upgrade,
    Status,
}

impl CloudCommand {
    /// Parse a cleaned command string
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "on" | "wake" | "poweron" => Some(Self::PowerOn),
            "check" => Some(Self::Check),
            "upgrade" | "update" => Some(Self::Upgrade),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Status text published for a power state
pub fn power_state_text(state: &PowerState) -> String {
    match state {
        PowerState::Idle => "idle".to_string(),
        PowerState::Booting => "booting".to_string(),
        PowerState::On => "on".to_string(),
        PowerState::Failed(e) => format!("failed:{}", e.code()),
    }
}

/// Receives periodic snapshots from [`TickDispatcher::run_with_shutdown`]
pub type SnapshotSink = Box<dyn FnMut(&SystemSnapshot) + Send>;

/// Everything the console shows, in one serializable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    /// RFC 3339
    pub generated_at: String,
    pub wifi_connected: bool,
    pub computer: ComputerConfig,
    pub power: PowerStatus,
    pub ddns: DdnsStatus,
    pub bridge: BridgeStatus,
    pub ota: OtaStatus,
}

/// Cooperative scheduler for the four services
pub struct TickDispatcher {
    link: Arc<dyn LinkMonitor>,
    power: PowerSequencer,
    ddns: DdnsSynchronizer,
    bridge: CloudBridge,
    ota: OtaOrchestrator,
    computer: ComputerConfig,
    tick_interval: Duration,
    wifi_connected: bool,
    published_power: PowerState,
    snapshot_sink: Option<(Duration, SnapshotSink)>,
}

impl TickDispatcher {
    /// Assemble a dispatcher
    pub fn new(
        link: Arc<dyn LinkMonitor>,
        power: PowerSequencer,
        ddns: DdnsSynchronizer,
        bridge: CloudBridge,
        ota: OtaOrchestrator,
    ) -> Self {
        Self {
            link,
            power,
            ddns,
            bridge,
            ota,
            computer: ComputerConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            wifi_connected: false,
            published_power: PowerState::Idle,
            snapshot_sink: None,
        }
    }

    /// Set the tick spacing
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Hand a snapshot to `sink` every `every` while running
    pub fn set_snapshot_sink(&mut self, every: Duration, sink: SnapshotSink) {
        self.snapshot_sink = Some((every, sink));
    }

    /// Power-on sequencer
    pub fn power(&self) -> &PowerSequencer {
        &self.power
    }

    /// DDNS synchronizer
    pub fn ddns(&self) -> &DdnsSynchronizer {
        &self.ddns
    }

    /// Cloud command bridge
    pub fn bridge(&self) -> &CloudBridge {
        &self.bridge
    }

    /// Firmware upgrade orchestrator
    pub fn ota(&self) -> &OtaOrchestrator {
        &self.ota
    }

    /// Mutable access for wiring (notifier, installed version)
    pub fn ota_mut(&mut self) -> &mut OtaOrchestrator {
        &mut self.ota
    }

    /// Current target computer
    pub fn computer_config(&self) -> &ComputerConfig {
        &self.computer
    }

    /// Replace the target computer (used by the next power-on request)
    pub fn update_computer_config(&mut self, config: ComputerConfig) {
        self.computer = config.normalized();
    }

    /// Replace the DDNS records
    pub fn update_ddns_config(&mut self, config: DdnsConfig) {
        self.ddns.update_config(config);
    }

    /// Replace the bridge config
    pub async fn update_bemfa_config(&mut self, config: BemfaConfig) -> bool {
        self.bridge.update_config(config).await
    }

    /// Replace the OTA config
    pub fn update_ota_config(&mut self, config: OtaConfig) {
        self.ota.update_config(config);
    }

    /// Console power-on request against the current target
    pub fn request_power_on(&mut self) -> Result<PowerAccepted, PowerError> {
        let wifi = self.link.is_connected();
        self.power.request_power_on(&self.computer, wifi)
    }

    /// Console or cloud OTA request
    pub fn request_ota(&mut self, action: OtaAction, trigger: OtaTrigger) -> Result<(), OtaError> {
        let wifi = self.link.is_connected();
        self.ota.request(action, trigger, wifi)
    }

    /// Run every service once, then route one cloud command
    pub async fn tick_once(&mut self) {
        let wifi = self.link.is_connected();
        if wifi != self.wifi_connected {
            info!("Connectivity {}", if wifi { "up" } else { "down" });
            self.wifi_connected = wifi;
        }

        self.power.tick(wifi).await;
        self.ddns.tick(wifi).await;
        self.bridge.tick(wifi).await;
        self.ota.tick(wifi).await;

        if let Some(command) = self.bridge.take_command() {
            self.route_command(&command, wifi).await;
        }

        self.publish_power_transition().await;
    }

    async fn route_command(&mut self, command: &str, wifi: bool) {
        let Some(parsed) = CloudCommand::parse(command) else {
            warn!("Ignoring unknown cloud command: {:?}", command);
            return;
        };
        debug!("Routing cloud command {:?}", parsed);

        match parsed {
            CloudCommand::PowerOn => match self.power.request_power_on(&self.computer, wifi) {
                Ok(accepted) => info!("Cloud power-on: {}", accepted.code()),
                Err(e) => warn!("Cloud power-on rejected: {}", e.code()),
            },
            CloudCommand::Check => {
                if let Err(e) = self.ota.request_check(OtaTrigger::Cloud, wifi) {
                    warn!("Cloud OTA check rejected: {}", e.code());
                }
            }
            CloudCommand::Upgrade => {
                if let Err(e) = self.ota.request_upgrade(OtaTrigger::Cloud, wifi) {
                    warn!("Cloud OTA upgrade rejected: {}", e.code());
                }
            }
            CloudCommand::Status => {
                let text = power_state_text(self.power.state());
                if let Err(e) = self.bridge.publish_status(&text).await {
                    debug!("Status reply not published: {}", e);
                }
            }
        }
    }

    async fn publish_power_transition(&mut self) {
        let current = self.power.state().clone();
        if current == self.published_power {
            return;
        }
        self.published_power = current.clone();
        if current == PowerState::Idle {
            return;
        }

        let text = power_state_text(&current);
        if let Err(e) = self.bridge.publish_status(&text).await {
            debug!("Power state {} not published: {}", text, e);
        }
    }

    /// Snapshot of all service statuses
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            generated_at: chrono::Utc::now().to_rfc3339(),
            wifi_connected: self.wifi_connected,
            computer: self.computer.clone(),
            power: self.power.status(),
            ddns: self.ddns.status(),
            bridge: self.bridge.status(),
            ota: self.ota.status(),
        }
    }

    /// Tick until `shutdown` resolves or an upgrade requests a restart
    pub async fn run_with_shutdown<F>(&mut self, shutdown: F) -> DispatchExit
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);
        let snapshot_every = self
            .snapshot_sink
            .as_ref()
            .map_or(Duration::from_secs(3600), |(every, _)| *every);
        let mut snapshots = IntervalStream::new(tokio::time::interval(snapshot_every));
        tokio::pin!(shutdown);

        info!("Dispatcher started, tick every {:?}", self.tick_interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_snapshot();
                    return DispatchExit::Shutdown;
                }
                Some(_) = ticks.next() => {
                    self.tick_once().await;
                    if self.ota.restart_requested() {
                        info!("Firmware upgrade complete, restart requested");
                        self.emit_snapshot();
                        return DispatchExit::RestartRequested;
                    }
                }
                Some(_) = snapshots.next() => self.emit_snapshot(),
            }
        }
    }

    fn emit_snapshot(&mut self) {
        if self.snapshot_sink.is_none() {
            return;
        }
        let snapshot = self.snapshot();
        if let Some((_, sink)) = self.snapshot_sink.as_mut() {
            sink(&snapshot);
        }
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher")
            .field("power", &self.power)
            .field("ddns", &self.ddns)
            .field("bridge", &self.bridge)
            .field("ota", &self.ota)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}
