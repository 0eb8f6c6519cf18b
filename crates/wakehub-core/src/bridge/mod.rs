//! Cloud command bridge
//!
//! Holds a broker session open, turns inbound messages on the command topics
//! into single-slot commands and publishes status text.
//!
//! `tick` runs a priority-ordered guard chain:
//!
//! 1. disabled → `DISABLED`
//! 2. uid/topic missing → `WAIT_CONFIG`
//! 3. no connectivity → `WAIT_WIFI` (an open session is closed)
//! 4. connected → service the session; a failure demotes to `ERROR`
//! 5. not connected → reconnect, at most once per [`RECONNECT_INTERVAL_MS`]

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, elapsed_ms};
use crate::config::BemfaConfig;
use crate::traits::{ConnectOptions, InboundMessage, PubSubClient};

/// Minimum time between connect attempts
pub const RECONNECT_INTERVAL_MS: u32 = 5_000;

/// Keep-alive requested from the broker
pub const KEEP_ALIVE_SECS: u16 = 60;

/// Payload published after every successful connect
pub const ONLINE_PAYLOAD: &str = "online";

/// Prefix of the synthesized fallback client id
const FALLBACK_CLIENT_PREFIX: &str = "wakehub-";

/// Bridge failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// No broker session
    #[error("not connected to the broker")]
    NotConnected,

    /// Connect (primary and fallback) failed
    #[error("broker connect failed: {0}")]
    ConnectFailed(String),

    /// Neither command topic could be subscribed
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Publish failed on an open session
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Servicing the session failed
    #[error("session error: {0}")]
    SessionFailed(String),
}

impl BridgeError {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "mqtt_not_connected",
            Self::ConnectFailed(_) => "mqtt_connect_failed",
            Self::SubscribeFailed(_) => "mqtt_subscribe_failed",
            Self::PublishFailed(_) => "mqtt_publish_failed",
            Self::SessionFailed(_) => "mqtt_loop_failed",
        }
    }
}

/// Bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Disabled,
    WaitConfig,
    WaitWifi,
    Ready,
    Connecting,
    Online,
    Offline,
    Error,
}

impl BridgeState {
    /// Upper-case state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::WaitConfig => "WAIT_CONFIG",
            Self::WaitWifi => "WAIT_WIFI",
            Self::Ready => "READY",
            Self::Connecting => "CONNECTING",
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Error => "ERROR",
        }
    }
}

/// Status snapshot for the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub state: String,
    pub message: String,
    pub error_code: Option<String>,
    pub connected: bool,
    pub reconnect_count: u32,
    pub host: String,
    pub port: u16,
    pub subscribe_topic: String,
    pub legacy_topic: String,
    pub publish_topic: String,
    pub last_command: String,
}

/// Strip CR/LF/NUL, trim and lowercase a payload; `None` if nothing is left
pub fn clean_command(payload: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(payload)
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect();
    let command = text.trim().to_lowercase();
    if command.is_empty() { None } else { Some(command) }
}

fn fallback_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", FALLBACK_CLIENT_PREFIX, &id[..12])
}

/// Cloud command bridge
pub struct CloudBridge {
    clock: Arc<dyn Clock>,
    client: Box<dyn PubSubClient>,
    config: BemfaConfig,
    state: BridgeState,
    message: String,
    last_error: Option<BridgeError>,
    last_attempt_at: Option<u32>,
    reconnect_count: u32,
    pending_command: Option<String>,
    last_command: String,
}

impl CloudBridge {
    /// Create a disabled bridge
    pub fn new(clock: Arc<dyn Clock>, client: Box<dyn PubSubClient>) -> Self {
        Self {
            clock,
            client,
            config: BemfaConfig::default(),
            state: BridgeState::Disabled,
            message: "disabled".to_string(),
            last_error: None,
            last_attempt_at: None,
            reconnect_count: 0,
            pending_command: None,
            last_command: String::new(),
        }
    }

    /// Current normalized config
    pub fn config(&self) -> &BemfaConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Apply a new config
    ///
    /// Returns `false` when the normalized config equals the current one; the
    /// session is left untouched in that case.
    pub async fn update_config(&mut self, config: BemfaConfig) -> bool {
        let config = config.normalized();
        if config == self.config {
            debug!("Bridge config unchanged");
            return false;
        }

        if self.client.is_connected() {
            info!("Bridge config changed, closing broker session");
            self.client.disconnect().await;
        }
        self.config = config;
        self.last_attempt_at = None;
        self.last_error = None;

        if !self.config.enabled {
            self.set_state(BridgeState::Disabled, "disabled");
        } else if !self.config.is_configured() {
            self.set_state(BridgeState::WaitConfig, "uid and topic required");
        } else {
            self.set_state(BridgeState::Ready, "ready to connect");
        }
        true
    }

    fn set_state(&mut self, state: BridgeState, message: impl Into<String>) {
        if self.state != state {
            info!("Bridge state {} -> {}", self.state.name(), state.name());
        }
        self.state = state;
        self.message = message.into();
    }

    fn set_error(&mut self, error: BridgeError) {
        warn!("Bridge error: {}", error);
        self.set_state(BridgeState::Error, error.to_string());
        self.last_error = Some(error);
    }

    /// Run the guard chain once
    pub async fn tick(&mut self, wifi_connected: bool) {
        if !self.config.enabled {
            self.set_state(BridgeState::Disabled, "disabled");
            return;
        }
        if !self.config.is_configured() {
            self.set_state(BridgeState::WaitConfig, "uid and topic required");
            return;
        }
        if !wifi_connected {
            if self.client.is_connected() {
                self.client.disconnect().await;
            }
            self.set_state(BridgeState::WaitWifi, "waiting for WiFi");
            return;
        }

        if self.client.is_connected() {
            self.service_session().await;
            return;
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.last_attempt_at {
            if elapsed_ms(now, last) < RECONNECT_INTERVAL_MS {
                return;
            }
        }
        self.last_attempt_at = Some(now);
        self.connect().await;
    }

    async fn service_session(&mut self) {
        match self.client.poll().await {
            Ok(messages) => {
                for message in messages {
                    self.handle_message(message);
                }
                if self.client.is_connected() {
                    if self.state != BridgeState::Online {
                        self.set_state(BridgeState::Online, "connected");
                    }
                } else {
                    self.set_state(BridgeState::Offline, "broker connection lost");
                }
            }
            Err(e) => {
                self.client.disconnect().await;
                self.set_error(BridgeError::SessionFailed(e.to_string()));
            }
        }
    }

    async fn connect(&mut self) {
        self.set_state(
            BridgeState::Connecting,
            format!("connecting to {}:{}", self.config.host, self.config.port),
        );

        let primary = ConnectOptions {
            host: self.config.host.clone(),
            port: self.config.port,
            client_id: self.config.uid.clone(),
            username: None,
            password: None,
            keep_alive_secs: KEEP_ALIVE_SECS,
        };

        if let Err(primary_err) = self.client.connect(&primary).await {
            if self.config.key.is_empty() {
                self.set_error(BridgeError::ConnectFailed(primary_err.to_string()));
                return;
            }

            debug!("Primary connect failed ({}), retrying with key", primary_err);
            let fallback = ConnectOptions {
                client_id: fallback_client_id(),
                username: Some(self.config.uid.clone()),
                password: Some(self.config.key.clone()),
                ..primary
            };
            if let Err(e) = self.client.connect(&fallback).await {
                self.set_error(BridgeError::ConnectFailed(e.to_string()));
                return;
            }
        }

        let canonical = self.client.subscribe(&self.config.subscribe_topic()).await;
        let legacy = self.client.subscribe(&self.config.legacy_topic()).await;
        if let (Err(e), Err(_)) = (&canonical, &legacy) {
            let error = BridgeError::SubscribeFailed(e.to_string());
            self.client.disconnect().await;
            self.set_error(error);
            return;
        }
        if let Err(e) = canonical.as_ref().and(legacy.as_ref()) {
            debug!("One command topic could not be subscribed: {}", e);
        }

        let topic = self.config.publish_topic();
        if let Err(e) = self.client.publish(&topic, ONLINE_PAYLOAD).await {
            warn!("Failed to publish online status: {}", e);
        }

        self.reconnect_count += 1;
        self.last_error = None;
        self.set_state(BridgeState::Online, "connected");
        info!(
            "Bridge online at {}:{} (connect #{})",
            self.config.host, self.config.port, self.reconnect_count
        );
    }

    fn handle_message(&mut self, message: InboundMessage) {
        if message.topic != self.config.subscribe_topic()
            && message.topic != self.config.legacy_topic()
        {
            debug!("Ignoring message on {}", message.topic);
            return;
        }

        let Some(command) = clean_command(&message.payload) else {
            debug!("Ignoring empty command on {}", message.topic);
            return;
        };

        info!("Cloud command received: {}", command);
        if let Some(dropped) = self.pending_command.replace(command.clone()) {
            debug!("Untaken command {:?} overwritten", dropped);
        }
        self.last_command = command;
    }

    /// Take the pending command, leaving the slot empty
    pub fn take_command(&mut self) -> Option<String> {
        self.pending_command.take()
    }

    /// Publish status text on the publish topic
    pub async fn publish_status(&mut self, text: &str) -> Result<(), BridgeError> {
        if !self.client.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        let topic = self.config.publish_topic();
        self.client
            .publish(&topic, text)
            .await
            .map_err(|e| BridgeError::PublishFailed(e.to_string()))
    }

    /// Status snapshot
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            state: self.state.name().to_string(),
            message: self.message.clone(),
            error_code: self.last_error.as_ref().map(|e| e.code().to_string()),
            connected: self.client.is_connected(),
            reconnect_count: self.reconnect_count,
            host: self.config.host.clone(),
            port: self.config.port,
            subscribe_topic: self.config.subscribe_topic(),
            legacy_topic: self.config.legacy_topic(),
            publish_topic: self.config.publish_topic(),
            last_command: self.last_command.clone(),
        }
    }
}

impl std::fmt::Debug for CloudBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudBridge")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("reconnect_count", &self.reconnect_count)
            .finish_non_exhaustive()
    }
}
