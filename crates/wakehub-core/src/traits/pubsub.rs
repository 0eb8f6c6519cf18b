//! Pub/sub broker session
//!
//! Inbound messages are pulled by the bridge through [`PubSubClient::poll`]
//! instead of being pushed through a registered callback, so no global state
//! is needed to route them back to the bridge instance.

use async_trait::async_trait;

/// Parameters of one connect attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client identity presented to the broker
    pub client_id: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    /// ⚠️ NEVER log this value
    pub password: Option<String>,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create a message
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Trait for pub/sub broker clients
///
/// Every call is bounded by the implementation's own timeout.
#[async_trait]
pub trait PubSubClient: Send {
    /// Open a session; any previous session is closed first
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), crate::Error>;

    /// Subscribe to one topic and wait for the broker's acknowledgement
    async fn subscribe(&mut self, topic: &str) -> Result<(), crate::Error>;

    /// Publish a text payload
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), crate::Error>;

    /// Service the session and return messages received since the last call
    ///
    /// A dropped session is reported by [`is_connected`](Self::is_connected)
    /// turning false, not as an error.
    async fn poll(&mut self) -> Result<Vec<InboundMessage>, crate::Error>;

    /// Close the session (no-op when not connected)
    async fn disconnect(&mut self);

    /// Session is currently established
    fn is_connected(&self) -> bool;
}
