// # wakehub-mqtt
//
// rumqttc-backed [`PubSubClient`] for the cloud command bridge.
//
// ## Driving the event loop
//
// rumqttc splits a session into an `AsyncClient` (request queue) and an
// `EventLoop` (network I/O). No task is spawned here: the event loop only
// runs while one of the trait methods is awaiting it.
//
// - `connect` / `subscribe` / `publish` drive the loop until the matching
//   acknowledgement or outgoing packet, bounded by [`ACK_TIMEOUT`]
// - `poll` drives the loop for one short slice and returns the publishes
//   received, including any that arrived while waiting for an ack
//
// A connection error or broker `DISCONNECT` ends the session; the bridge
// sees `is_connected() == false` and schedules its own reconnect.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    SubscribeReasonCode,
};
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use wakehub_core::traits::{ConnectOptions, InboundMessage, PubSubClient};
use wakehub_core::{Error, Result};

/// Bound on waiting for CONNACK, SUBACK or an outgoing publish
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one `poll` services the socket
pub const POLL_SLICE: Duration = Duration::from_millis(20);

/// Capacity of the client request queue
const REQUEST_CAPACITY: usize = 10;

/// Build rumqttc options from the bridge's connect options
pub fn mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut opts = MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
    opts.set_keep_alive(Duration::from_secs(u64::from(options.keep_alive_secs)));
    opts.set_clean_session(true);
    if let Some(username) = options.username.as_deref() {
        let password = options.password.clone().unwrap_or_default();
        opts.set_credentials(username, password);
    }
    opts
}

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// Drive `eventloop` until `done` yields a result or `limit` elapses
///
/// Publishes seen on the way are appended to `inbox`.
async fn drive_until<F>(
    eventloop: &mut EventLoop,
    inbox: &mut Vec<InboundMessage>,
    limit: Duration,
    what: &str,
    mut done: F,
) -> Result<()>
where
    F: FnMut(&Event) -> Option<Result<()>> + Send,
{
    let work = async {
        loop {
            let event = eventloop
                .poll()
                .await
                .map_err(|e| Error::pubsub(format!("{}: {}", what, e)))?;
            if let Event::Incoming(Incoming::Publish(p)) = &event {
                inbox.push(InboundMessage::new(p.topic.clone(), p.payload.to_vec()));
            }
            if let Some(result) = done(&event) {
                return result;
            }
        }
    };
    timeout(limit, work)
        .await
        .map_err(|_| Error::timeout(what.to_string()))?
}

/// MQTT 3.1.1 client
pub struct RumqttPubSub {
    session: Option<Session>,
    pending: Vec<InboundMessage>,
    poll_slice: Duration,
}

impl Default for RumqttPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl RumqttPubSub {
    pub fn new() -> Self {
        Self {
            session: None,
            pending: Vec::new(),
            poll_slice: POLL_SLICE,
        }
    }

    /// Change how long each `poll` services the socket
    pub fn with_poll_slice(mut self, slice: Duration) -> Self {
        self.poll_slice = slice;
        self
    }
}

impl std::fmt::Debug for RumqttPubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumqttPubSub")
            .field("connected", &self.session.is_some())
            .field("pending", &self.pending.len())
            .field("poll_slice", &self.poll_slice)
            .finish()
    }
}

#[async_trait]
impl PubSubClient for RumqttPubSub {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        self.disconnect().await;

        let (client, mut eventloop) = AsyncClient::new(mqtt_options(options), REQUEST_CAPACITY);
        drive_until(&mut eventloop, &mut self.pending, ACK_TIMEOUT, "MQTT connect", |event| {
            match event {
                Event::Incoming(Incoming::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                    Some(Ok(()))
                }
                Event::Incoming(Incoming::ConnAck(ack)) => Some(Err(Error::pubsub(format!(
                    "Connection refused: {:?}",
                    ack.code
                )))),
                _ => None,
            }
        })
        .await?;

        info!("MQTT connected to {}:{}", options.host, options.port);
        self.session = Some(Session { client, eventloop });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::pubsub("Not connected"));
        };
        session
            .client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::pubsub(format!("Subscribe {}: {}", topic, e)))?;

        drive_until(&mut session.eventloop, &mut self.pending, ACK_TIMEOUT, "MQTT subscribe", |event| {
            match event {
                Event::Incoming(Incoming::SubAck(ack)) => {
                    if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                        Some(Err(Error::pubsub("Subscription rejected by broker")))
                    } else {
                        Some(Ok(()))
                    }
                }
                _ => None,
            }
        })
        .await?;

        debug!("Subscribed to {}", topic);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::pubsub("Not connected"));
        };
        session
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| Error::pubsub(format!("Publish {}: {}", topic, e)))?;

        drive_until(&mut session.eventloop, &mut self.pending, ACK_TIMEOUT, "MQTT publish", |event| {
            match event {
                Event::Outgoing(Outgoing::Publish(_)) => Some(Ok(())),
                _ => None,
            }
        })
        .await
    }

    async fn poll(&mut self) -> Result<Vec<InboundMessage>> {
        let mut inbox = std::mem::take(&mut self.pending);
        let Some(session) = self.session.as_mut() else {
            return Ok(inbox);
        };

        let deadline = Instant::now() + self.poll_slice;
        let mut dropped = false;
        loop {
            match timeout_at(deadline, session.eventloop.poll()).await {
                // Slice used up
                Err(_) => break,
                Ok(Ok(Event::Incoming(Incoming::Publish(p)))) => {
                    inbox.push(InboundMessage::new(p.topic.clone(), p.payload.to_vec()));
                }
                Ok(Ok(Event::Incoming(Incoming::Disconnect))) => {
                    info!("Broker closed the MQTT session");
                    dropped = true;
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("MQTT connection lost: {}", e);
                    dropped = true;
                    break;
                }
            }
        }

        if dropped {
            self.session = None;
        }
        Ok(inbox)
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match session.client.try_disconnect() {
            Ok(()) => {
                // Give the DISCONNECT packet a chance to leave
                match timeout(self.poll_slice, session.eventloop.poll()).await {
                    Ok(Ok(event)) => debug!("MQTT event while closing: {:?}", event),
                    Ok(Err(e)) => debug!("MQTT connection ended while closing: {}", e),
                    Err(_) => debug!("No MQTT event within {:?} while closing", self.poll_slice),
                }
            }
            Err(e) => debug!("MQTT DISCONNECT not queued: {}", e),
        }
        debug!("MQTT session closed");
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(port: u16) -> ConnectOptions {
        ConnectOptions {
            host: "127.0.0.1".to_string(),
            port,
            client_id: "0123456789abcdef".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }

    #[test]
    fn options_carry_identity_and_keep_alive() {
        let opts = mqtt_options(&options(9501));
        assert_eq!(opts.client_id(), "0123456789abcdef");
        assert_eq!(opts.keep_alive(), Duration::from_secs(60));
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 9501));
    }

    #[tokio::test]
    async fn idle_client_is_offline() {
        let mut client = RumqttPubSub::new();
        assert!(!client.is_connected());
        assert!(client.poll().await.unwrap().is_empty());
        assert!(client.publish("t", "on").await.is_err());
        assert!(client.subscribe("t").await.is_err());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_sends_disconnect_packet() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let n = socket.read(&mut connect).await.unwrap();
            assert_eq!(connect[0] >> 4, 1, "first packet is CONNECT");
            assert!(n > 2);
            // CONNACK, session not present, accepted
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let mut client = RumqttPubSub::new().with_poll_slice(Duration::from_millis(500));
        client.connect(&options(port)).await.unwrap();
        assert!(client.is_connected());

        client.disconnect().await;
        assert!(!client.is_connected());

        let rest = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        assert!(rest.windows(2).any(|w| w == [0xE0, 0x00]));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = RumqttPubSub::new();
        assert!(client.connect(&options(port)).await.is_err());
        assert!(!client.is_connected());
    }
}
