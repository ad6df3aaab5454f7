//! Message bus seam and transports
//!
//! The publisher only talks to a [`MessageBus`]. [`MqttBus`] publishes to an
//! MQTT broker; [`InMemoryBus`] captures messages in process and can simulate
//! outages.

use super::message::BusMessage;
use crate::types::{BusKind, RuntimeConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Transport failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// The broker could not be reached
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectFailed {
        /// Broker address
        endpoint: String,
        /// Underlying cause
        reason: String,
    },

    /// A message could not be delivered
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed {
        /// Destination topic
        topic: String,
        /// Underlying cause
        reason: String,
    },

    /// An operation exceeded its deadline
    #[error("{operation} timed out after {millis} ms")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Deadline in milliseconds
        millis: u64,
    },

    /// Publish attempted without a connection
    #[error("Not connected to the message bus")]
    NotConnected,

    /// The bus was closed
    #[error("Message bus connection closed")]
    Closed,
}

/// Publish/subscribe transport used by the streaming publisher
#[async_trait]
pub trait MessageBus: Send + Sync + Debug {
    /// Establish a connection, replacing any previous one
    async fn connect(&mut self) -> Result<(), BusError>;

    /// Publish one payload to `topic`
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Close the connection; never fails
    async fn disconnect(&mut self);

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// A message captured by [`InMemoryBus`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Destination topic
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the payload
    pub fn decode(&self) -> Result<BusMessage, serde_json::Error> {
        BusMessage::from_payload(&self.payload)
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    connected: bool,
    outage: bool,
    stalled: bool,
    connect_attempts: u64,
    messages: VecDeque<PublishedMessage>,
}

/// In-process bus with a switchable outage
///
/// Clones share state, so a test keeps one handle while the publisher owns
/// another. Only the most recent `capacity` messages are kept.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    state: Arc<Mutex<InMemoryState>>,
    capacity: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Default number of retained messages
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Create an empty bus
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create an empty bus retaining at most `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self { state: Arc::new(Mutex::new(InMemoryState::default())), capacity: capacity.max(1) }
    }

    /// Start or end a simulated broker outage
    ///
    /// During an outage connects and publishes fail and the connection drops.
    pub fn set_outage(&self, outage: bool) {
        let mut state = self.state.lock();
        state.outage = outage;
        if outage {
            state.connected = false;
        }
    }

    /// Make every operation hang until cleared
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of connect calls so far
    pub fn connect_attempts(&self) -> u64 {
        self.state.lock().connect_attempts
    }

    /// Captured messages, oldest first
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state.lock().messages.iter().cloned().collect()
    }

    /// Captured messages decoded, skipping any that fail to parse
    pub fn decoded(&self) -> Vec<BusMessage> {
        self.state.lock().messages.iter().filter_map(|message| message.decode().ok()).collect()
    }

    /// Remove and return captured messages
    pub fn take_messages(&self) -> Vec<PublishedMessage> {
        self.state.lock().messages.drain(..).collect()
    }

    fn stalled(&self) -> bool {
        self.state.lock().stalled
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn connect(&mut self) -> Result<(), BusError> {
        if self.stalled() {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.outage {
            return Err(BusError::ConnectFailed {
                endpoint: "memory".to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        if self.stalled() {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.outage {
            return Err(BusError::PublishFailed {
                topic: topic.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        if !state.connected {
            return Err(BusError::NotConnected);
        }

        if state.messages.len() == self.capacity {
            state.messages.pop_front();
        }
        state.messages.push_back(PublishedMessage { topic: topic.to_string(), payload: payload.to_vec() });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.stalled() {
            std::future::pending::<()>().await;
        }
        self.state.lock().connected = false;
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Broker address and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client identifier
    pub client_id: String,
    /// Username, if the broker requires one
    pub username: Option<String>,
    /// Password, if the broker requires one
    pub password: Option<String>,
}

impl BrokerSettings {
    /// Broker settings from the runtime configuration
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            host: config.broker_host.clone(),
            port: config.broker_port,
            client_id: config.client_id.clone(),
            username: config.broker_username.clone(),
            password: config.broker_password.clone(),
        }
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Keep-alive interval negotiated with the broker
pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Requests the client may queue ahead of its event loop
pub const MQTT_REQUEST_CAPACITY: usize = 64;

/// Time the event loop gets to flush a DISCONNECT before it is aborted
pub const MQTT_DISCONNECT_GRACE: Duration = Duration::from_millis(500);

impl BrokerSettings {
    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(MQTT_KEEP_ALIVE);
        options.set_clean_session(true);
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }
        options
    }
}

/// One broker connection: the client handle and the task polling its event loop
#[derive(Debug)]
struct MqttSession {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    events: JoinHandle<()>,
}

impl MqttSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.events.is_finished()
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.events.abort();
    }
}

/// Poll the event loop until the connection ends
async fn drive_events(mut events: EventLoop, connected: Arc<AtomicBool>, endpoint: String) {
    loop {
        match events.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(endpoint = %endpoint, "Disconnect sent to broker");
                break;
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "Broker connection lost");
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}

/// MQTT 3.1.1 transport
///
/// Messages are published with QoS 0 and without the retain flag. Publishing
/// only enqueues the message for the event loop, so a broker that stops reading
/// shows up as a failed publish once the queue is full, never as a hang.
#[derive(Debug)]
pub struct MqttBus {
    settings: BrokerSettings,
    session: Option<MqttSession>,
}

impl MqttBus {
    /// Create an unconnected bus
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings, session: None }
    }

    /// Broker this bus connects to
    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Whether the current session is still connected
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(MqttSession::is_connected)
    }

    fn connect_failed(&self, reason: impl ToString) -> BusError {
        BusError::ConnectFailed { endpoint: self.settings.endpoint(), reason: reason.to_string() }
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn connect(&mut self) -> Result<(), BusError> {
        self.session = None;

        let client_id = &self.settings.client_id;
        if client_id.is_empty() || client_id.starts_with(char::is_whitespace) {
            return Err(self.connect_failed(format!("invalid client id {:?}", client_id)));
        }

        let (client, mut events) =
            AsyncClient::new(self.settings.mqtt_options(), MQTT_REQUEST_CAPACITY);
        loop {
            match events.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(err) => return Err(self.connect_failed(err)),
            }
        }

        let connected = Arc::new(AtomicBool::new(true));
        let events =
            tokio::spawn(drive_events(events, Arc::clone(&connected), self.settings.endpoint()));

        info!(endpoint = %self.settings.endpoint(), client_id = %self.settings.client_id, "Connected to broker");
        self.session = Some(MqttSession { client, connected, events });
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let session = match self.session.as_ref() {
            Some(session) if session.is_connected() => session,
            _ => return Err(BusError::NotConnected),
        };

        if let Err(err) = session.client.try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
        {
            // The queue only fills when the broker stops draining it
            self.session = None;
            return Err(BusError::PublishFailed { topic: topic.to_string(), reason: err.to_string() });
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if session.is_connected() {
            if let Err(err) = session.client.try_disconnect() {
                debug!(error = %err, "Disconnect request not queued");
            }
            if timeout(MQTT_DISCONNECT_GRACE, &mut session.events).await.is_err() {
                warn!(endpoint = %self.settings.endpoint(), "Broker connection did not close in time");
            }
        }
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

/// Transport selected by the runtime configuration
pub fn bus_from_config(config: &RuntimeConfig) -> Box<dyn MessageBus> {
    match config.bus {
        BusKind::Mqtt => Box::new(MqttBus::new(BrokerSettings::from_config(config))),
        BusKind::Memory => Box::new(InMemoryBus::new()),
    }
}
