// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker messaging client.
//!
//! [`Messaging`] wraps an MQTT connection and exposes the three logical
//! channels a simulated device speaks: an inbound command queue plus
//! outbound status and telemetry publishes. Connection establishment
//! retries with exponential backoff; publish failures are surfaced to the
//! caller, which logs and carries on (telemetry loss is tolerated).
//!
//! # Examples
//!
//! ```no_run
//! use tasmosim::messaging::Messaging;
//!
//! # async fn example() -> Result<(), tasmosim::error::ProtocolError> {
//! let messaging = Messaging::builder()
//!     .host("broker.local")
//!     .credentials("admin", "secret")
//!     .client_id("plug-001")
//!     .build();
//!
//! messaging.connect().await?;
//! let mut commands = messaging.setup_device_queue("plug-001").await?;
//! while let Some(cmd) = commands.recv().await {
//!     println!("command: {}", cmd.command);
//! }
//! # Ok(())
//! # }
//! ```

pub mod topics;

pub use topics::Channel;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::message::{CommandMessage, StatusResponse, TelemetryData};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Bound on unacknowledged inbound messages per connection.
const PREFETCH: usize = 10;

/// Callback invoked for each message seen by the response listener.
///
/// Arguments: dotted routing key, logical channel name, decoded JSON body.
pub type ResponseCallback = Arc<dyn Fn(&str, &str, Value) + Send + Sync>;

/// Connection retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of connection attempts.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// The sleep schedule between attempts (one entry fewer than attempts).
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts {
            delays.push(delay.min(self.max_delay));
            delay = delay.mul_f64(self.multiplier).min(self.max_delay);
        }
        delays
    }
}

/// Configuration for a [`Messaging`] client.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: Option<String>,
    keep_alive: Duration,
    connect_timeout: Duration,
    retry: RetryPolicy,
    clean_session: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            credentials: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            clean_session: false,
        }
    }
}

/// Builder for a [`Messaging`] client.
#[derive(Debug, Default)]
pub struct MessagingBuilder {
    config: MessagingConfig,
}

impl MessagingBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets a stable client id.
    ///
    /// Device runtimes pass their device id here so the broker keeps their
    /// command queue across reconnects (persistent session).
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = Some(id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the per-attempt connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = duration;
        self
    }

    /// Sets the retry policy (default: 10 attempts, 2 s backoff ×1.5
    /// capped at 10 s).
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Uses a clean (non-persistent) session.
    ///
    /// Fleet tooling sets this; device runtimes keep the default
    /// persistent session so queued commands survive reconnects.
    #[must_use]
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.config.clean_session = clean;
        self
    }

    /// Builds the client. No connection is made until
    /// [`Messaging::connect`] is called.
    #[must_use]
    pub fn build(self) -> Messaging {
        Messaging {
            inner: Arc::new(MessagingInner {
                config: self.config,
                client: RwLock::new(None),
                connected: AtomicBool::new(false),
                command_tx: RwLock::new(None),
                listener: RwLock::new(None),
                event_task: Mutex::new(None),
            }),
        }
    }
}

/// Messaging client for one broker connection.
///
/// Cheaply cloneable; clones share the connection.
#[derive(Clone)]
pub struct Messaging {
    inner: Arc<MessagingInner>,
}

struct MessagingInner {
    config: MessagingConfig,
    client: RwLock<Option<AsyncClient>>,
    connected: AtomicBool,
    /// Sender feeding the device runtime's command consumer.
    command_tx: RwLock<Option<mpsc::Sender<CommandMessage>>>,
    /// Callback invoked for status/telemetry messages.
    listener: RwLock<Option<ResponseCallback>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl Messaging {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MessagingBuilder {
        MessagingBuilder::default()
    }

    /// Whether the client currently holds a broker connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Connects to the broker, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::RetriesExhausted`] once every attempt of
    /// the configured [`RetryPolicy`] has failed.
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        let policy = &self.inner.config.retry;
        let mut delay = policy.initial_delay;

        for attempt in 1..=policy.max_attempts {
            match self.try_connect().await {
                Ok(()) => {
                    tracing::info!(
                        host = %self.inner.config.host,
                        port = self.inner.config.port,
                        attempt,
                        "Connected to broker"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        host = %self.inner.config.host,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Broker connection attempt failed"
                    );
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(delay.min(policy.max_delay)).await;
                delay = delay.mul_f64(policy.multiplier).min(policy.max_delay);
            }
        }

        Err(ProtocolError::RetriesExhausted {
            attempts: policy.max_attempts,
        })
    }

    /// One connection attempt: build a client, spawn the event loop and
    /// wait for the broker's ConnAck within the configured timeout.
    async fn try_connect(&self) -> Result<(), ProtocolError> {
        let config = &self.inner.config;

        let client_id = config.client_id.clone().unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("tasmosim_{}_{}", std::process::id(), counter)
        });

        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(config.clean_session);
        // Backpressure: bound unacknowledged inbound messages.
        #[allow(clippy::cast_possible_truncation)]
        options.set_inflight(PREFETCH as u16);
        if let Some((ref username, ref password)) = config.credentials {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, PREFETCH);

        let (connack_tx, connack_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            handle_events(event_loop, inner, Some(connack_tx)).await;
        });

        match tokio::time::timeout(config.connect_timeout, connack_rx).await {
            Ok(Ok(())) => {
                *self.inner.client.write().await = Some(client);
                if let Some(old) = self.inner.event_task.lock().await.replace(task) {
                    old.abort();
                }
                self.inner.connected.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(_)) => {
                task.abort();
                Err(ProtocolError::ConnectionFailed(
                    "event loop terminated before ConnAck".to_string(),
                ))
            }
            Err(_) => {
                task.abort();
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = config.connect_timeout.as_millis() as u64;
                Err(ProtocolError::Timeout(timeout_ms))
            }
        }
    }

    /// Subscribes to the device's command queue.
    ///
    /// Returns the receiving end of a bounded queue of decoded commands.
    /// Safe to call once per runtime lifetime; calling again replaces the
    /// previous queue.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected or the subscribe fails.
    pub async fn setup_device_queue(
        &self,
        device_id: &str,
    ) -> Result<mpsc::Receiver<CommandMessage>, ProtocolError> {
        let client = self.client().await?;
        let topic = Channel::Command.topic(device_id);
        client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;

        let (tx, rx) = mpsc::channel(PREFETCH);
        *self.inner.command_tx.write().await = Some(tx);

        tracing::info!(device_id, topic, "Command queue ready");
        Ok(rx)
    }

    /// Publishes a status snapshot for a device.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected or the publish cannot be
    /// queued. Callers log and retry on the next tick.
    pub async fn publish_status(
        &self,
        device_id: &str,
        status: &StatusResponse,
    ) -> Result<(), ProtocolError> {
        self.publish_json(Channel::Status, device_id, status).await
    }

    /// Publishes telemetry for a device.
    ///
    /// # Errors
    ///
    /// Same failure contract as [`Self::publish_status`].
    pub async fn publish_telemetry(
        &self,
        device_id: &str,
        telemetry: &TelemetryData,
    ) -> Result<(), ProtocolError> {
        self.publish_json(Channel::Telemetry, device_id, telemetry)
            .await
    }

    /// Sends a command to a device's queue.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected or the publish cannot be
    /// queued.
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &str,
        payload: Value,
    ) -> Result<(), ProtocolError> {
        let message = CommandMessage::new(device_id, command, payload);
        self.publish_json(Channel::Command, device_id, &message)
            .await?;
        tracing::info!(device_id, command, "Sent command");
        Ok(())
    }

    async fn publish_json<T: serde::Serialize>(
        &self,
        channel: Channel,
        device_id: &str,
        body: &T,
    ) -> Result<(), ProtocolError> {
        let client = self.client().await?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| ProtocolError::ConnectionFailed(format!("serialize: {e}")))?;
        client
            .publish(channel.topic(device_id), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(device_id, channel = channel.as_str(), "Published message");
        Ok(())
    }

    /// Subscribes to all status and telemetry traffic and installs a
    /// callback invoked per message with `(routing_key, channel, body)`.
    ///
    /// Used by fleet tooling awaiting device replies; a device runtime
    /// never needs this.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected or a subscribe fails.
    pub async fn setup_response_listener(
        &self,
        callback: impl Fn(&str, &str, Value) + Send + Sync + 'static,
    ) -> Result<(), ProtocolError> {
        let client = self.client().await?;
        for channel in [Channel::Status, Channel::Telemetry] {
            client
                .subscribe(channel.wildcard(), QoS::AtLeastOnce)
                .await
                .map_err(ProtocolError::Mqtt)?;
        }
        *self.inner.listener.write().await = Some(Arc::new(callback));
        Ok(())
    }

    /// Waits for the next status or telemetry message from one device.
    ///
    /// Convenience wrapper over [`Self::setup_response_listener`] with a
    /// bounded wait; replaces any previously installed listener.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Timeout`] when no reply arrives in time.
    pub async fn await_device_reply(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Result<DeviceReply, ProtocolError> {
        let (tx, mut rx) = mpsc::channel::<DeviceReply>(8);
        let wanted = format!(".{device_id}");
        self.setup_response_listener(move |routing_key, channel, body| {
            if routing_key.ends_with(&wanted) {
                let _ = tx.try_send(DeviceReply {
                    routing_key: routing_key.to_string(),
                    channel: channel.to_string(),
                    body,
                });
            }
        })
        .await?;

        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;
        tokio::time::timeout(timeout, rx.recv())
            .await
            .map_err(|_| ProtocolError::Timeout(timeout_ms))?
            .ok_or_else(|| ProtocolError::ChannelClosed("reply channel".to_string()))
    }

    /// Closes the connection.
    ///
    /// Safe to call multiple times and from any state.
    pub async fn close(&self) {
        self.inner.connected.store(false, Ordering::Release);
        *self.inner.command_tx.write().await = None;
        *self.inner.listener.write().await = None;

        if let Some(client) = self.inner.client.write().await.take()
            && let Err(e) = client.disconnect().await
        {
            tracing::warn!(error = %e, "Error disconnecting from broker");
        }
        if let Some(task) = self.inner.event_task.lock().await.take() {
            task.abort();
        }
        tracing::debug!("Messaging client closed");
    }

    async fn client(&self) -> Result<AsyncClient, ProtocolError> {
        self.inner
            .client
            .read()
            .await
            .clone()
            .ok_or(ProtocolError::NotConnected)
    }
}

impl std::fmt::Debug for Messaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messaging")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Drives the MQTT event loop and routes inbound publishes.
async fn handle_events(
    mut event_loop: EventLoop,
    inner: Arc<MessagingInner>,
    mut connack_tx: Option<oneshot::Sender<()>>,
) {
    use rumqttc::{Event, Packet};

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "Broker connection acknowledged");
                inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "Subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                route_publish(&inner, &publish.topic, &publish.payload).await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker closed the connection");
                inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                // The connect retry loop owns reconnection; a dead event
                // loop just marks the client disconnected.
                tracing::error!(error = %e, "Broker event loop error");
                inner.connected.store(false, Ordering::Release);
                break;
            }
        }
    }
}

/// Dispatches one inbound publish to the command queue or the listener.
///
/// Malformed payloads are logged and dropped; the loop never dies on bad
/// input.
async fn route_publish(inner: &MessagingInner, topic: &str, payload: &[u8]) {
    let (channel, device_id) = match topics::parse(topic) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(topic, error = %e, "Ignoring message on foreign topic");
            return;
        }
    };

    match channel {
        Channel::Command => {
            let command: CommandMessage = match serde_json::from_slice(payload) {
                Ok(cmd) => cmd,
                Err(e) => {
                    tracing::warn!(topic, error = %e, "Dropping malformed command");
                    return;
                }
            };
            let Some(tx) = inner.command_tx.read().await.clone() else {
                tracing::debug!(topic, "No command queue registered, dropping");
                return;
            };
            if tx.send(command).await.is_err() {
                tracing::debug!(topic, "Command consumer gone, dropping");
            }
        }
        Channel::Status | Channel::Telemetry => {
            let Some(listener) = inner.listener.read().await.clone() else {
                return;
            };
            match serde_json::from_slice::<Value>(payload) {
                Ok(body) => {
                    listener(&channel.routing_key(device_id), channel.as_str(), body);
                }
                Err(e) => {
                    tracing::warn!(topic, error = %e, "Dropping undecodable message");
                }
            }
        }
    }
}

/// A status or telemetry message captured by
/// [`Messaging::await_device_reply`].
#[derive(Debug, Clone)]
pub struct DeviceReply {
    /// Dotted routing key, e.g. `device.status.plug-001`.
    pub routing_key: String,
    /// Logical channel name (`status` or `telemetry`).
    pub channel: String,
    /// Decoded message body.
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy_matches_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!((policy.multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn backoff_schedule_grows_and_caps() {
        let delays = RetryPolicy::default().delays();
        assert_eq!(delays.len(), 9);
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(3));
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(10));
        // Worst case stays bounded (~100 s including the attempts).
        let total: Duration = delays.iter().sum();
        assert!(total <= Duration::from_secs(100));
    }

    #[test]
    fn builder_defaults() {
        let messaging = Messaging::builder().build();
        assert_eq!(messaging.inner.config.host, "localhost");
        assert_eq!(messaging.inner.config.port, 1883);
        assert!(!messaging.inner.config.clean_session);
        assert!(!messaging.is_connected());
    }

    #[tokio::test]
    async fn publish_without_connect_fails() {
        let messaging = Messaging::builder().build();
        let err = messaging
            .send_command("plug-001", "status", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
    }

    #[tokio::test]
    async fn close_is_idempotent_from_any_state() {
        let messaging = Messaging::builder().build();
        messaging.close().await;
        messaging.close().await;
        assert!(!messaging.is_connected());
    }
}
