//! MQTT Connector for SensorGate
//!
//! ## Overview
//!
//! Binds a [`Pipeline`] to an MQTT broker through `rumqttc`. The bridge owns
//! the event loop; the pipeline only ever sees `handle` calls and a
//! [`Publisher`] that queues onto the client's request channel.
//!
//! ```text
//!             ┌──────────── MqttBridge::run ─────────────┐
//!  broker ──► │ EventLoop::poll                          │
//!             │   ConnAck  ─► try_subscribe(sensors/#)    │
//!             │   Publish  ─► Pipeline::handle ─┐         │
//!             │   Err      ─► backoff, retry    │         │
//!             └─────────────────────────────────┼─────────┘
//!                                               ▼
//!                       MqttPublisher::publish (try_publish) ──► broker
//! ```
//!
//! ## Design Decisions
//!
//! ### Subscribe on every ConnAck
//!
//! With a clean session the broker forgets subscriptions on disconnect, and
//! `rumqttc` reconnects silently on the next poll. Re-subscribing on each
//! `ConnAck` keeps the filter in place across broker restarts.
//!
//! ### Never await inside the loop
//!
//! The request channel is drained by the same `poll` that delivers messages.
//! Awaiting `subscribe` or `publish` there could wait on a channel only this
//! loop empties, so the bridge and the publisher only use the `try_` calls.
//!
//! ### Backoff
//!
//! `retry_delay = min(base * 2^attempt, max)`, reset on the next `ConnAck`.
//! With `max_reconnect_attempts` set, `run` gives up and returns the last
//! connection error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use sensorgate_core::{ConfigError, Pipeline, PipelineBuilder, PublishError, Publisher, QoS};
use thiserror::Error;
use tokio::sync::{watch, Notify};

use crate::{ConnectionStats, Connector, ConnectorError};

/// Default broker port
pub const DEFAULT_PORT: u16 = 1883;

/// How long `run` keeps polling after shutdown to flush the DISCONNECT
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// MQTT-specific errors
#[derive(Debug, Error)]
pub enum MqttError {
    /// Invalid connector configuration
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Pipeline could not be built
    #[error("Pipeline configuration error: {0}")]
    Pipeline(#[from] ConfigError),

    /// Request could not be queued
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Broker connection failed
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

/// MQTT configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Optional username and password
    pub credentials: Option<(String, String)>,
    /// Start with a clean session
    pub clean_session: bool,
    /// Subscription filter; `None` uses the pipeline's sensor namespace
    pub subscription: Option<String>,
    /// QoS requested for the subscription
    pub subscribe_qos: QoS,
    /// Retain flag on republished messages
    pub retain: bool,
    /// Capacity of the client request channel
    pub channel_capacity: usize,
    /// First retry delay after a poll error
    pub reconnect_base: Duration,
    /// Upper bound on the retry delay
    pub reconnect_max: Duration,
    /// Consecutive poll errors tolerated before `run` returns; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl MqttConfig {
    /// Create new configuration for a broker host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            client_id: format!("sensorgate-{}", std::process::id()),
            keep_alive: Duration::from_secs(60),
            credentials: None,
            clean_session: true,
            subscription: None,
            subscribe_qos: QoS::AtMostOnce,
            retain: false,
            channel_capacity: 100,
            reconnect_base: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(30),
            max_reconnect_attempts: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set keep-alive in seconds
    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive = Duration::from_secs(secs);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Override the subscription filter
    pub fn subscription(mut self, filter: impl Into<String>) -> Self {
        self.subscription = Some(filter.into());
        self
    }

    pub fn subscribe_qos(mut self, qos: QoS) -> Self {
        self.subscribe_qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set retry delays
    pub fn reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_max = max;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Check values `rumqttc` would otherwise panic on
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::ConfigError("host must not be empty".into()));
        }
        if self.client_id.is_empty() || self.client_id.starts_with(char::is_whitespace) {
            return Err(ConnectorError::ConfigError(
                "client id must be non-empty and not start with whitespace".into(),
            ));
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(ConnectorError::ConfigError(
                "keep-alive must be zero or at least one second".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConnectorError::ConfigError("channel capacity must be > 0".into()));
        }
        if self.reconnect_base.is_zero() || self.reconnect_base > self.reconnect_max {
            return Err(ConnectorError::ConfigError(
                "reconnect base must be non-zero and not exceed the max delay".into(),
            ));
        }
        if matches!(&self.subscription, Some(filter) if filter.is_empty()) {
            return Err(ConnectorError::ConfigError("subscription must not be empty".into()));
        }
        Ok(())
    }

    /// Delay before retrying after `attempt` consecutive failures
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.reconnect_base
            .checked_mul(factor)
            .unwrap_or(self.reconnect_max)
            .min(self.reconnect_max)
    }

    fn to_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(self.clean_session);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username.clone(), password.clone());
        }
        options
    }
}

/// Map the pipeline's QoS onto the client's
pub fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Numeric level of an inbound QoS, as recorded in the audit trail
pub fn qos_level(qos: rumqttc::QoS) -> u8 {
    match qos {
        rumqttc::QoS::AtMostOnce => 0,
        rumqttc::QoS::AtLeastOnce => 1,
        rumqttc::QoS::ExactlyOnce => 2,
    }
}

/// [`Publisher`] over a `rumqttc` client
///
/// Queues with `try_publish`; a full request channel is reported as a
/// transport error rather than waited on.
pub struct MqttPublisher {
    client: AsyncClient,
    retain: bool,
    connected: AtomicBool,
    stats: Mutex<ConnectionStats>,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, retain: bool) -> Self {
        Self {
            client,
            retain,
            connected: AtomicBool::new(false),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn stats_lock(&self) -> MutexGuard<'_, ConnectionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        match self
            .client
            .try_publish(topic, to_mqtt_qos(qos), self.retain, payload.to_vec())
        {
            Ok(()) => {
                self.stats_lock().record_sent(payload.len());
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.stats_lock().record_failure(&message);
                Err(ConnectorError::ProtocolError(message).into())
            }
        }
    }
}

impl Connector for MqttPublisher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn stats(&self) -> ConnectionStats {
        self.stats_lock().clone()
    }
}

/// Control handle for a running [`MqttBridge`]
#[derive(Clone)]
pub struct BridgeHandle {
    pipeline: Arc<Pipeline>,
    publisher: Arc<MqttPublisher>,
    shutdown: Arc<Notify>,
    connected: watch::Receiver<bool>,
}

impl BridgeHandle {
    /// Pipeline driven by the bridge, for thresholds and audit reads
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.publisher.stats()
    }

    /// Wait until the broker has acknowledged a connection
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), ConnectorError> {
        let mut connected = self.connected.clone();
        let outcome = tokio::time::timeout(timeout, connected.wait_for(|up| *up))
            .await
            .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectorError::NotConnected),
            Err(_) => Err(ConnectorError::Timeout),
        }
    }

    /// Ask `run` to disconnect and return
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Event loop binding a broker to a [`Pipeline`]
pub struct MqttBridge {
    config: MqttConfig,
    subscription: String,
    pipeline: Arc<Pipeline>,
    client: AsyncClient,
    eventloop: EventLoop,
    publisher: Arc<MqttPublisher>,
    shutdown: Arc<Notify>,
    connected: watch::Sender<bool>,
}

impl MqttBridge {
    /// Create the client and finish building the pipeline around its publisher
    pub fn new(config: MqttConfig, builder: PipelineBuilder) -> Result<Self, MqttError> {
        config.validate()?;

        let (client, eventloop) = AsyncClient::new(config.to_options(), config.channel_capacity);
        let publisher = Arc::new(MqttPublisher::new(client.clone(), config.retain));
        let pipeline = Arc::new(builder.publisher(publisher.clone()).build()?);

        let subscription = config
            .subscription
            .clone()
            .unwrap_or_else(|| pipeline.subscription());
        let (connected, _) = watch::channel(false);

        Ok(Self {
            config,
            subscription,
            pipeline,
            client,
            eventloop,
            publisher,
            shutdown: Arc::new(Notify::new()),
            connected,
        })
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            pipeline: self.pipeline.clone(),
            publisher: self.publisher.clone(),
            shutdown: self.shutdown.clone(),
            connected: self.connected.subscribe(),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Filter subscribed to on every connection
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Poll the broker until shutdown, or until reconnect attempts run out
    pub async fn run(mut self) -> Result<(), MqttError> {
        log::info!(
            "MQTT bridge starting: broker={}:{} client_id={} subscription={}",
            self.config.host,
            self.config.port,
            self.config.client_id,
            self.subscription
        );

        let mut failures: u32 = 0;
        let mut connected_once = false;

        loop {
            let event = tokio::select! {
                _ = self.shutdown.notified() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if connected_once {
                        self.publisher.stats_lock().reconnections += 1;
                    }
                    connected_once = true;
                    failures = 0;
                    self.set_connected(true);

                    match self.subscribe() {
                        Ok(()) => log::info!("Connected, subscribed to {}", self.subscription),
                        Err(e) => log::error!("Subscribe to {} failed: {}", self.subscription, e),
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pipeline
                        .handle(&publish.topic, &publish.payload, qos_level(publish.qos));
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_connected(false);
                    self.publisher.stats_lock().last_error = Some(e.to_string());

                    if let Some(max) = self.config.max_reconnect_attempts {
                        if failures >= max {
                            log::error!(
                                "Giving up on {}:{} after {} retries: {}",
                                self.config.host,
                                self.config.port,
                                failures,
                                e
                            );
                            return Err(e.into());
                        }
                    }

                    let delay = self.config.backoff(failures);
                    failures = failures.saturating_add(1);
                    log::warn!(
                        "Connection error ({}), retrying in {} ms (attempt {})",
                        e,
                        delay.as_millis(),
                        failures
                    );

                    tokio::select! {
                        _ = self.shutdown.notified() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.disconnect().await;
        log::info!("MQTT bridge stopped: {:?}", self.pipeline.stats());
        Ok(())
    }

    fn subscribe(&self) -> Result<(), MqttError> {
        self.client
            .try_subscribe(self.subscription.clone(), to_mqtt_qos(self.config.subscribe_qos))?;
        Ok(())
    }

    fn set_connected(&self, connected: bool) {
        self.publisher.set_connected(connected);
        self.connected.send_replace(connected);
    }

    /// Send DISCONNECT if a session is up, polling until it is written
    async fn disconnect(&mut self) {
        if !*self.connected.borrow() {
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            log::warn!("Disconnect request failed: {}", e);
            self.set_connected(false);
            return;
        }

        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            log::warn!("Broker did not accept DISCONNECT within {:?}", DISCONNECT_GRACE);
        }
        self.set_connected(false);
    }
}
