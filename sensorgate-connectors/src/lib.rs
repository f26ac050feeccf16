//! Broker Connectors for the SensorGate Pipeline
//!
//! ## Overview
//!
//! `sensorgate-core` never opens a socket. It consumes `(topic, payload, qos)`
//! triples and emits outbound messages through its `Publisher` trait. This
//! crate supplies the two sides of that contract for real deployments and for
//! tests:
//!
//! ```text
//!   broker ──► MqttBridge ──► Pipeline::handle ──► MqttPublisher ──► broker
//!
//!   test   ──► MemoryBus::deliver ──► Pipeline::handle ──► MemoryBus (recorded)
//! ```
//!
//! ### MQTT
//!
//! **When to use:**
//! - Sensors already publish to a broker under a `sensors/...` hierarchy
//! - Multiple consumers read the processed namespace
//!
//! **Behaviour:**
//! - Subscription is (re)issued on every `ConnAck`, so a broker restart or a
//!   clean session never leaves the bridge deaf
//! - Outbound publishes are queued with `try_publish` and never block the
//!   handler; a full request channel is a counted failure
//! - Poll errors back off exponentially up to a cap, then the event loop
//!   reconnects on the next poll
//!
//! ### In-process bus
//!
//! [`memory::MemoryBus`] records everything published to it and can push
//! messages into a pipeline. No broker, no runtime.
//!
//! ## Retry Logic
//!
//! ```text
//! retry_delay = min(base * 2^attempt, max_delay)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sensorgate_connectors::mqtt::{MqttBridge, MqttConfig};
//! use sensorgate_core::{Pipeline, PipelineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MqttConfig::new("broker.local")
//!     .port(1883)
//!     .client_id("sensorgate-edge-01");
//!
//! let bridge = MqttBridge::new(config, Pipeline::builder(PipelineConfig::default()))?;
//! let handle = bridge.handle();
//!
//! tokio::spawn(bridge.run());
//! handle.wait_connected(std::time::Duration::from_secs(5)).await?;
//! // ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-export common types
pub use memory::{BusMessage, MemoryBus};

#[cfg(feature = "mqtt")]
pub use mqtt::{BridgeHandle, MqttBridge, MqttConfig, MqttError, MqttPublisher};

use sensorgate_core::PublishError;
use serde::Serialize;
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<ConnectorError> for PublishError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::NotConnected => PublishError::NotConnected,
            ConnectorError::ProtocolError(msg) => PublishError::Transport(msg),
            other => PublishError::Rejected(other.to_string()),
        }
    }
}

/// Common surface of every connector
pub trait Connector {
    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all connectors
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Number of reconnections
    pub reconnections: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_failure(&mut self, error: impl ToString) {
        self.messages_failed += 1;
        self.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_error_maps_to_publish_error() {
        assert!(matches!(
            PublishError::from(ConnectorError::NotConnected),
            PublishError::NotConnected
        ));
        assert!(matches!(
            PublishError::from(ConnectorError::ProtocolError("queue full".into())),
            PublishError::Transport(msg) if msg == "queue full"
        ));
        assert!(matches!(
            PublishError::from(ConnectorError::Timeout),
            PublishError::Rejected(_)
        ));
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = ConnectionStats::default();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_failure("boom");

        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.messages_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
    }
}
