//! Transport seam
//!
//! The pipeline never talks to a broker directly. It is handed inbound
//! messages by whoever owns the connection and pushes outbound messages
//! through a [`Publisher`]. Connect, subscribe, reconnect and QoS handshakes
//! all stay on the transport side (see the `sensorgate-connectors` crate).

use serde::{Deserialize, Serialize};

use crate::errors::PublishError;

/// Delivery guarantee requested for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery, duplicates possible
    AtLeastOnce = 1,
    /// Exactly once
    ExactlyOnce = 2,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("invalid QoS level {}", other)),
        }
    }
}

/// Outbound publish capability
///
/// Fire-and-forget: `Ok` means the transport accepted the message, not that
/// anyone received it. Implementations must not block on acknowledgements.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError>;
}
