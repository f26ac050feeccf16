//! In-process message bus
//!
//! A broker stand-in for tests, demos and embedding the pipeline inside a
//! larger process. Everything published is kept in order; nothing is
//! delivered anywhere unless the caller reads it back.
//!
//! ```rust
//! use std::sync::Arc;
//! use sensorgate_connectors::MemoryBus;
//! use sensorgate_core::{Pipeline, PipelineConfig};
//!
//! let bus = Arc::new(MemoryBus::new());
//! let pipeline = Pipeline::builder(PipelineConfig::default())
//!     .publisher(bus.clone())
//!     .build()
//!     .unwrap();
//!
//! bus.deliver(&pipeline, "sensors/temp/1", b"25.5", 0);
//! assert_eq!(bus.published()[0].topic, "processed/temp/1");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sensorgate_core::{AuditRecord, Pipeline, PublishError, Publisher, QoS};

use crate::{ConnectionStats, Connector, ConnectorError};

/// A message published onto the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl BusMessage {
    /// Payload parsed as JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// In-process transport
pub struct MemoryBus {
    messages: Mutex<Vec<BusMessage>>,
    connected: AtomicBool,
    stats: Mutex<ConnectionStats>,
}

impl MemoryBus {
    /// A connected, empty bus
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    /// Simulate the link going down or coming back
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if connected && !was {
            self.stats_lock().reconnections += 1;
        }
    }

    /// Hand one inbound message to `pipeline`
    pub fn deliver(&self, pipeline: &Pipeline, topic: &str, payload: &[u8], qos: u8) -> AuditRecord {
        pipeline.handle(topic, payload, qos)
    }

    /// Copy of every message published so far, oldest first
    pub fn published(&self) -> Vec<BusMessage> {
        self.lock().clone()
    }

    /// Messages whose topic matches an MQTT filter such as `processed/temp/+`
    pub fn published_matching(&self, filter: &str) -> Vec<BusMessage> {
        self.lock()
            .iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect()
    }

    /// Remove and return everything published so far
    pub fn drain(&self) -> Vec<BusMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BusMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_lock(&self) -> MutexGuard<'_, ConnectionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MemoryBus {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        if !self.is_connected() {
            self.stats_lock().record_failure(ConnectorError::NotConnected);
            return Err(ConnectorError::NotConnected.into());
        }

        self.lock().push(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        self.stats_lock().record_sent(payload.len());
        Ok(())
    }
}

impl Connector for MemoryBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn stats(&self) -> ConnectionStats {
        self.stats_lock().clone()
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');

    for pattern in filter.split('/') {
        match pattern {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            exact => {
                if levels.next() != Some(exact) {
                    return false;
                }
            }
        }
    }

    levels.next().is_none()
}
