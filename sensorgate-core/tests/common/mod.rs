//! Shared fixtures for integration tests
//!
//! - publishers that record or refuse every message
//! - a sink that always fails
//! - a pipeline constructor pinned to a fixed clock

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use sensorgate_core::{
    AuditError, AuditRecord, AuditSink, FixedClock, Pipeline, PipelineConfig, PublishError,
    Publisher, QoS,
};

/// One outbound message seen by [`RecordingPublisher`]
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub body: Value,
    pub qos: QoS,
}

/// Publisher that keeps every message it is given
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        let body = serde_json::from_slice(payload).expect("pipeline publishes JSON");
        self.messages.lock().unwrap().push(Published {
            topic: topic.to_string(),
            body,
            qos,
        });
        Ok(())
    }
}

/// Publisher whose transport is always down
pub struct FailingPublisher;

impl Publisher for FailingPublisher {
    fn publish(&self, _topic: &str, _payload: &[u8], _qos: QoS) -> Result<(), PublishError> {
        Err(PublishError::NotConnected)
    }
}

/// Sink that rejects every record
pub struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Instant every fixture clock starts at
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Pipeline over `config` publishing into a fresh [`RecordingPublisher`]
pub fn recording_pipeline(config: PipelineConfig) -> (Pipeline, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let pipeline = Pipeline::builder(config)
        .publisher(publisher.clone())
        .clock(Arc::new(FixedClock::new(epoch())))
        .build()
        .expect("valid pipeline");
    (pipeline, publisher)
}
