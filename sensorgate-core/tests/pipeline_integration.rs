//! End-to-end tests for the message pipeline
//!
//! Drives `Pipeline::handle` with realistic sensor traffic and checks what
//! was published, what was audited, and what the counters say.

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use sensorgate_core::{
    AuditRecord, AuditStatus, AuditStore, JsonLinesSink, Pipeline, PipelineConfig, QoS,
    ThresholdRegistry,
};

use common::{recording_pipeline, BrokenSink, FailingPublisher};

const STAMP: &str = "2024-03-01T12:00:00.000000Z";

#[test]
fn temperature_above_threshold_is_forwarded() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    let record = pipeline.handle("sensors/temp/1", b"25.5", 0);

    assert_eq!(record.status, AuditStatus::Processed);
    assert_eq!(record.in_topic, "sensors/temp/1");
    assert_eq!(record.out_topic.as_deref(), Some("processed/temp/1"));
    assert_eq!(record.qos, 0);
    assert!(record.latency_ms >= 0.0);

    let messages = publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "processed/temp/1");
    assert_eq!(messages[0].qos, QoS::AtMostOnce);
    assert_eq!(messages[0].body, json!({"value": 25.5, "processed_at": STAMP}));
}

#[test]
fn temperature_below_threshold_is_filtered() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    let record = pipeline.handle("sensors/temp/1", b"10.0", 0);

    assert_eq!(record.status, AuditStatus::Filtered);
    assert_eq!(record.out_topic, None);
    assert_eq!(publisher.len(), 0);

    let recent = pipeline.store().recent(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, AuditStatus::Filtered);
    assert!(recent[0].payload_summary.contains("10"));
}

#[test]
fn threshold_equal_to_value_is_forwarded() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    pipeline.handle("sensors/temp/1", b"20", 0);
    pipeline.handle("sensors/hum/1", b"40.0", 0);
    pipeline.handle("sensors/hum/1", b"39.99", 0);

    let topics: Vec<String> = publisher.messages().into_iter().map(|m| m.topic).collect();
    assert_eq!(topics, vec!["processed/temp/1", "processed/hum/1"]);
}

#[test]
fn unparseable_payload_is_forwarded_raw() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    let record = pipeline.handle("sensors/hum/2", b"not-a-number", 1);

    assert_eq!(record.status, AuditStatus::Processed);
    assert_eq!(record.out_topic.as_deref(), Some("processed/hum/2"));
    assert_eq!(record.qos, 1);

    let messages = publisher.messages();
    assert_eq!(messages[0].body, json!({"raw": "not-a-number", "processed_at": STAMP}));
}

#[test]
fn infinite_reading_is_forwarded_readably() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    let record = pipeline.handle("sensors/temp/1", b"inf", 0);
    assert_eq!(record.status, AuditStatus::Processed);
    assert!(record.payload_summary.contains("\"inf\""));

    pipeline.handle("sensors/temp/2", b"1e400", 0);

    let messages = publisher.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].body, json!({"value": "inf", "processed_at": STAMP}));
    assert_eq!(messages[1].body, json!({"value": "inf", "processed_at": STAMP}));
}

#[test]
fn nan_and_negative_infinity_are_filtered_with_their_text() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    let nan = pipeline.handle("sensors/temp/1", b"NaN", 0);
    let low = pipeline.handle("sensors/temp/1", b"-inf", 0);

    assert_eq!(nan.status, AuditStatus::Filtered);
    assert_eq!(low.status, AuditStatus::Filtered);
    assert!(nan.payload_summary.contains("\"NaN\""));
    assert!(low.payload_summary.contains("\"-inf\""));
    assert_eq!(publisher.len(), 0);
}

#[test]
fn structured_payload_keeps_its_fields() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    pipeline.handle("sensors/hum/3", br#"{"value": 12, "unit": "%"}"#, 0);

    let messages = publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].body,
        json!({"value": 12, "unit": "%", "processed_at": STAMP})
    );
}

#[test]
fn threshold_update_applies_to_next_message() {
    let (pipeline, publisher) = recording_pipeline(PipelineConfig::default());

    assert_eq!(pipeline.handle("sensors/temp/9", b"6.0", 0).status, AuditStatus::Filtered);

    pipeline.registry().set("temp", 5.0).unwrap();

    let record = pipeline.handle("sensors/temp/9", b"6.0", 0);
    assert_eq!(record.status, AuditStatus::Processed);
    assert_eq!(record.out_topic.as_deref(), Some("processed/temp/9"));
    assert_eq!(publisher.len(), 1);
}

#[test]
fn outbound_qos_is_configurable() {
    let (pipeline, publisher) =
        recording_pipeline(PipelineConfig::default().outbound_qos(QoS::AtLeastOnce));

    let record = pipeline.handle("sensors/temp/1", b"30", 2);

    assert_eq!(record.qos, 2);
    assert_eq!(publisher.messages()[0].qos, QoS::AtLeastOnce);
}

#[test]
fn custom_roots_route_and_subscribe() {
    let (pipeline, publisher) = recording_pipeline(
        PipelineConfig::default()
            .sensor_root("plant")
            .processed_root("clean"),
    );

    assert_eq!(pipeline.subscription(), "plant/#");

    pipeline.handle("plant/temp/boiler", b"90", 0);
    assert_eq!(publisher.messages()[0].topic, "clean/temp/boiler");
}

#[test]
fn publish_failure_is_still_audited_as_processed() {
    let pipeline = Pipeline::builder(PipelineConfig::default())
        .publisher(Arc::new(FailingPublisher))
        .build()
        .unwrap();

    let record = pipeline.handle("sensors/temp/1", b"30", 0);

    assert_eq!(record.status, AuditStatus::Processed);
    assert_eq!(record.out_topic.as_deref(), Some("processed/temp/1"));
    assert_eq!(pipeline.store().len(), 1);

    let stats = pipeline.stats();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.publish_failures, 1);
}

#[test]
fn failing_sink_does_not_stop_the_pipeline() {
    let publisher = Arc::new(common::RecordingPublisher::default());
    let pipeline = Pipeline::builder(PipelineConfig::default())
        .publisher(publisher.clone())
        .sink(Arc::new(BrokenSink))
        .build()
        .unwrap();

    pipeline.handle("sensors/temp/1", b"30", 0);
    pipeline.handle("sensors/temp/1", b"1", 0);

    assert_eq!(pipeline.store().len(), 2);
    assert_eq!(publisher.len(), 1);
    assert_eq!(pipeline.stats().sink_failures, 2);
}

#[test]
fn store_keeps_most_recent_records() {
    let (pipeline, _) = recording_pipeline(PipelineConfig::default().audit_capacity(5));

    for n in 0..6 {
        pipeline.handle(&format!("sensors/temp/{}", n), b"30", 0);
    }

    let recent = pipeline.store().recent(100);
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].in_topic, "sensors/temp/5");
    assert_eq!(recent[4].in_topic, "sensors/temp/1");
    assert!(recent.iter().all(|r| r.in_topic != "sensors/temp/0"));
}

#[test]
fn shared_registry_and_store_are_visible_outside() {
    let registry = Arc::new(ThresholdRegistry::default());
    let store = Arc::new(AuditStore::new(50));
    let publisher = Arc::new(common::RecordingPublisher::default());

    let pipeline = Pipeline::builder(PipelineConfig::default())
        .publisher(publisher)
        .registry(registry.clone())
        .store(store.clone())
        .build()
        .unwrap();

    registry.set("hum", 10.0).unwrap();
    pipeline.handle("sensors/hum/1", b"15", 0);

    let recent = store.recent(1);
    assert_eq!(recent[0].status, AuditStatus::Processed);
    assert_eq!(registry.entry("hum").map(|e| e.threshold), Some(10.0));
}

#[test]
fn json_lines_sink_persists_every_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let pipeline = Pipeline::builder(PipelineConfig::default())
        .publisher(Arc::new(common::RecordingPublisher::default()))
        .sink(Arc::new(JsonLinesSink::open(&path).unwrap()))
        .build()
        .unwrap();

    pipeline.handle("sensors/temp/1", b"25.5", 0);
    pipeline.handle("sensors/temp/1", b"10.0", 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    let records: Vec<AuditRecord> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, AuditStatus::Processed);
    assert_eq!(records[0].out_topic.as_deref(), Some("processed/temp/1"));
    assert_eq!(records[1].status, AuditStatus::Filtered);
    assert_eq!(records[1].qos, 1);
}

#[test]
fn pipeline_from_json_config() {
    let config = PipelineConfig::from_json(
        r#"{
            "default_threshold": 0.0,
            "class_defaults": [{"class": "co2", "threshold": 400.0}],
            "outbound_qos": 1
        }"#,
    )
    .unwrap();
    let (pipeline, publisher) = recording_pipeline(config);

    assert_eq!(pipeline.handle("sensors/co2/1", b"399", 0).status, AuditStatus::Filtered);
    assert_eq!(pipeline.handle("sensors/co2/1", b"401", 0).status, AuditStatus::Processed);
    // no "temp" entry in this table, so the default applies
    assert_eq!(pipeline.handle("sensors/temp/1", b"1", 0).status, AuditStatus::Processed);
    assert_eq!(publisher.len(), 2);
}
