//! Threshold Filtering Example
//!
//! Runs a handful of sensor messages through a pipeline, changes a threshold
//! while it is live, and prints the audit trail the way a dashboard would.
//!
//! ## What You'll Learn
//!
//! - Building a pipeline around your own publisher
//! - How numeric, structured and raw payloads are treated
//! - Updating thresholds through the shared registry
//! - Reading recent audit records
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_threshold_filtering
//! ```

use std::sync::Arc;

use sensorgate_core::{Pipeline, PipelineConfig, PublishError, Publisher, QoS};

/// Publisher that prints instead of talking to a broker
struct Console;

impl Publisher for Console {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        println!("  -> {} (qos {}) {}", topic, u8::from(qos), String::from_utf8_lossy(payload));
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::builder(PipelineConfig::default())
        .publisher(Arc::new(Console))
        .build()?;

    println!("Subscribed to {}", pipeline.subscription());

    let traffic: &[(&str, &[u8])] = &[
        ("sensors/temp/kitchen", b"25.5"),
        ("sensors/temp/kitchen", b"10.0"),
        ("sensors/hum/bathroom", b"62"),
        ("sensors/hum/cellar", b"not-a-number"),
        ("sensors/door/front", br#"{"open": true}"#),
    ];

    for (topic, payload) in traffic {
        println!("{} {}", topic, String::from_utf8_lossy(payload));
        pipeline.handle(topic, payload, 0);
    }

    println!("\nLowering the temp threshold to 5.0");
    pipeline.registry().set("temp", 5.0)?;
    pipeline.handle("sensors/temp/kitchen", b"6.0", 0);

    println!("\nThresholds:");
    for entry in pipeline.registry().snapshot() {
        println!("  {:<6} {:>6.1}  (updated {})", entry.sensor_class, entry.threshold, entry.updated_at);
    }

    println!("\nRecent audit records:");
    for record in pipeline.store().recent(10) {
        println!(
            "  {:<9} {:<22} -> {:<24} {:.3} ms  {}",
            record.status.as_str(),
            record.in_topic,
            record.out_topic.as_deref().unwrap_or("-"),
            record.latency_ms,
            record.payload_summary
        );
    }

    println!("\n{:?}", pipeline.stats());
    Ok(())
}
