//! Core message pipeline for SensorGate
//!
//! Sits between sensor publishers and consumers on a pub/sub bus: decodes raw
//! readings, drops numeric readings below their sensor class threshold,
//! republishes the rest under the processed namespace with a processing
//! timestamp, and keeps a bounded audit trail of every decision.
//!
//! Key properties:
//! - One inbound message, one audit record, at most one publish
//! - Thresholds update live while messages flow
//! - A malformed message never stops the handler
//!
//! ```rust
//! use std::sync::Arc;
//! use sensorgate_core::{AuditStatus, Pipeline, PipelineConfig, Publisher, PublishError, QoS};
//!
//! struct Stdout;
//!
//! impl Publisher for Stdout {
//!     fn publish(&self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), PublishError> {
//!         println!("{} {}", topic, String::from_utf8_lossy(payload));
//!         Ok(())
//!     }
//! }
//!
//! let pipeline = Pipeline::builder(PipelineConfig::default())
//!     .publisher(Arc::new(Stdout))
//!     .build()
//!     .unwrap();
//!
//! let record = pipeline.handle("sensors/temp/1", b"25.5", 0);
//! assert_eq!(record.status, AuditStatus::Processed);
//! assert_eq!(record.out_topic.as_deref(), Some("processed/temp/1"));
//!
//! let record = pipeline.handle("sensors/temp/1", b"10.0", 0);
//! assert_eq!(record.status, AuditStatus::Filtered);
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod codec;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod time;
pub mod transport;

// Public API
pub use audit::{AuditRecord, AuditSink, AuditStatus, AuditStore, JsonLinesSink};
pub use codec::{decode, Reading};
pub use config::PipelineConfig;
pub use enrich::enrich;
pub use errors::{AuditError, ConfigError, PipelineError, PublishError, ThresholdError};
pub use filter::should_forward;
pub use pipeline::{Pipeline, PipelineBuilder, StatsSnapshot};
pub use registry::{ClassDefault, ThresholdEntry, ThresholdRegistry};
pub use router::{route, TopicRouter};
pub use time::{Clock, FixedClock, SystemClock};
pub use transport::{Publisher, QoS};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
