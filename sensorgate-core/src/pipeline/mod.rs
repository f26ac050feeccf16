//! Message Pipeline
//!
//! ## Overview
//!
//! One call to [`Pipeline::handle`] per inbound message:
//!
//! ```text
//! (topic, payload, qos)
//!        │
//!        ▼
//!   decode ─► classify topic ─► threshold ─► should_forward?
//!                                              │         │
//!                                             no        yes
//!                                              │         ▼
//!                                              │    route + enrich ─► publish
//!                                              ▼         ▼
//!                                   AuditStore.append(record) ─► extra sinks
//! ```
//!
//! ## Failure Containment
//!
//! `handle` never returns an error and never panics on bad input. Each step
//! that can fail is captured where it happens:
//!
//! - decoding is total (unparseable payloads become raw readings)
//! - a serialization failure is logged and the message is audited as
//!   `filtered`
//! - a publish failure is logged and the message is still audited as
//!   `processed`: the audit trail tracks the attempt, not delivery
//! - a failing extra sink is logged and skipped
//!
//! ## Shared State
//!
//! The pipeline holds `Arc`s to the [`ThresholdRegistry`] and [`AuditStore`].
//! Both are internally synchronised, so `handle` takes `&self` and can run
//! while a control surface updates thresholds and a dashboard polls records.

mod builder;

pub use builder::PipelineBuilder;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::audit::{AuditRecord, AuditSink, AuditStatus, AuditStore};
use crate::codec::{self, Reading};
use crate::config::PipelineConfig;
use crate::enrich::enrich;
use crate::errors::PipelineError;
use crate::filter::should_forward;
use crate::registry::ThresholdRegistry;
use crate::router::TopicRouter;
use crate::time::Clock;
use crate::transport::Publisher;

/// Marker appended to truncated payload summaries
const TRUNCATION_MARKER: char = '…';

/// Pipeline counters
///
/// Relaxed atomics: the counters are for monitoring and carry no ordering
/// with respect to the audit store.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    filtered: AtomicU64,
    publish_failures: AtomicU64,
    sink_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Messages handed to `handle`
    pub received: u64,
    /// Messages audited as processed
    pub forwarded: u64,
    /// Messages audited as filtered
    pub filtered: u64,
    /// Publish attempts the transport rejected
    pub publish_failures: u64,
    /// Records an extra sink failed to persist
    pub sink_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Result of the forward/drop branch, before timing is known
struct Decision {
    status: AuditStatus,
    out_topic: Option<String>,
    summary: String,
}

/// Sensor message pipeline
pub struct Pipeline {
    config: PipelineConfig,
    router: TopicRouter,
    registry: Arc<ThresholdRegistry>,
    store: Arc<AuditStore>,
    sinks: Vec<Arc<dyn AuditSink>>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    stats: PipelineStats,
}

impl Pipeline {
    /// Start building a pipeline from `config`
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Process one inbound message
    ///
    /// Publishes at most once (exactly once iff forwarded) and appends exactly
    /// one record to the audit store. The record is returned as a copy.
    pub fn handle(&self, in_topic: &str, payload: &[u8], qos: u8) -> AuditRecord {
        let started = Instant::now();
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let reading = codec::decode(payload);
        let class = self.registry.classify(in_topic);
        let threshold = match class.as_deref() {
            Some(class) => self.registry.get(class),
            None => self.registry.fallback(),
        };

        let decision = if should_forward(Some(&reading), threshold) {
            self.forward(in_topic, &reading)
        } else {
            Decision {
                status: AuditStatus::Filtered,
                out_topic: None,
                summary: self.summarize(reading_summary(&reading)),
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        match decision.status {
            AuditStatus::Processed => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                log::info!(
                    "Processed: in_topic={} out_topic={} qos={} time_ms={:.2} payload={}",
                    in_topic,
                    decision.out_topic.as_deref().unwrap_or_default(),
                    qos,
                    latency_ms,
                    decision.summary
                );
            }
            AuditStatus::Filtered => {
                self.stats.filtered.fetch_add(1, Ordering::Relaxed);
                log::info!(
                    "Filtered out message on {} class={} threshold={} qos={} kind={} payload={}",
                    in_topic,
                    class.as_deref().unwrap_or("-"),
                    threshold,
                    qos,
                    reading.kind(),
                    decision.summary
                );
            }
        }

        let record = AuditRecord {
            timestamp: self.clock.now(),
            in_topic: in_topic.to_string(),
            out_topic: decision.out_topic,
            payload_summary: decision.summary,
            qos,
            latency_ms,
            status: decision.status,
        };

        self.store.append(record.clone());
        for sink in &self.sinks {
            if let Err(e) = sink.record(&record) {
                self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Audit sink '{}' failed for {}: {}", sink.name(), in_topic, e);
            }
        }

        record
    }

    fn forward(&self, in_topic: &str, reading: &Reading) -> Decision {
        let out_topic = self.router.route(in_topic);
        let enriched = enrich(reading, self.clock.as_ref());

        let payload = match encode(&enriched) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Dropping message on {}: {}", in_topic, e);
                return Decision {
                    status: AuditStatus::Filtered,
                    out_topic: None,
                    summary: self.summarize(format!("{:?}", enriched)),
                };
            }
        };

        if let Err(e) = self.publisher.publish(&out_topic, payload.as_bytes(), self.config.outbound_qos) {
            self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("Publish to {} failed: {}", out_topic, e);
        }

        Decision {
            status: AuditStatus::Processed,
            out_topic: Some(out_topic),
            summary: self.summarize(payload),
        }
    }

    fn summarize(&self, text: String) -> String {
        truncate(text, self.config.summary_limit)
    }

    /// Shared threshold registry
    pub fn registry(&self) -> &Arc<ThresholdRegistry> {
        &self.registry
    }

    /// Shared audit store
    pub fn store(&self) -> &Arc<AuditStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Subscription filter for the sensor namespace, e.g. `sensors/#`
    pub fn subscription(&self) -> String {
        self.router.subscription()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Wire encoding of an enriched reading
fn encode(fields: &Map<String, Value>) -> Result<String, PipelineError> {
    Ok(serde_json::to_string(fields)?)
}

/// Summary of a reading that was not forwarded
fn reading_summary(reading: &Reading) -> String {
    serde_json::to_string(&reading.to_fields()).unwrap_or_else(|_| format!("{:?}", reading))
}

/// Cut `text` to `limit` characters, marking the cut
fn truncate(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut short = text[..cut].to_string();
            short.push(TRUNCATION_MARKER);
            short
        }
        None => text,
    }
}
