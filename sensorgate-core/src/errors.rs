//! Error Types for the Message Pipeline
//!
//! ## Design Philosophy
//!
//! Almost nothing in SensorGate is allowed to fail from the caller's point of
//! view. Decoding is total, threshold lookups always return a value and
//! `Pipeline::handle` never propagates an error to the transport loop. The
//! types below exist for the *seams* where a collaborator can fail:
//!
//! 1. **Outbound publish**: the transport may be disconnected or reject a
//!    message. Logged, counted, and the audit record still says `processed`.
//!
//! 2. **Audit sinks**: a durable sink may hit an I/O error. Logged and
//!    counted, never aborts the message.
//!
//! 3. **Configuration**: parsed once at startup, so errors here are returned
//!    to the host process.
//!
//! ## Error Categories
//!
//! ### Transport
//! - `PublishError`: outbound publish could not be handed to the transport
//!
//! ### Persistence
//! - `AuditError`: a sink failed to persist a record
//!
//! ### Control surface
//! - `ThresholdError`: a threshold update was rejected
//! - `ConfigError`: configuration could not be parsed or is inconsistent
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use sensorgate_core::{PublishError, Publisher, QoS};
//!
//! fn forward(publisher: &dyn Publisher, topic: &str, payload: &[u8]) {
//!     match publisher.publish(topic, payload, QoS::AtMostOnce) {
//!         Ok(()) => {}
//!         Err(PublishError::NotConnected) => {
//!             // Transport is reconnecting - the attempt is still audited
//!         }
//!         Err(e) => log::warn!("publish failed: {}", e),
//!     }
//! }
//! ```

use thiserror::Error;

/// Outbound publish failures reported by a [`Publisher`](crate::Publisher)
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport has no live connection
    #[error("Not connected")]
    NotConnected,

    /// Transport refused the message (queue full, invalid topic, ...)
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// Any other transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Audit sink failures
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying storage failed
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Rejected threshold updates
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    /// NaN and infinities are not usable as thresholds
    #[error("Threshold for '{class}' must be finite, got {value}")]
    NotFinite {
        /// Sensor class the update targeted
        class: String,
        /// The rejected value
        value: f64,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Document is not valid JSON for the config shape
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document parsed but a value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Internal per-message failures, caught and logged inside the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Enriched reading could not be encoded for the wire
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
