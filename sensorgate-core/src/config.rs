//! Pipeline configuration
//!
//! Built either in code with the builder-style setters or parsed from JSON:
//!
//! ```rust
//! use sensorgate_core::{PipelineConfig, QoS};
//!
//! let config = PipelineConfig::default()
//!     .default_threshold(15.0)
//!     .outbound_qos(QoS::AtLeastOnce)
//!     .audit_capacity(500);
//!
//! let parsed = PipelineConfig::from_json(r#"{
//!     "default_threshold": 15.0,
//!     "outbound_qos": 1,
//!     "audit_capacity": 500
//! }"#).unwrap();
//!
//! assert_eq!(config, parsed);
//! ```
//!
//! Missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::errors::ConfigError;
use crate::registry::{ClassDefault, DEFAULT_THRESHOLD};
use crate::router::{DEFAULT_PROCESSED_ROOT, DEFAULT_SENSOR_ROOT, TOPIC_SEPARATOR};
use crate::transport::QoS;

/// Longest payload summary kept in an audit record, in characters
pub const DEFAULT_SUMMARY_LIMIT: usize = 1024;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First topic segment of inbound sensor topics
    pub sensor_root: String,
    /// First topic segment of republished topics
    pub processed_root: String,
    /// Threshold for topics with no recognised class, and for new classes
    /// without a table entry
    pub default_threshold: f64,
    /// Per-class defaults, in recognition order
    pub class_defaults: Vec<ClassDefault>,
    /// QoS used when republishing
    pub outbound_qos: QoS,
    /// Records kept by the in-memory audit store
    pub audit_capacity: usize,
    /// Payload summaries longer than this are truncated
    pub summary_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sensor_root: DEFAULT_SENSOR_ROOT.to_string(),
            processed_root: DEFAULT_PROCESSED_ROOT.to_string(),
            default_threshold: DEFAULT_THRESHOLD,
            class_defaults: ClassDefault::builtin(),
            outbound_qos: QoS::AtMostOnce,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, root) in [("sensor_root", &self.sensor_root), ("processed_root", &self.processed_root)] {
            if root.is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
            if root.contains(TOPIC_SEPARATOR) || root.contains('#') || root.contains('+') {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a single topic segment, got '{}'",
                    name, root
                )));
            }
        }

        if !self.default_threshold.is_finite() {
            return Err(ConfigError::Invalid("default_threshold must be finite".into()));
        }

        for default in &self.class_defaults {
            if default.class.is_empty() {
                return Err(ConfigError::Invalid("class_defaults entry with empty class".into()));
            }
            if !default.threshold.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "threshold for class '{}' must be finite",
                    default.class
                )));
            }
        }

        if self.audit_capacity == 0 {
            return Err(ConfigError::Invalid("audit_capacity must be > 0".into()));
        }

        Ok(())
    }

    pub fn sensor_root(mut self, root: impl Into<String>) -> Self {
        self.sensor_root = root.into();
        self
    }

    pub fn processed_root(mut self, root: impl Into<String>) -> Self {
        self.processed_root = root.into();
        self
    }

    pub fn default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold;
        self
    }

    /// Add or replace the default for one class
    pub fn class_default(mut self, class: impl Into<String>, threshold: f64) -> Self {
        let class = class.into();
        match self.class_defaults.iter_mut().find(|d| d.class == class) {
            Some(existing) => existing.threshold = threshold,
            None => self.class_defaults.push(ClassDefault::new(class, threshold)),
        }
        self
    }

    pub fn outbound_qos(mut self, qos: QoS) -> Self {
        self.outbound_qos = qos;
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    pub fn summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }
}
