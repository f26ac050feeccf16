//! Live-updatable Threshold Registry
//!
//! ## Overview
//!
//! Maps a sensor class (`"temp"`, `"hum"`, ...) to the minimum numeric value a
//! reading of that class needs in order to be forwarded. The registry is
//! shared between the pipeline, which reads it once per message, and an
//! external control surface (configuration API, admin UI) which updates it
//! while messages are flowing.
//!
//! ## Consistency
//!
//! Entries live behind a single `RwLock`:
//! - `get` on an existing class takes the read lock only
//! - `get` on a new class upgrades to the write lock and inserts through the
//!   entry API, so two racing first lookups agree on one entry
//! - `set` replaces threshold and `updated_at` under the write lock, so a
//!   reader sees either the old entry or the new one, never a mix
//!
//! A poisoned lock is recovered rather than propagated: every critical section
//! leaves the map in a consistent state, and a lookup must always produce a
//! value.
//!
//! ## Example
//!
//! ```rust
//! use sensorgate_core::ThresholdRegistry;
//!
//! let registry = ThresholdRegistry::default();
//! assert_eq!(registry.get("temp"), 20.0);
//! assert_eq!(registry.get("hum"), 40.0);
//!
//! registry.set("temp", 5.0).unwrap();
//! assert_eq!(registry.get("temp"), 5.0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ThresholdError;
use crate::time::{Clock, SystemClock};

/// Threshold used for classes without a built-in default
pub const DEFAULT_THRESHOLD: f64 = 20.0;

/// Built-in per-class defaults, in recognition order
pub const BUILTIN_CLASS_DEFAULTS: &[(&str, f64)] = &[("temp", 20.0), ("hum", 40.0)];

/// Default threshold for one sensor class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefault {
    /// Sensor class token, matched as a substring of the topic
    pub class: String,
    /// Threshold used when the class is first looked up
    pub threshold: f64,
}

impl ClassDefault {
    pub fn new(class: impl Into<String>, threshold: f64) -> Self {
        Self { class: class.into(), threshold }
    }

    /// The built-in table as owned values
    pub fn builtin() -> Vec<ClassDefault> {
        BUILTIN_CLASS_DEFAULTS
            .iter()
            .map(|(class, threshold)| ClassDefault::new(*class, *threshold))
            .collect()
    }
}

/// Current threshold of one sensor class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdEntry {
    pub sensor_class: String,
    pub threshold: f64,
    pub updated_at: DateTime<Utc>,
}

/// Concurrency-safe sensor class → threshold map
pub struct ThresholdRegistry {
    entries: RwLock<HashMap<String, ThresholdEntry>>,
    /// Defaults in recognition order
    defaults: Vec<ClassDefault>,
    /// Fallback for classes missing from `defaults`
    fallback: f64,
    clock: Arc<dyn Clock>,
}

impl ThresholdRegistry {
    /// Create a registry with a defaults table and a global fallback
    pub fn new(defaults: Vec<ClassDefault>, fallback: f64) -> Self {
        Self::with_clock(defaults, fallback, Arc::new(SystemClock))
    }

    /// Create a registry stamping `updated_at` from the given clock
    pub fn with_clock(defaults: Vec<ClassDefault>, fallback: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            defaults,
            fallback,
            clock,
        }
    }

    /// Current threshold for `class`, creating the entry on first lookup
    pub fn get(&self, class: &str) -> f64 {
        if let Some(entry) = self.read().get(class) {
            return entry.threshold;
        }

        let mut entries = self.write();
        let default = self.default_for(class);
        let now = self.clock.now();
        entries
            .entry(class.to_string())
            .or_insert_with(|| {
                log::debug!("Created threshold entry class={} threshold={}", class, default);
                ThresholdEntry {
                    sensor_class: class.to_string(),
                    threshold: default,
                    updated_at: now,
                }
            })
            .threshold
    }

    /// Upsert the threshold for `class`
    pub fn set(&self, class: &str, threshold: f64) -> Result<(), ThresholdError> {
        if !threshold.is_finite() {
            return Err(ThresholdError::NotFinite {
                class: class.to_string(),
                value: threshold,
            });
        }

        let entry = ThresholdEntry {
            sensor_class: class.to_string(),
            threshold,
            updated_at: self.clock.now(),
        };
        let previous = self.write().insert(class.to_string(), entry);

        log::info!(
            "Threshold updated class={} threshold={} previous={:?}",
            class,
            threshold,
            previous.map(|e| e.threshold)
        );
        Ok(())
    }

    /// Copy of the entry for `class`, without creating one
    pub fn entry(&self, class: &str) -> Option<ThresholdEntry> {
        self.read().get(class).cloned()
    }

    /// All entries, sorted by class
    pub fn snapshot(&self) -> Vec<ThresholdEntry> {
        let mut entries: Vec<ThresholdEntry> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.sensor_class.cmp(&b.sensor_class));
        entries
    }

    /// Recognise a sensor class inside `topic`
    ///
    /// Substring match on the whole topic, so `"sensors/temp/1"` and
    /// `"sensors/attempt/1"` are both `"temp"`. Defaults are tried in table
    /// order, then classes that only exist through `set`, alphabetically.
    pub fn classify(&self, topic: &str) -> Option<String> {
        if let Some(default) = self.defaults.iter().find(|d| topic.contains(d.class.as_str())) {
            return Some(default.class.clone());
        }

        let entries = self.read();
        let mut extra: Vec<&String> = entries
            .keys()
            .filter(|class| !class.is_empty() && !self.is_builtin(class))
            .collect();
        extra.sort();
        extra
            .into_iter()
            .find(|class| topic.contains(class.as_str()))
            .cloned()
    }

    /// Global fallback threshold
    pub fn fallback(&self) -> f64 {
        self.fallback
    }

    fn default_for(&self, class: &str) -> f64 {
        self.defaults
            .iter()
            .find(|d| d.class == class)
            .map(|d| d.threshold)
            .unwrap_or(self.fallback)
    }

    fn is_builtin(&self, class: &str) -> bool {
        self.defaults.iter().any(|d| d.class == class)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ThresholdEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ThresholdEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ThresholdRegistry {
    fn default() -> Self {
        Self::new(ClassDefault::builtin(), DEFAULT_THRESHOLD)
    }
}

impl std::fmt::Debug for ThresholdRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdRegistry")
            .field("entries", &self.read().len())
            .field("defaults", &self.defaults)
            .field("fallback", &self.fallback)
            .finish()
    }
}
