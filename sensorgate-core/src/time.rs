//! Time management for the pipeline
//!
//! Provides a clock abstraction so the wall-clock parts of the pipeline
//! (enrichment timestamps, audit record timestamps) can be driven by a fixed
//! source in tests. Latency is measured separately with a monotonic
//! `Instant` and never goes through this trait.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Mutex;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// System time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed time source for testing
///
/// Interior mutability lets a test hold an `Arc<FixedClock>` shared with the
/// pipeline and still move time forward.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { current: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format a timestamp the way it appears on the wire
///
/// RFC 3339, UTC, microsecond resolution, `Z` suffix. Lexical order of the
/// output matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
