//! Bounded Audit Trail of Pipeline Decisions
//!
//! ## Overview
//!
//! Every inbound message produces exactly one [`AuditRecord`], whether it was
//! forwarded or dropped. Records land in an [`AuditStore`], a fixed-capacity
//! ring that a dashboard or API polls with [`AuditStore::recent`] at its own
//! cadence (typically every 1-2 seconds).
//!
//! ## Design Rationale
//!
//! ### Why a Ring?
//!
//! The audit trail is for *recent* activity. Memory must stay bounded however
//! fast sensors publish, so when the store is full the oldest record goes:
//!
//! ```text
//! capacity = 3
//!
//! append(A) append(B) append(C)   [A, B, C]
//! append(D)                       [B, C, D]   A evicted
//! recent(2)                       [D, C]      newest first
//! ```
//!
//! Eviction follows *insertion* order, not the `timestamp` field. Two records
//! stamped out of order by a skewed clock are still evicted and listed in the
//! order they were appended.
//!
//! ### Locking
//!
//! One `Mutex` around a `VecDeque`. `append` holds it for a push and maybe a
//! pop; `recent` holds it only long enough to clone the requested records.
//! Records are fully built before they are appended, so a reader can never see
//! a half-constructed one.
//!
//! ## Durable Sinks
//!
//! The store is in-memory only. Persistence plugs in through [`AuditSink`];
//! [`JsonLinesSink`] appends one JSON object per line to a file.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AuditError;

/// Default number of records kept in memory
pub const DEFAULT_AUDIT_CAPACITY: usize = 200;

/// Outcome of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Forwarded (publish attempted)
    Processed,
    /// Dropped by the threshold, or failed before publishing
    Filtered,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Processed => "processed",
            AuditStatus::Filtered => "filtered",
        }
    }
}

/// One pipeline decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub in_topic: String,
    pub out_topic: Option<String>,
    pub payload_summary: String,
    pub qos: u8,
    pub latency_ms: f64,
    pub status: AuditStatus,
}

/// Destination for audit records
///
/// Implementations must be safe to call from the message path concurrently
/// with whatever else reads them.
pub trait AuditSink: Send + Sync {
    /// Persist one record
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Sink name for logs
    fn name(&self) -> &'static str;
}

/// Fixed-capacity, insertion-ordered audit log
///
/// ## Internal Invariants
///
/// - `records.len() <= capacity`
/// - front is the oldest insertion, back the newest
pub struct AuditStore {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl AuditStore {
    /// Create an empty store holding at most `capacity` records
    ///
    /// Storage grows with use; nothing is reserved up front.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Insert at the newest position, evicting the oldest when full
    pub fn append(&self, record: AuditRecord) {
        if self.capacity == 0 {
            return;
        }

        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `limit` records, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.lock();
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every record
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl std::fmt::Debug for AuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl AuditSink for AuditStore {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.append(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Append-only JSON Lines sink, normally over a file
///
/// ```rust,no_run
/// use sensorgate_core::audit::JsonLinesSink;
///
/// let sink = JsonLinesSink::open("audit.jsonl")?;
/// # Ok::<(), sensorgate_core::AuditError>(())
/// ```
///
/// Each record goes out in a single write and is flushed immediately. If a
/// write fails part way, the next record starts with a newline so the
/// fragment stays on its own line; readers should skip lines that do not
/// parse.
pub struct JsonLinesSink<W = File> {
    state: Mutex<LineState<W>>,
}

struct LineState<W> {
    writer: W,
    /// Last write failed and may have left an unterminated fragment
    torn: bool,
}

impl JsonLinesSink<File> {
    /// Open (or create) `path` for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Sink over any writer
    pub fn from_writer(writer: W) -> Self {
        Self {
            state: Mutex::new(LineState { writer, torn: false }),
        }
    }
}

fn write_line<W: Write>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.flush()
}

impl<W: Write + Send> AuditSink for JsonLinesSink<W> {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        if state.torn {
            line.insert(0, b'\n');
        }

        let result = write_line(&mut state.writer, &line);
        state.torn = result.is_err();
        Ok(result?)
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
