//! Processing metadata
//!
//! Adds the time this pipeline instance processed a reading. Not idempotent:
//! every call stamps a fresh timestamp, overwriting any `processed_at` the
//! publisher may have sent.

use serde_json::{Map, Value};

use crate::codec::Reading;
use crate::time::{format_timestamp, Clock};

/// Field added to every forwarded payload
pub const PROCESSED_AT_FIELD: &str = "processed_at";

/// Map form of `reading` plus a `processed_at` timestamp
pub fn enrich(reading: &Reading, clock: &dyn Clock) -> Map<String, Value> {
    let mut fields = reading.to_fields();
    fields.insert(
        PROCESSED_AT_FIELD.to_string(),
        Value::String(format_timestamp(clock.now())),
    );
    fields
}
