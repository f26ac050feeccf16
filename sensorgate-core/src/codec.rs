//! Payload decoding
//!
//! Turns raw inbound bytes into a [`Reading`]. Decoding is total: every byte
//! sequence maps to exactly one variant, so the pipeline never has to handle
//! a decode error.
//!
//! ```text
//! bytes ─► UTF-8? ─no──────────────────────────► Raw (lossy text)
//!            │yes
//!            ├─► float? ─yes─► Numeric { value }
//!            ├─► JSON object? ─yes─► Structured { fields }
//!            └─► otherwise ──────────► Raw { text }
//! ```

use serde_json::{Map, Value};

/// Field name used for the numeric variant's map form
pub const VALUE_FIELD: &str = "value";

/// Field name used for the raw variant's map form
pub const RAW_FIELD: &str = "raw";

/// Decoded form of an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Payload was a plain number, e.g. `"25.5"`
    Numeric { value: f64 },
    /// Payload was a JSON object
    Structured { fields: Map<String, Value> },
    /// Anything else, kept as text
    Raw { text: String },
}

impl Reading {
    /// Map form of the reading, as it goes out on the wire
    ///
    /// Numeric becomes `{"value": v}` (`"inf"`, `"-inf"` or `"NaN"` as a
    /// string when not finite), raw becomes `{"raw": text}` and
    /// structured readings are returned field for field.
    pub fn to_fields(&self) -> Map<String, Value> {
        match self {
            Reading::Numeric { value } => {
                // JSON has no inf/NaN; keep them readable instead of null
                let value = if value.is_finite() {
                    Value::from(*value)
                } else {
                    Value::String(value.to_string())
                };
                let mut map = Map::new();
                map.insert(VALUE_FIELD.to_string(), value);
                map
            }
            Reading::Structured { fields } => fields.clone(),
            Reading::Raw { text } => {
                let mut map = Map::new();
                map.insert(RAW_FIELD.to_string(), Value::String(text.clone()));
                map
            }
        }
    }

    /// Numeric value, if this is the numeric variant
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Reading::Numeric { value } => Some(*value),
            _ => None,
        }
    }

    /// Short variant name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Reading::Numeric { .. } => "numeric",
            Reading::Structured { .. } => "structured",
            Reading::Raw { .. } => "raw",
        }
    }
}

/// Decode a raw payload
pub fn decode(payload: &[u8]) -> Reading {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(_) => {
            return Reading::Raw {
                text: String::from_utf8_lossy(payload).into_owned(),
            }
        }
    };

    if let Ok(value) = text.trim().parse::<f64>() {
        return Reading::Numeric { value };
    }

    // Only objects become structured; arrays, strings, literals stay raw
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) {
        return Reading::Structured { fields };
    }

    Reading::Raw { text: text.to_string() }
}
