//! Topic remapping
//!
//! `sensors/temp/1` → `processed/temp/1`. Topics outside the sensor namespace
//! are moved under the processed root unchanged: `lab/temp` →
//! `processed/lab/temp`.

/// Topic hierarchy separator
pub const TOPIC_SEPARATOR: char = '/';

/// Default root of the inbound namespace
pub const DEFAULT_SENSOR_ROOT: &str = "sensors";

/// Default root of the outbound namespace
pub const DEFAULT_PROCESSED_ROOT: &str = "processed";

/// Maps inbound topics into the processed namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    sensor_root: String,
    processed_root: String,
}

impl TopicRouter {
    pub fn new(sensor_root: impl Into<String>, processed_root: impl Into<String>) -> Self {
        Self {
            sensor_root: sensor_root.into(),
            processed_root: processed_root.into(),
        }
    }

    /// Outbound topic for `in_topic`
    ///
    /// Only the first segment is ever replaced. A bare root with nothing
    /// after it is treated like any foreign topic and prefixed.
    pub fn route(&self, in_topic: &str) -> String {
        match in_topic.split_once(TOPIC_SEPARATOR) {
            Some((first, rest)) if first == self.sensor_root => {
                format!("{}{}{}", self.processed_root, TOPIC_SEPARATOR, rest)
            }
            _ => format!("{}{}{}", self.processed_root, TOPIC_SEPARATOR, in_topic),
        }
    }

    /// Subscription filter covering the whole sensor namespace
    pub fn subscription(&self) -> String {
        format!("{}{}#", self.sensor_root, TOPIC_SEPARATOR)
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_ROOT, DEFAULT_PROCESSED_ROOT)
    }
}

/// Route with the default roots
pub fn route(in_topic: &str) -> String {
    TopicRouter::default().route(in_topic)
}
