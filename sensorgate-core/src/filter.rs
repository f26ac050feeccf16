//! Forward/drop policy
//!
//! A single numeric threshold comparison. Only a reading that is confidently
//! numeric *and* below its threshold is dropped; anything the pipeline cannot
//! interpret is forwarded, leaving the decision to downstream consumers.

use crate::codec::Reading;

/// Decide whether a reading should be forwarded
///
/// - absent reading: drop
/// - numeric: forward iff `value >= threshold` (NaN never forwards)
/// - structured or raw: forward
pub fn should_forward(reading: Option<&Reading>, threshold: f64) -> bool {
    match reading {
        None => false,
        Some(Reading::Numeric { value }) => *value >= threshold,
        Some(Reading::Structured { .. }) | Some(Reading::Raw { .. }) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    #[test]
    fn numeric_boundary_is_inclusive() {
        let at = Reading::Numeric { value: 20.0 };
        assert!(should_forward(Some(&at), 20.0));

        let below = Reading::Numeric { value: 19.999 };
        assert!(!should_forward(Some(&below), 20.0));
    }

    #[test]
    fn missing_reading_is_dropped() {
        assert!(!should_forward(None, f64::MIN));
    }

    #[test]
    fn nan_is_dropped() {
        let nan = Reading::Numeric { value: f64::NAN };
        assert!(!should_forward(Some(&nan), 0.0));
    }

    #[test]
    fn uninterpretable_readings_forward() {
        let raw = Reading::Raw { text: "garbage".into() };
        let structured = Reading::Structured { fields: Map::new() };
        assert!(should_forward(Some(&raw), f64::MAX));
        assert!(should_forward(Some(&structured), f64::MAX));
    }

    proptest! {
        #[test]
        fn numeric_forward_iff_at_or_above(value in -1.0e6f64..1.0e6, threshold in -1.0e6f64..1.0e6) {
            let reading = Reading::Numeric { value };
            prop_assert_eq!(should_forward(Some(&reading), threshold), value >= threshold);
        }

        #[test]
        fn raw_always_forwards(text in ".*", threshold in proptest::num::f64::ANY) {
            let reading = Reading::Raw { text };
            prop_assert!(should_forward(Some(&reading), threshold));
        }

        #[test]
        fn value_equal_to_threshold_forwards(value in proptest::num::f64::NORMAL) {
            let reading = Reading::Numeric { value };
            prop_assert!(should_forward(Some(&reading), value));
        }
    }
}
