//! Coercion of raw insights rows.
//!
//! Numbers arrive as JSON strings, numbers or not at all. Everything in
//! here resolves "missing or unparsable" to zero so the metric arithmetic
//! never sees an absent value.

use super::{BucketKey, InsightRow};
use crate::models::{AgeBracket, Gender, RawSegmentMetrics, Segment};
use serde_json::Value;
use tracing::warn;

/// Default conversion event counted as a purchase.
pub const DEFAULT_CONVERSION_EVENT: &str = "offsite_conversion.fb_pixel_purchase";

const UNKNOWN: &str = "unknown";

/// Coerce a count field. Fractional strings are truncated.
pub fn coerce_count(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Coerce a currency or fractional field.
pub fn coerce_amount(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

/// Value of the first `{action_type, value}` entry matching `action_type`.
pub fn action_value(actions: Option<&Value>, action_type: &str) -> f64 {
    actions
        .and_then(Value::as_array)
        .and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.get("action_type").and_then(Value::as_str) == Some(action_type))
        })
        .map_or(0.0, |entry| coerce_amount(entry.get("value")))
}

/// Map the breakdown fields of a row onto a bucket.
///
/// Missing age or gender defaults to `unknown`. Only a known age with a known
/// gender lands on a [`Segment`].
pub fn bucket_key(age: Option<&str>, gender: Option<&str>, breakdown: bool) -> BucketKey {
    if !breakdown {
        return BucketKey::Total;
    }

    let age = age.filter(|a| !a.is_empty()).unwrap_or(UNKNOWN);
    let gender = gender.filter(|g| !g.is_empty()).unwrap_or(UNKNOWN);

    match (AgeBracket::parse(age), Gender::parse(gender)) {
        (Some(age), Some(gender)) => BucketKey::Segment(Segment::new(age, gender)),
        _ => BucketKey::Unrecognized(format!("{}_{}", age, gender)),
    }
}

/// Parse one element of the insights `data` array.
pub fn parse_row(item: &Value, conversion_event: &str, breakdown: bool) -> InsightRow {
    let bucket = bucket_key(
        item.get("age").and_then(Value::as_str),
        item.get("gender").and_then(Value::as_str),
        breakdown,
    );

    if let BucketKey::Unrecognized(ref key) = bucket {
        warn!("Unrecognized demographic bucket from insights: {}", key);
    }

    InsightRow {
        bucket,
        metrics: RawSegmentMetrics {
            reach: coerce_count(item.get("reach")),
            impressions: coerce_count(item.get("impressions")),
            spend: coerce_amount(item.get("spend")),
            conversions: action_value(item.get("actions"), conversion_event),
            revenue: action_value(item.get("action_values"), conversion_event),
        },
    }
}

/// Parse a whole `data` array.
pub fn parse_rows(data: &[Value], conversion_event: &str, breakdown: bool) -> Vec<InsightRow> {
    data.iter()
        .map(|item| parse_row(item, conversion_event, breakdown))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_count() {
        assert_eq!(coerce_count(Some(&json!("1234"))), 1234);
        assert_eq!(coerce_count(Some(&json!(56))), 56);
        assert_eq!(coerce_count(Some(&json!("12.9"))), 12);
        assert_eq!(coerce_count(Some(&json!(""))), 0);
        assert_eq!(coerce_count(Some(&json!("n/a"))), 0);
        assert_eq!(coerce_count(Some(&Value::Null)), 0);
        assert_eq!(coerce_count(None), 0);
    }

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount(Some(&json!("10.25"))), 10.25);
        assert_eq!(coerce_amount(Some(&json!(3))), 3.0);
        assert_eq!(coerce_amount(Some(&json!("NaN"))), 0.0);
        assert_eq!(coerce_amount(None), 0.0);
    }

    #[test]
    fn test_action_value_matches_event() {
        let actions = json!([
            {"action_type": "link_click", "value": "40"},
            {"action_type": DEFAULT_CONVERSION_EVENT, "value": "7"},
        ]);
        assert_eq!(action_value(Some(&actions), DEFAULT_CONVERSION_EVENT), 7.0);
        assert_eq!(action_value(Some(&actions), "lead"), 0.0);
        assert_eq!(action_value(None, DEFAULT_CONVERSION_EVENT), 0.0);
        assert_eq!(action_value(Some(&json!("oops")), DEFAULT_CONVERSION_EVENT), 0.0);
    }

    #[test]
    fn test_bucket_key_defaults_to_unknown() {
        assert_eq!(bucket_key(None, None, false), BucketKey::Total);
        assert_eq!(
            bucket_key(Some("25-34"), None, true),
            BucketKey::Segment(Segment::new(AgeBracket::Age25To34, Gender::Unknown))
        );
        assert_eq!(
            bucket_key(None, Some("male"), true),
            BucketKey::Unrecognized("unknown_male".to_string())
        );
        assert_eq!(
            bucket_key(Some("25-34"), Some("other"), true),
            BucketKey::Unrecognized("25-34_other".to_string())
        );
    }

    #[test]
    fn test_parse_row() {
        let item = json!({
            "age": "18-24",
            "gender": "female",
            "reach": "100",
            "impressions": "250",
            "spend": "12.50",
            "actions": [{"action_type": DEFAULT_CONVERSION_EVENT, "value": "2"}],
            "action_values": [{"action_type": DEFAULT_CONVERSION_EVENT, "value": "80.00"}],
        });

        let row = parse_row(&item, DEFAULT_CONVERSION_EVENT, true);
        assert_eq!(
            row.bucket,
            BucketKey::Segment(Segment::new(AgeBracket::Age18To24, Gender::Female))
        );
        assert_eq!(row.metrics.reach, 100);
        assert_eq!(row.metrics.impressions, 250);
        assert_eq!(row.metrics.spend, 12.5);
        assert_eq!(row.metrics.conversions, 2.0);
        assert_eq!(row.metrics.revenue, 80.0);
    }

    #[test]
    fn test_parse_row_with_missing_fields() {
        let row = parse_row(&json!({"reach": "9"}), DEFAULT_CONVERSION_EVENT, false);
        assert_eq!(row.bucket, BucketKey::Total);
        assert_eq!(
            row.metrics,
            RawSegmentMetrics {
                reach: 9,
                ..RawSegmentMetrics::default()
            }
        );
    }
}
