//! Confidence normalization.
//!
//! Models report confidence as numbers, qualitative words, or not at
//! all. Everything is mapped into a scalar in `[0, 1]` before schema
//! validation runs.

use serde_json::{Map, Value};

/// Default when the model reports nothing usable.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Map a raw confidence value to a scalar in `[0, 1]`.
pub fn normalized_confidence(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(n)) => clamp(n.as_f64().unwrap_or(DEFAULT_CONFIDENCE)),
        Some(Value::String(s)) => from_word_or_number(s),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Rewrite the `confidence` field of `value` in place.
///
/// Always runs before schema validation so validators only ever see a
/// clamped numeric confidence.
pub fn normalize_confidence(value: &mut Map<String, Value>) {
    let normalized = normalized_confidence(value.get("confidence"));
    value.insert("confidence".to_string(), Value::from(normalized));
}

/// Fixed qualitative table, case-insensitive; any other string is
/// parsed as a float.
fn from_word_or_number(s: &str) -> f64 {
    match s.trim().to_lowercase().as_str() {
        "very high" => 0.95,
        "high" => 0.9,
        "medium" => 0.6,
        "low" => 0.3,
        "very low" => 0.1,
        other => other
            .parse::<f64>()
            .map(clamp)
            .unwrap_or(DEFAULT_CONFIDENCE),
    }
}

fn clamp(v: f64) -> f64 {
    if v.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn of(value: Value) -> f64 {
        normalized_confidence(Some(&value))
    }

    #[test]
    fn qualitative_word_table() {
        assert_eq!(of(json!("very high")), 0.95);
        assert_eq!(of(json!("high")), 0.9);
        assert_eq!(of(json!("medium")), 0.6);
        assert_eq!(of(json!("low")), 0.3);
        assert_eq!(of(json!("very low")), 0.1);
    }

    #[test]
    fn words_are_case_insensitive() {
        assert_eq!(of(json!("HIGH")), 0.9);
        assert_eq!(of(json!(" Medium ")), 0.6);
        assert_eq!(of(json!("Very High")), 0.95);
    }

    #[test]
    fn numeric_strings_are_parsed() {
        assert_eq!(of(json!("0.75")), 0.75);
        assert_eq!(of(json!("1.8")), 1.0);
    }

    #[test]
    fn numbers_are_clamped() {
        assert_eq!(of(json!(1.5)), 1.0);
        assert_eq!(of(json!(-0.2)), 0.0);
        assert_eq!(of(json!(0.42)), 0.42);
    }

    #[test]
    fn missing_or_unparsable_defaults() {
        assert_eq!(normalized_confidence(None), DEFAULT_CONFIDENCE);
        assert_eq!(of(json!("fairly sure")), DEFAULT_CONFIDENCE);
        assert_eq!(of(json!(null)), DEFAULT_CONFIDENCE);
        assert_eq!(of(json!({"nested": true})), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn normalize_rewrites_field_in_place() {
        let mut map = serde_json::from_str::<Map<String, Value>>(
            r#"{"summary": "s", "confidence": "high"}"#,
        )
        .unwrap();
        normalize_confidence(&mut map);
        assert_eq!(map.get("confidence"), Some(&json!(0.9)));
    }

    #[test]
    fn normalize_inserts_missing_field() {
        let mut map = Map::new();
        normalize_confidence(&mut map);
        assert_eq!(map.get("confidence"), Some(&json!(DEFAULT_CONFIDENCE)));
    }
}
