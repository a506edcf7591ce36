//! Guarantees a numeric `confidence` field on upstream detection responses.
//!
//! Only JSON objects are touched. Arrays and scalars pass through unchanged,
//! the caller decides what to do with a `null` document.

use serde_json::{json, Value};

pub const CONFIDENCE: &str = "confidence";
pub const PREDICTIONS: &str = "predictions";

/// Replaces a missing or falsy `confidence` with `0`.
pub fn ensure_confidence(body: &mut Value) {
    if let Value::Object(map) = body {
        if map.get(CONFIDENCE).map_or(true, is_falsy) {
            map.insert(CONFIDENCE.into(), json!(0));
        }
    }
}

/// Sets `confidence` to the largest entry of `predictions`, or `0` when there is nothing to
/// take a maximum over.
pub fn confidence_from_predictions(body: &mut Value) {
    if let Value::Object(map) = body {
        let confidence = match map.get(PREDICTIONS) {
            Some(Value::Array(predictions)) if !predictions.is_empty() => predictions
                .iter()
                .map(coerce_number)
                .fold(f64::NEG_INFINITY, f64::max),
            _ => 0.0,
        };
        map.insert(CONFIDENCE.into(), json!(confidence));
    }
}

/// Loose numeric coercion; anything without a finite numeric reading is `0`.
pub fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => parse_numeric_str(s.trim()),
        Value::Array(items) if items.len() == 1 => coerce_number(&items[0]),
        Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Decimal, or unsigned `0x`/`0o`/`0b` integer literals; the empty string reads as `0`.
fn parse_numeric_str(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => return s.parse().unwrap_or(0.0),
    };
    // Radix literals are unsigned and carry no sign of their own
    match s[2..].chars().next() {
        Some(c) if c.is_digit(radix) => {
            u128::from_str_radix(&s[2..], radix).map_or(0.0, |n| n as f64)
        }
        _ => 0.0,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0 || f.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
