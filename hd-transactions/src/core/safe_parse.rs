//! Lenient numeric parsing for server documents.
//!
//! Amounts arrive as decimal strings (`"100"`) or, from older backends, as
//! plain JSON numbers. Anything malformed degrades to 0 instead of failing.

use serde_json::Value;

/// Parse an integer from a string. Malformed or out-of-range input yields 0.
pub fn safe_parse_int(s: &str) -> i64 {
    s.trim().parse::<i64>().unwrap_or(0)
}

/// Parse an integer amount out of a JSON value.
///
/// Strings go through [`safe_parse_int`]. Integral numbers are taken as is,
/// fractional numbers are truncated. Everything else is 0.
pub fn safe_parse_amount(value: &Value) -> i64 {
    match value {
        Value::String(s) => safe_parse_int(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64() {
                // `as` saturates on overflow and maps NaN to 0
                f.trunc() as i64
            } else {
                0
            }
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => 0,
    }
}
