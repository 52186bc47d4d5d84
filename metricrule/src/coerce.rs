//! Conversion of extracted JSON values to metric values.
use serde_json::{Number, Value};

use crate::config::ParsedType;
use crate::error::{json_kind, CoercionError};
use crate::evaluate::MetricValue;

// 2^53: from here on, a float may be the rounded form of a neighboring integer.
const INEXACT_INT_BOUND: f64 = 9_007_199_254_740_992.0;

/// Converts `value` to a [`MetricValue`] of the declared type.
///
/// `FLOAT` accepts any JSON number, or a string holding a finite floating-point literal. `INT`
/// accepts a JSON number or numeric string with no fractional part that fits in an `i64`.
/// Fractional values are never truncated: `3.5` declared as `INT` is an error. Integral values that
/// only exist as floats must lie strictly within ±2^53, where the float is known to be exact. `STRING` cannot
/// back a metric value and always fails.
///
/// ```rust
/// # use metricrule::{coerce, MetricValue, ParsedType};
/// # use serde_json::json;
/// assert_eq!(coerce(&json!("0.25"), ParsedType::Float), Ok(MetricValue::Float64(0.25)));
/// assert_eq!(coerce(&json!(7.0), ParsedType::Int), Ok(MetricValue::Int64(7)));
/// assert!(coerce(&json!("3.5"), ParsedType::Int).is_err());
/// ```
pub fn coerce(value: &Value, declared: ParsedType) -> Result<MetricValue, CoercionError> {
    match declared {
        ParsedType::Float => coerce_float(value).map(MetricValue::Float64),
        ParsedType::Int => coerce_int(value).map(MetricValue::Int64),
        ParsedType::String => Err(CoercionError::NotNumeric(declared)),
    }
}

fn coerce_float(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => number_as_f64(n, ParsedType::Float),
        Value::String(s) => parse_float(s).ok_or_else(|| CoercionError::InvalidString {
            expected: ParsedType::Float,
            value: s.clone(),
        }),
        other => Err(CoercionError::UnsupportedValue {
            expected: ParsedType::Float,
            found: json_kind(other),
        }),
    }
}

fn coerce_int(value: &Value) -> Result<i64, CoercionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            if n.is_u64() {
                return Err(CoercionError::OutOfRange(n.to_string()));
            }
            float_to_int(number_as_f64(n, ParsedType::Int)?)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some(result) = parse_integer_literal(trimmed) {
                return result;
            }
            match parse_float(trimmed) {
                Some(f) => float_to_int(f),
                None => Err(CoercionError::InvalidString {
                    expected: ParsedType::Int,
                    value: s.clone(),
                }),
            }
        }
        other => Err(CoercionError::UnsupportedValue {
            expected: ParsedType::Int,
            found: json_kind(other),
        }),
    }
}

fn number_as_f64(n: &Number, expected: ParsedType) -> Result<f64, CoercionError> {
    n.as_f64().ok_or(CoercionError::UnsupportedValue { expected, found: "number" })
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parses `digits` or `digits.000`, with an optional sign, exactly and without going through a
/// float.
///
/// Returns `None` when `s` does not have that form.
fn parse_integer_literal(s: &str) -> Option<Result<i64, CoercionError>> {
    let (whole, fraction) = s.split_once('.').unwrap_or((s, "0"));
    if fraction.is_empty() || !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    let digits = whole.strip_prefix(&['-', '+'][..]).unwrap_or(whole);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(whole.parse::<i64>().map_err(|_| CoercionError::OutOfRange(s.to_string())))
}

fn float_to_int(f: f64) -> Result<i64, CoercionError> {
    if f.fract() != 0.0 {
        return Err(CoercionError::Fractional(f));
    }
    if f.abs() >= INEXACT_INT_BOUND {
        return Err(CoercionError::Inexact(f));
    }
    Ok(f as i64)
}
