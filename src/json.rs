//! Helpers over `serde_json::Value` with JSON Schema equality semantics.
//!
//! JSON Schema compares numbers by mathematical value, so `1`, `1.0`, and
//! `1e0` are all equal. Objects are equal iff they have the same key set
//! with pairwise-equal values, regardless of key order; arrays are equal
//! iff they have the same length and pairwise-equal elements.

use serde_json::{Number, Value};

/// Compare two numbers by mathematical value.
pub fn num_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Deep equality with JSON Schema number semantics.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => num_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(u, v)| deep_eq(u, v))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, u)| y.get(k).map(|v| deep_eq(u, v)).unwrap_or(false))
        }
        _ => false,
    }
}

/// The JSON type name of a value, as used in validation messages and by
/// the `type` keyword.
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether a number holds a mathematically integral value. `1.0` is an
/// integer in JSON Schema terms even though it is written as a float.
pub fn is_integer(number: &Number) -> bool {
    if number.is_i64() || number.is_u64() {
        return true;
    }
    match number.as_f64() {
        Some(f) => f.fract() == 0.0 && f.is_finite(),
        None => false,
    }
}
