//! Value helpers - loose comparison, emptiness and identity keys for JSON values
//!
//! Keys arrive from heterogeneous sources: a foreign key may be stored as `10`
//! on the host and as `"10"` on the linked row. Matching therefore compares
//! loosely, numeric strings and numbers being interchangeable.

use serde_json::{Number, Value};

/// Returns true for values that carry no key: null, false, 0, "", "0", [] and {}
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Loose equality between two values
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            parse_number(s).is_some_and(|parsed| Some(parsed) == n.as_f64())
        }
        (Value::String(a), Value::String(b)) => match (parse_number(a), parse_number(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::Bool(b), other) | (other, Value::Bool(b)) => *b == !is_empty(other),
        (Value::Null, other) | (other, Value::Null) => match other {
            Value::String(s) => s.is_empty(),
            _ => is_empty(other),
        },
        _ => false,
    }
}

/// Loose membership test
pub fn contains_loose(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|candidate| loose_eq(candidate, needle))
}

/// Views a value as a list: null becomes empty, arrays and objects yield their
/// elements, any other scalar becomes a one-element list
pub fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        scalar => vec![scalar.clone()],
    }
}

/// Integer view of a key value, `None` when it does not denote an integer
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Key under which a value is deduplicated.
///
/// Numbers and numeric strings collapse on their numeric value, so `10`,
/// `10.0` and `"10"` share a key. Other strings key on their text. Arrays
/// and objects are keyed by a content hash of their serialization.
pub fn identity_key(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => numeric_key(f).unwrap_or_else(|| n.to_string()),
            _ => n.to_string(),
        },
        Value::String(s) => parse_number(s).and_then(numeric_key).unwrap_or_else(|| s.clone()),
        Value::Array(_) | Value::Object(_) => format!("#{}", content_hash(value)),
    }
}

/// Canonical text of a finite number; integral values print without a fraction
fn numeric_key(f: f64) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Some((f as i64).to_string());
    }
    Some(f.to_string())
}

/// Short hex digest of the canonical JSON form of a value
pub fn content_hash(value: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

/// Removes empty values and duplicates (by identity key), keeping first occurrences
pub fn unique_non_empty<I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| !is_empty(value))
        .filter(|value| seen.insert(identity_key(value)))
        .collect()
}

pub(crate) fn int_value(value: i64) -> Value {
    Value::Number(Number::from(value))
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
