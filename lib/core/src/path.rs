//! Dot-path access into JSON documents.
//!
//! Paths like `voltages.V1` or `readings.0.value` walk objects by key and
//! arrays by index. Used for parameter extraction, condition variables and
//! alert templates.

use serde_json::{Map, Value};

/// Returns the value at `path`, or `None` when any segment is missing.
///
/// An empty path returns the document itself.
#[must_use]
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }

    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Same as [`lookup`], starting from an object's entries.
#[must_use]
pub fn lookup_in<'a>(entries: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let first = entries.get(head)?;
    match rest {
        Some(rest) => lookup(first, rest),
        None => Some(first),
    }
}

/// Parses a number out of a JSON number or a numeric string.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Resolves a positive integer key from a JSON integer or a digit-only string.
#[must_use]
pub fn positive_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().filter(|v| *v > 0),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<i64>().ok().filter(|v| *v > 0)
        }
        _ => None,
    }
}
