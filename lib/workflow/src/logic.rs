//! JSON-logic expression evaluation.
//!
//! Expressions are JSON documents where an object with exactly one key is an
//! operator application (`{">": [{"var": "trigger.value"}, 40]}`), an array
//! evaluates each element, and anything else is a literal. Supported
//! operators: `var`, `+ - * / min max`, `== === != !== > >= < <=`,
//! `and or !` and `if`. Unknown operators return their operand unevaluated.
//!
//! Comparison follows loose scripting-language semantics: numeric strings
//! compare as numbers and `==` coerces across types.

use sensorflow_core::path;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

/// Evaluates boolean expressions against a data document.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expression` against `data`.
    fn evaluate(&self, expression: &JsonValue, data: &JsonValue) -> JsonValue;
}

/// The built-in JSON-logic evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLogic;

impl ExpressionEvaluator for JsonLogic {
    fn evaluate(&self, expression: &JsonValue, data: &JsonValue) -> JsonValue {
        evaluate(expression, data)
    }
}

/// Evaluates an expression with the built-in operator set.
#[must_use]
pub fn evaluate(expression: &JsonValue, data: &JsonValue) -> JsonValue {
    match expression {
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| evaluate(item, data)).collect())
        }
        JsonValue::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((operator, operand)) => apply(operator, operand, data),
            None => expression.clone(),
        },
        _ => expression.clone(),
    }
}

fn apply(operator: &str, operand: &JsonValue, data: &JsonValue) -> JsonValue {
    match operator {
        "var" => resolve_var(operand, data),
        "+" | "-" | "*" | "/" | "min" | "max" => arithmetic(operator, operand, data),
        "==" | "===" | "!=" | "!==" | ">" | ">=" | "<" | "<=" => {
            JsonValue::Bool(compare(operator, operand, data))
        }
        "and" | "or" | "!" => JsonValue::Bool(logical(operator, operand, data)),
        "if" => conditional(operand, data),
        _ => operand.clone(),
    }
}

/// Operands as a list: arrays as-is, object values in order, scalars wrapped.
fn operands(operand: &JsonValue) -> Vec<&JsonValue> {
    match operand {
        JsonValue::Array(items) => items.iter().collect(),
        JsonValue::Object(map) => map.values().collect(),
        other => vec![other],
    }
}

fn resolve_var(operand: &JsonValue, data: &JsonValue) -> JsonValue {
    let (var_path, default) = match operand {
        JsonValue::Array(items) => (items.first(), items.get(1)),
        other => (Some(other), None),
    };
    let default = default.cloned().unwrap_or(JsonValue::Null);

    match var_path.and_then(JsonValue::as_str) {
        Some(var_path) if !var_path.is_empty() => path::lookup(data, var_path)
            .cloned()
            .unwrap_or(default),
        _ => default,
    }
}

fn to_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Bool(b) => f64::from(u8::from(*b)),
        other => path::as_number(other).unwrap_or(0.0),
    }
}

fn arithmetic(operator: &str, operand: &JsonValue, data: &JsonValue) -> JsonValue {
    let numbers: Vec<f64> = operands(operand)
        .into_iter()
        .map(|item| to_number(&evaluate(item, data)))
        .collect();

    let result = match operator {
        "+" => numbers.iter().sum(),
        "*" => numbers.iter().product(),
        "-" => match numbers.split_first() {
            Some((first, rest)) => rest.iter().fold(*first, |acc, n| acc - n),
            None => 0.0,
        },
        "/" => match numbers.split_first() {
            Some((first, rest)) => {
                let mut acc = *first;
                for n in rest {
                    // division by zero stops and keeps the running result
                    if *n == 0.0 {
                        break;
                    }
                    acc /= n;
                }
                acc
            }
            None => 0.0,
        },
        "min" => match numbers.iter().copied().reduce(f64::min) {
            Some(min) => min,
            None => return JsonValue::Null,
        },
        "max" => match numbers.iter().copied().reduce(f64::max) {
            Some(max) => max,
            None => return JsonValue::Null,
        },
        _ => return JsonValue::Null,
    };

    JsonValue::from(result)
}

fn compare(operator: &str, operand: &JsonValue, data: &JsonValue) -> bool {
    let items = operands(operand);
    let left = items
        .first()
        .map_or(JsonValue::Null, |item| evaluate(item, data));
    let right = items
        .get(1)
        .map_or(JsonValue::Null, |item| evaluate(item, data));

    match operator {
        "==" => loose_eq(&left, &right),
        "===" => left == right,
        "!=" => !loose_eq(&left, &right),
        "!==" => left != right,
        ">" => compare_values(&left, &right) == Ordering::Greater,
        ">=" => compare_values(&left, &right) != Ordering::Less,
        "<" => compare_values(&left, &right) == Ordering::Less,
        "<=" => compare_values(&left, &right) != Ordering::Greater,
        _ => false,
    }
}

fn logical(operator: &str, operand: &JsonValue, data: &JsonValue) -> bool {
    let values: Vec<JsonValue> = operands(operand)
        .into_iter()
        .map(|item| evaluate(item, data))
        .collect();

    match operator {
        "and" => values.iter().all(is_truthy),
        "or" => values.iter().any(is_truthy),
        "!" => !values.first().is_some_and(is_truthy),
        _ => false,
    }
}

fn conditional(operand: &JsonValue, data: &JsonValue) -> JsonValue {
    let items = operands(operand);
    let branch = |i: usize| {
        items
            .get(i)
            .map_or(JsonValue::Null, |item| evaluate(item, data))
    };

    if native_bool(&branch(0)) {
        branch(1)
    } else {
        branch(2)
    }
}

/// Numeric value of a number or numeric string; booleans are not numeric.
fn numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(_) | JsonValue::String(_) => path::as_number(value),
        _ => None,
    }
}

/// String form of a scalar; `true` is `"1"`, everything non-scalar is empty.
fn scalar_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Bool(true) => "1".to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        JsonValue::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn compare_values(left: &JsonValue, right: &JsonValue) -> Ordering {
    if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    scalar_string(left).cmp(&scalar_string(right))
}

/// Native truthiness: only `""` and `"0"` are false strings.
fn native_bool(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !(s.is_empty() || s == "0"),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    use JsonValue::{Array, Bool, Null, Number, Object, String};

    match (left, right) {
        (Null, Null) => true,
        (Bool(_), _) | (_, Bool(_)) => native_bool(left) == native_bool(right),
        (Null, String(s)) | (String(s), Null) => s.is_empty(),
        (Null, other) | (other, Null) => !native_bool(other),
        (Number(_), Number(_)) => numeric(left) == numeric(right),
        (Number(_), String(_)) | (String(_), Number(_)) => match (numeric(left), numeric(right)) {
            (Some(l), Some(r)) => l == r,
            _ => scalar_string(left) == scalar_string(right),
        },
        (String(l), String(r)) => match (numeric(left), numeric(right)) {
            (Some(ln), Some(rn)) => ln == rn,
            _ => l == r,
        },
        (Array(l), Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| loose_eq(a, b))
        }
        (Object(l), Object(r)) => {
            l.len() == r.len()
                && l
                    .iter()
                    .all(|(key, a)| r.get(key).is_some_and(|b| loose_eq(a, b)))
        }
        _ => false,
    }
}

/// Truthiness for `and`, `or` and `!`.
///
/// `"no"` and `"null"` count as false alongside the usual falsy strings.
#[must_use]
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::String(s) if numeric(value).is_none() => {
            let normalized = s.trim().to_lowercase();
            !matches!(
                normalized.as_str(),
                "" | "0" | "false" | "off" | "no" | "null"
            )
        }
        other => coerce_bool(other),
    }
}

/// Interprets an evaluation result as a condition outcome.
///
/// `false`, `0`, `null`, empty collections and the strings `""`, `"0"`,
/// `"false"`, `"off"` (trimmed, any case) are false; everything else is true.
#[must_use]
pub fn coerce_bool(value: &JsonValue) -> bool {
    if let Some(n) = numeric(value) {
        return n != 0.0;
    }
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::String(s) => {
            let normalized = s.trim().to_lowercase();
            !matches!(normalized.as_str(), "" | "0" | "false" | "off")
        }
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Number(_) => false,
    }
}

/// Builds the evaluation document: `base` entries overlaid by `overrides`.
#[must_use]
pub fn merge_data(base: &Map<String, JsonValue>, overrides: Map<String, JsonValue>) -> JsonValue {
    let mut data = base.clone();
    data.extend(overrides);
    JsonValue::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expression: JsonValue, data: JsonValue) -> JsonValue {
        JsonLogic.evaluate(&expression, &data)
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        assert_eq!(eval(json!(5), json!({})), json!(5));
        assert_eq!(eval(json!({"a": 1, "b": 2}), json!({})), json!({"a": 1, "b": 2}));
        assert_eq!(
            eval(json!([1, {"var": "x"}]), json!({"x": "y"})),
            json!([1, "y"])
        );
    }

    #[test]
    fn var_resolves_paths_with_defaults() {
        let data = json!({"trigger": {"value": 42}});
        assert_eq!(eval(json!({"var": "trigger.value"}), data.clone()), json!(42));
        assert_eq!(eval(json!({"var": ["missing", 7]}), data.clone()), json!(7));
        assert_eq!(eval(json!({"var": ""}), data.clone()), JsonValue::Null);
        assert_eq!(eval(json!({"var": [5, "d"]}), data), json!("d"));
    }

    #[test]
    fn arithmetic_coerces_operands() {
        assert_eq!(eval(json!({"+": [1, "2", true]}), json!({})), json!(4.0));
        assert_eq!(eval(json!({"-": [10, 3, 2]}), json!({})), json!(5.0));
        assert_eq!(eval(json!({"*": [2, "x"]}), json!({})), json!(0.0));
        assert_eq!(eval(json!({"/": [12, 3, 0, 2]}), json!({})), json!(4.0));
        assert_eq!(eval(json!({"max": [1, 9, 3]}), json!({})), json!(9.0));
        assert_eq!(eval(json!({"min": []}), json!({})), JsonValue::Null);
    }

    #[test]
    fn comparisons_use_numeric_strings() {
        let data = json!({"trigger": {"value": "50"}});
        assert_eq!(eval(json!({">": [{"var": "trigger.value"}, 40]}), data.clone()), json!(true));
        assert_eq!(eval(json!({"<=": [{"var": "trigger.value"}, 40]}), data), json!(false));
        assert_eq!(eval(json!({"<": ["apple", "banana"]}), json!({})), json!(true));
    }

    #[test]
    fn missing_variable_compares_as_empty_string() {
        assert_eq!(eval(json!({">": [{"var": "nope"}, 40]}), json!({})), json!(false));
        assert_eq!(eval(json!({"<": [{"var": "nope"}, "a"]}), json!({})), json!(true));
    }

    #[test]
    fn loose_and_strict_equality_differ() {
        assert_eq!(eval(json!({"==": [1, "1"]}), json!({})), json!(true));
        assert_eq!(eval(json!({"===": [1, "1"]}), json!({})), json!(false));
        assert_eq!(eval(json!({"==": [null, false]}), json!({})), json!(true));
        assert_eq!(eval(json!({"==": ["abc", 0]}), json!({})), json!(false));
        assert_eq!(eval(json!({"!=": ["on", true]}), json!({})), json!(false));
    }

    #[test]
    fn logical_operators_use_extended_truthiness() {
        assert_eq!(eval(json!({"and": [true, "yes"]}), json!({})), json!(true));
        assert_eq!(eval(json!({"and": [true, "no"]}), json!({})), json!(false));
        assert_eq!(eval(json!({"or": ["null", 0]}), json!({})), json!(false));
        assert_eq!(eval(json!({"!": ["OFF"]}), json!({})), json!(true));
    }

    #[test]
    fn if_picks_branch_with_native_truthiness() {
        assert_eq!(eval(json!({"if": [true, "a", "b"]}), json!({})), json!("a"));
        // "false" is a non-empty string, so it selects the first branch
        assert_eq!(eval(json!({"if": ["false", "a", "b"]}), json!({})), json!("a"));
        assert_eq!(eval(json!({"if": ["0", "a", "b"]}), json!({})), json!("b"));
        assert_eq!(eval(json!({"if": [false, "a"]}), json!({})), JsonValue::Null);
    }

    #[test]
    fn unknown_operator_returns_operand() {
        assert_eq!(eval(json!({"regex": ["a", "b"]}), json!({})), json!(["a", "b"]));
    }

    #[test]
    fn coerce_bool_rules() {
        let falsy = [
            json!(false),
            json!(0),
            json!(0.0),
            json!("false"),
            json!(""),
            json!("0"),
            json!(" OFF "),
            json!(null),
            json!([]),
            json!({}),
        ];
        for falsy in falsy {
            assert!(!coerce_bool(&falsy), "{falsy} should be false");
        }
        let truthy = [
            json!(true),
            json!(1),
            json!(-0.5),
            json!("on"),
            json!("no"),
            json!([0]),
            json!({"a": 1}),
        ];
        for truthy in truthy {
            assert!(coerce_bool(&truthy), "{truthy} should be true");
        }
    }

    #[test]
    fn merge_data_overrides_payload_keys() {
        let payload = json!({"trigger": "shadowed", "voltage": 230})
            .as_object()
            .cloned()
            .expect("object");
        let mut overrides = Map::new();
        overrides.insert("trigger".to_string(), json!({"value": 1}));
        let data = merge_data(&payload, overrides);
        assert_eq!(data["trigger"]["value"], json!(1));
        assert_eq!(data["voltage"], json!(230));
    }
}
