//! JavaScript value semantics: conversions, equality, comparison and merging.

use crate::value::{ArrayRef, ObjectRef, Value};
use std::cmp::Ordering;

// ----------------------------------------------------------------- Type helpers

/// Returns the `typeof` name of a value.
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Function(_) => "function",
    }
}

/// JavaScript truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
    }
}

// ----------------------------------------------------------------- Conversions

/// `ToNumber`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Array(_) | Value::Object(_) | Value::Function(_) => {
            to_number(&to_primitive(value))
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust accepts "inf"/"nan" spellings that JavaScript rejects.
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// `ToInt32`: wrapping, not saturating.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 as u32) as i32
}

/// `ToPrimitive` with the default (string-first for containers) hint.
pub fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) => {
            Value::string(to_js_string(value))
        }
        other => other.clone(),
    }
}

/// `ToString`.
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.to_string(),
        Value::Array(a) => join(a, ","),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(_) => "function () { [native code] }".to_string(),
    }
}

/// `Array.prototype.join`: `null` and `undefined` become empty strings.
pub fn join(array: &ArrayRef, separator: &str) -> String {
    array
        .to_vec()
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                to_js_string(item)
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Formats a number the way JavaScript's `Number.prototype.toString` does:
/// shortest round-trip digits, exponent form below `1e-6` and from `1e21`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        exponent_form(n)
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// `1e21` → `1e+21`, `1.5e-7` → `1.5e-7`.
fn exponent_form(n: f64) -> String {
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

/// Turns an evaluated index into a property key (`1.0` → `"1"`).
pub fn to_property_key(value: &Value) -> String {
    to_js_string(value)
}

// -------------------------------------------------------------- Equality

/// `===`: identity for objects, arrays and functions; `NaN` is never equal.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Function(x), Value::Function(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// `==`: abstract equality with type coercion.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(x), Value::String(_)) => *x == to_number(b),
        (Value::String(_), Value::Number(y)) => to_number(a) == *y,
        (Value::Bool(_), _) => loose_equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(to_number(b))),
        (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_) | Value::Function(_)) => {
            loose_equals(a, &to_primitive(b))
        }
        (Value::Array(_) | Value::Object(_) | Value::Function(_), Value::Number(_) | Value::String(_)) => {
            loose_equals(&to_primitive(a), b)
        }
        _ => strict_equals(a, b),
    }
}

// -------------------------------------------------------------- Comparison

/// Abstract relational comparison `a < b`; `None` when either side is `NaN`.
fn less_than(a: &Value, b: &Value) -> Option<bool> {
    let pa = to_primitive(a);
    let pb = to_primitive(b);
    if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
        return Some(x < y);
    }
    let x = to_number(&pa);
    let y = to_number(&pb);
    if x.is_nan() || y.is_nan() {
        None
    } else {
        Some(x < y)
    }
}

pub fn js_lt(a: &Value, b: &Value) -> bool {
    less_than(a, b).unwrap_or(false)
}

pub fn js_gt(a: &Value, b: &Value) -> bool {
    less_than(b, a).unwrap_or(false)
}

pub fn js_lte(a: &Value, b: &Value) -> bool {
    less_than(b, a).map(|gt| !gt).unwrap_or(false)
}

pub fn js_gte(a: &Value, b: &Value) -> bool {
    less_than(a, b).map(|lt| !lt).unwrap_or(false)
}

/// Ordering used by `Array.prototype.sort` without a comparator.
pub fn default_sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => to_js_string(a).cmp(&to_js_string(b)),
    }
}

// -------------------------------------------------------------- Arithmetic

/// `+`: concatenation when either primitive side is a string.
pub fn add(a: &Value, b: &Value) -> Value {
    let pa = to_primitive(a);
    let pb = to_primitive(b);
    if pa.is_string() || pb.is_string() {
        let mut s = to_js_string(&pa);
        s.push_str(&to_js_string(&pb));
        return Value::string(s);
    }
    Value::Number(to_number(&pa) + to_number(&pb))
}

// -------------------------------------------------------------- Merging

/// Copies the own properties of every source onto `target`, left to right.
///
/// With `deep`, nested objects and arrays are merged into fresh containers
/// instead of being shared by reference. Writes go through the node API, so
/// intercepted properties on `target` notify as usual.
pub fn extend(deep: bool, target: &Value, sources: &[Value]) {
    for source in sources {
        match (target, source) {
            (Value::Object(t), Value::Object(s)) => {
                for (key, value) in s.entries() {
                    let merged = merge_value(deep, &t.get(&key), &value);
                    t.set(&key, merged);
                }
            }
            (Value::Array(t), Value::Array(s)) => {
                for (index, value) in s.to_vec().into_iter().enumerate() {
                    let merged = merge_value(deep, &t.get(index), &value);
                    t.set(index, merged);
                }
            }
            (Value::Object(t), Value::Array(s)) => {
                for (index, value) in s.to_vec().into_iter().enumerate() {
                    let key = index.to_string();
                    let merged = merge_value(deep, &t.get(&key), &value);
                    t.set(&key, merged);
                }
            }
            _ => {}
        }
    }
}

fn merge_value(deep: bool, existing: &Value, incoming: &Value) -> Value {
    if !deep {
        return incoming.clone();
    }
    match incoming {
        Value::Object(_) => {
            let target = match existing {
                Value::Object(_) => existing.clone(),
                _ => Value::Object(ObjectRef::new()),
            };
            extend(true, &target, std::slice::from_ref(incoming));
            target
        }
        Value::Array(_) => {
            let target = match existing {
                Value::Array(_) => existing.clone(),
                _ => Value::array(Vec::new()),
            };
            extend(true, &target, std::slice::from_ref(incoming));
            target
        }
        other => other.clone(),
    }
}

/// Deep copy of a value graph; functions are shared.
pub fn deep_clone(value: &Value) -> Value {
    match value {
        Value::Object(_) => {
            let copy = Value::object();
            extend(true, &copy, std::slice::from_ref(value));
            copy
        }
        Value::Array(_) => {
            let copy = Value::array(Vec::new());
            extend(true, &copy, std::slice::from_ref(value));
            copy
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!truthy(&Value::from(0)));
        assert!(!truthy(&Value::Number(f64::NAN)));
        assert!(!truthy(&Value::from("")));
        assert!(truthy(&Value::from("0")));
        assert!(truthy(&Value::from(json!([]))));
        assert!(truthy(&Value::from(json!({}))));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&Value::from(" 12 ")), 12.0);
        assert_eq!(to_number(&Value::from("")), 0.0);
        assert_eq!(to_number(&Value::from("0x1f")), 31.0);
        assert!(to_number(&Value::from("12px")).is_nan());
        assert!(to_number(&Value::from("inf")).is_nan());
        assert_eq!(to_number(&Value::from("1e3")), 1000.0);
        assert_eq!(to_number(&Value::from(json!([5]))), 5.0);
        assert_eq!(to_number(&Value::from(json!([]))), 0.0);
        assert!(to_number(&Value::Undefined).is_nan());
        assert_eq!(to_number(&Value::Null), 0.0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-1.2345e22), "-1.2345e+22");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
    }

    #[test]
    fn test_to_js_string_containers() {
        assert_eq!(to_js_string(&Value::from(json!([1, null, "a"]))), "1,,a");
        assert_eq!(to_js_string(&Value::from(json!({"a": 1}))), "[object Object]");
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::from(1), &Value::from("1")));
        assert!(loose_equals(&Value::from(true), &Value::from(1)));
        assert!(loose_equals(&Value::from("1"), &Value::from(true)));
        assert!(loose_equals(&Value::from(json!([2])), &Value::from(2)));
        assert!(!loose_equals(&Value::Null, &Value::from(0)));
        assert!(!loose_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_strict_equality() {
        assert!(!strict_equals(&Value::from(1), &Value::from("1")));
        assert!(strict_equals(&Value::from("a"), &Value::from("a")));
        let obj = Value::object();
        assert!(strict_equals(&obj, &obj.clone()));
        assert!(!strict_equals(&obj, &Value::object()));
    }

    #[test]
    fn test_relational() {
        assert!(js_lt(&Value::from(2), &Value::from(10)));
        assert!(!js_lt(&Value::from("2"), &Value::from("10")));
        assert!(js_lt(&Value::from("2"), &Value::from(10)));
        assert!(!js_lte(&Value::Undefined, &Value::from(0)));
        assert!(js_gte(&Value::Null, &Value::from(0)));
    }

    #[test]
    fn test_add() {
        assert_eq!(add(&Value::from(1), &Value::from(2)), Value::from(3));
        assert_eq!(add(&Value::from("a"), &Value::from(1)), Value::from("a1"));
        assert_eq!(add(&Value::from(1), &Value::Null), Value::from(1));
        assert_eq!(add(&Value::from(json!([1, 2])), &Value::from(3)), Value::from("1,23"));
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4294967297.0), 1);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn test_extend_shallow_shares() {
        let inner = Value::from(json!({"x": 1}));
        let source = Value::object();
        source.as_object().unwrap().set("inner", inner.clone());
        let target = Value::from(json!({"keep": true}));
        extend(false, &target, &[source]);
        assert_eq!(target.get("inner"), inner);
        assert_eq!(target.get("keep"), Value::from(true));
    }

    #[test]
    fn test_extend_deep_copies() {
        let source = Value::from(json!({"a": {"b": 1, "list": [1, 2]}}));
        let target = Value::from(json!({"a": {"c": 2}}));
        extend(true, &target, &[source.clone()]);
        assert_eq!(target.to_json(), json!({"a": {"c": 2, "b": 1, "list": [1, 2]}}));
        assert_ne!(target.get_path(&["a", "list"]), source.get_path(&["a", "list"]));
    }

    #[test]
    fn test_deep_clone() {
        let original = Value::from(json!({"a": [{"b": 1}]}));
        let copy = deep_clone(&original);
        assert_eq!(copy.to_json(), original.to_json());
        assert_ne!(copy.get("a"), original.get("a"));
    }
}
