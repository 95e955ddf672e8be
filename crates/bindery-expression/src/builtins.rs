//! Built-in string and array methods reachable from expressions.
//!
//! Methods are looked up by property name and receive their target as `this`,
//! so `items.push(x)` mutates (and notifies observers of) the very array it
//! was read from.

use crate::error::EvalError;
use crate::util::{join, strict_equals, to_int32, to_js_string, to_number};
use crate::value::{ArrayRef, Value};
use std::cmp::Ordering;

type Method = fn(&Value, &[Value]) -> Result<Value, EvalError>;

pub(crate) fn string_method(name: &str) -> Option<Value> {
    let method: Method = match name {
        "toUpperCase" => |this, _| Ok(Value::string(to_js_string(this).to_uppercase())),
        "toLowerCase" => |this, _| Ok(Value::string(to_js_string(this).to_lowercase())),
        "trim" => |this, _| Ok(Value::string(to_js_string(this).trim())),
        "indexOf" => string_index_of,
        "charAt" => string_char_at,
        "substring" => string_substring,
        _ => return None,
    };
    Some(Value::function(method))
}

pub(crate) fn array_method(name: &str) -> Option<Value> {
    let method: Method = match name {
        "push" => |this, args| Ok(Value::from(receiver(this, "push")?.push(args.to_vec()))),
        "pop" => |this, _| Ok(receiver(this, "pop")?.pop()),
        "shift" => |this, _| Ok(receiver(this, "shift")?.shift()),
        "unshift" => |this, args| Ok(Value::from(receiver(this, "unshift")?.unshift(args.to_vec()))),
        "splice" => array_splice,
        "sort" => array_sort,
        "reverse" => |this, _| {
            receiver(this, "reverse")?.reverse();
            Ok(this.clone())
        },
        "indexOf" => array_index_of,
        "join" => |this, args| {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => to_js_string(sep),
            };
            Ok(Value::string(join(receiver(this, "join")?, &separator)))
        },
        "slice" => array_slice,
        _ => return None,
    };
    Some(Value::function(method))
}

fn receiver<'a>(this: &'a Value, method: &str) -> Result<&'a ArrayRef, EvalError> {
    this.as_array().ok_or_else(|| EvalError::InvalidReceiver {
        method: method.to_string(),
    })
}

/// Resolves a relative index argument (`slice`, `splice`, `substring`-like).
fn relative_index(arg: Option<&Value>, len: usize, default: i64) -> i64 {
    let n = match arg {
        None | Some(Value::Undefined) => return default,
        Some(v) => to_number(v),
    };
    let n = if n.is_nan() { 0 } else { n.trunc() as i64 };
    let len = len as i64;
    if n < 0 {
        (len + n).max(0)
    } else {
        n.min(len)
    }
}

fn array_splice(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let array = receiver(this, "splice")?;
    let start = args.first().map(to_number).unwrap_or(0.0);
    let start = if start.is_nan() { 0 } else { start.trunc() as i64 };
    let delete_count = args.get(1).map(|v| {
        let n = to_number(v);
        if n.is_nan() {
            0
        } else {
            n.trunc() as i64
        }
    });
    let insert = args.iter().skip(2).cloned().collect();
    Ok(Value::array(array.splice(start, delete_count, insert)))
}

fn array_sort(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let array = receiver(this, "sort")?;
    match args.first() {
        None | Some(Value::Undefined) => array.sort(None),
        Some(Value::Function(compare)) => {
            let mut failure = None;
            let mut cmp = |a: &Value, b: &Value| {
                if failure.is_some() {
                    return Ordering::Equal;
                }
                match compare.call(&Value::Undefined, &[a.clone(), b.clone()]) {
                    Ok(result) => {
                        let n = to_number(&result);
                        if n < 0.0 {
                            Ordering::Less
                        } else if n > 0.0 {
                            Ordering::Greater
                        } else {
                            Ordering::Equal
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        Ordering::Equal
                    }
                }
            };
            array.sort(Some(&mut cmp));
            if let Some(e) = failure {
                return Err(e);
            }
        }
        Some(_) => {
            return Err(EvalError::NotCallable {
                callee: "sort comparator".to_string(),
            })
        }
    }
    Ok(this.clone())
}

fn array_index_of(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let array = receiver(this, "indexOf")?;
    let needle = args.first().cloned().unwrap_or_default();
    let found = array
        .to_vec()
        .iter()
        .position(|item| strict_equals(item, &needle))
        .map(|i| i as f64)
        .unwrap_or(-1.0);
    Ok(Value::Number(found))
}

fn array_slice(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let items = receiver(this, "slice")?.to_vec();
    let len = items.len();
    let start = relative_index(args.first(), len, 0) as usize;
    let end = relative_index(args.get(1), len, len as i64) as usize;
    if start >= end {
        return Ok(Value::array(Vec::new()));
    }
    Ok(Value::array(items[start..end].to_vec()))
}

fn string_index_of(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let haystack: Vec<char> = to_js_string(this).chars().collect();
    let needle: Vec<char> = args
        .first()
        .map(to_js_string)
        .unwrap_or_else(|| "undefined".to_string())
        .chars()
        .collect();
    if needle.is_empty() {
        return Ok(Value::Number(0.0));
    }
    let found = haystack
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map(|i| i as f64)
        .unwrap_or(-1.0);
    Ok(Value::Number(found))
}

fn string_char_at(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let index = args.first().map(to_number).unwrap_or(0.0);
    let index = to_int32(index);
    if index < 0 {
        return Ok(Value::string(""));
    }
    let ch = to_js_string(this)
        .chars()
        .nth(index as usize)
        .map(|c| c.to_string())
        .unwrap_or_default();
    Ok(Value::string(ch))
}

fn string_substring(this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let chars: Vec<char> = to_js_string(this).chars().collect();
    let len = chars.len() as i64;
    let clamp = |v: Option<&Value>, default: i64| match v {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = to_number(v);
            if n.is_nan() {
                0
            } else {
                (n.trunc() as i64).clamp(0, len)
            }
        }
    };
    let a = clamp(args.first(), 0);
    let b = clamp(args.get(1), len);
    let (from, to) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::string(
        chars[from as usize..to as usize].iter().collect::<String>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(target: &Value, name: &str, args: &[Value]) -> Value {
        let f = target.get(name);
        f.as_function()
            .unwrap_or_else(|| panic!("{name} is not a method"))
            .call(target, args)
            .unwrap()
    }

    #[test]
    fn test_string_methods() {
        let s = Value::from("  Hello ");
        assert_eq!(call(&s, "trim", &[]), Value::from("Hello"));
        assert_eq!(call(&s, "toUpperCase", &[]), Value::from("  HELLO "));
        assert_eq!(call(&s, "indexOf", &[Value::from("l")]), Value::from(4));
        assert_eq!(call(&s, "charAt", &[Value::from(2)]), Value::from("H"));
        assert_eq!(call(&Value::from("abcdef"), "substring", &[Value::from(4), Value::from(1)]), Value::from("bcd"));
    }

    #[test]
    fn test_array_methods() {
        let arr = Value::from(json!([3, 1, 2]));
        assert_eq!(call(&arr, "push", &[Value::from(0)]), Value::from(4));
        assert_eq!(call(&arr, "indexOf", &[Value::from(2)]), Value::from(2));
        assert_eq!(call(&arr, "join", &[Value::from("-")]), Value::from("3-1-2-0"));
        assert_eq!(call(&arr, "slice", &[Value::from(-2)]).to_json(), json!([2, 0]));
        call(&arr, "sort", &[]);
        assert_eq!(arr.to_json(), json!([0, 1, 2, 3]));
        let descending = Value::function(|_, args| {
            Ok(Value::Number(to_number(&args[1]) - to_number(&args[0])))
        });
        call(&arr, "sort", &[descending]);
        assert_eq!(arr.to_json(), json!([3, 2, 1, 0]));
        assert_eq!(call(&arr, "splice", &[Value::from(1), Value::from(2)]).to_json(), json!([2, 1]));
        assert_eq!(arr.to_json(), json!([3, 0]));
    }

    #[test]
    fn test_sort_comparator_error_propagates() {
        let arr = Value::from(json!([2, 1]));
        let failing = Value::function(|_, _| Err(EvalError::Thrown("boom".into())));
        let sort = arr.get("sort");
        let err = sort.as_function().unwrap().call(&arr, &[failing]).unwrap_err();
        assert_eq!(err, EvalError::Thrown("boom".into()));
    }

    #[test]
    fn test_array_method_on_wrong_receiver() {
        let push = Value::from(json!([])).get("push");
        let err = push.as_function().unwrap().call(&Value::Null, &[]).unwrap_err();
        assert!(matches!(err, EvalError::InvalidReceiver { .. }));
    }
}
