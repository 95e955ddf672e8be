//! Integration tests for parsing and evaluating binding expressions.

use bindery_expression::{EvalError, ExpressionError, ParseErrorKind, Parser, Value};
use proptest::prelude::*;
use serde_json::json;
use std::rc::Rc;

fn eval(expression: &str, data: serde_json::Value) -> Value {
    let parser = Parser::new();
    let parsed = parser
        .parse(expression)
        .unwrap_or_else(|e| panic!("parse({expression}) failed: {e}"));
    parsed
        .evaluate(&Value::from(data), &Value::Undefined)
        .unwrap_or_else(|e| panic!("evaluate({expression}) failed: {e}"))
}

fn check(expression: &str, data: serde_json::Value, expected: impl Into<Value>) {
    let expected = expected.into();
    let result = eval(expression, data);
    assert_eq!(result, expected, "expression: {expression}");
}

fn parse_and_run(parser: &Parser, text: &str, context: &Value) -> Result<Value, ExpressionError> {
    let parsed = parser.parse(text)?;
    Ok(parsed.evaluate(context, &Value::Undefined)?)
}

// ----------------------------------------------------------------- Arithmetic

#[test]
fn test_precedence() {
    check("2 + 3 * 4", json!({}), 14);
    check("(2 + 3) * 4", json!({}), 20);
    check("10 - 4 - 3", json!({}), 3);
    check("2 * 3 % 4", json!({}), 2);
    check("-2 * 3", json!({}), -6);
    check("1 + 2 < 4 == true", json!({}), true);
}

#[test]
fn test_string_concatenation() {
    check("'a' + 'b' + 1", json!({}), "ab1");
    check("1 + 2 + 'x'", json!({}), "3x");
    check("first + ' ' + last", json!({"first": "Ada", "last": "Lovelace"}), "Ada Lovelace");
}

#[test]
fn test_division_edge_cases() {
    let result = eval("1 / 0", json!({}));
    assert_eq!(result.as_f64(), Some(f64::INFINITY));
    let result = eval("missing * 2", json!({}));
    assert!(result.as_f64().is_some_and(f64::is_nan));
}

// ----------------------------------------------------------------- Equality

#[test]
fn test_strict_and_loose_equality() {
    check("name === 'x'", json!({"name": "x"}), true);
    check("name === 'x'", json!({"name": "y"}), false);
    check("count == '3'", json!({"count": 3}), true);
    check("count === '3'", json!({"count": 3}), false);
    check("missing == null", json!({}), true);
    check("missing === null", json!({}), false);
    check("a != b", json!({"a": 1, "b": 2}), true);
}

#[test]
fn test_relational() {
    check("'a' < 'b'", json!({}), true);
    check("'10' < '9'", json!({}), true);
    check("'10' < 9", json!({}), false);
    check("age >= 18", json!({"age": 18}), true);
}

// ----------------------------------------------------------------- Logic

#[test]
fn test_ternary() {
    check("a ? 1 : 2", json!({"a": true}), 1);
    check("a ? 1 : 2", json!({"a": false}), 2);
    check("a ? 'x' : b ? 'y' : 'z'", json!({"a": false, "b": true}), "y");
    check("n > 0 ? 'pos' : n < 0 ? 'neg' : 'zero'", json!({"n": 0}), "zero");
}

#[test]
fn test_logical_operators() {
    check("a && b", json!({"a": 1, "b": 2}), 2);
    check("a || b", json!({"a": 0, "b": "fallback"}), "fallback");
    check("!a", json!({"a": []}), false);
    check("!!name", json!({"name": ""}), false);
}

// ----------------------------------------------------------------- Paths

#[test]
fn test_defensive_traversal() {
    assert!(eval("a.b.c", json!({})).is_undefined());
    assert!(eval("a.b.c", json!({"a": 5})).is_undefined());
    assert!(eval("a[k].c", json!({"a": {}})).is_undefined());
}

#[test]
fn test_indexers() {
    let data = json!({"items": [{"name": "a"}, {"name": "b"}], "i": 1, "key": "name"});
    check("items[0].name", data.clone(), "a");
    check("items[i].name", data.clone(), "b");
    check("items[i][key]", data.clone(), "b");
    check("items.1.name", data, "b");
}

#[test]
fn test_length() {
    check("items.length + 1", json!({"items": [1, 2, 3]}), 4);
    check("name.length", json!({"name": "four"}), 4);
}

#[test]
fn test_literals() {
    let value = eval("[a, {b: a + 1, 'c d': [ ]}]", json!({"a": 1}));
    assert_eq!(value.to_json(), json!([1, {"b": 2, "c d": []}]));
    let first = eval("{}", json!({}));
    assert!(first.is_object());
}

// ----------------------------------------------------------------- Calls

#[test]
fn test_function_call_with_args() {
    let parser = Parser::new();
    let context = Value::object();
    context.as_object().unwrap().set(
        "foo",
        Value::function(|_, args| {
            let sum: f64 = args.iter().filter_map(Value::as_f64).sum();
            Ok(Value::Number(sum))
        }),
    );
    let result = parser
        .parse("foo(1,2,3)")
        .unwrap()
        .evaluate(&context, &Value::Undefined)
        .unwrap();
    assert_eq!(result, Value::from(6));
}

#[test]
fn test_member_call_receives_this() {
    let parser = Parser::new();
    let user = Value::from(json!({"name": "Ada"}));
    user.as_object().unwrap().set(
        "greet",
        Value::function(|this, args| {
            let greeting = args.first().and_then(Value::as_str).unwrap_or("hello");
            Ok(Value::string(format!("{greeting}, {}", this.get("name"))))
        }),
    );
    let context = Value::object();
    context.as_object().unwrap().set("user", user);
    let result = parser
        .parse("user.greet('hi')")
        .unwrap()
        .evaluate(&context, &Value::Undefined)
        .unwrap();
    assert_eq!(result, Value::from("hi, Ada"));
}

#[test]
fn test_builtin_methods() {
    check("name.toUpperCase()", json!({"name": "ada"}), "ADA");
    check("items.indexOf(3)", json!({"items": [1, 2, 3]}), 2);
    check("items.join('-')", json!({"items": [1, 2, 3]}), "1-2-3");
    check("items.slice(1).length", json!({"items": [1, 2, 3]}), 2);
}

#[test]
fn test_mutating_call_changes_context() {
    let parser = Parser::new();
    let context = Value::from(json!({"items": [1, 2]}));
    parser
        .parse("items.push(3, 4)")
        .unwrap()
        .evaluate(&context, &Value::Undefined)
        .unwrap();
    assert_eq!(context.get("items").to_json(), json!([1, 2, 3, 4]));
}

#[test]
fn test_calling_non_function_fails() {
    let parser = Parser::new();
    let context = Value::from(json!({"a": {"b": 1}}));
    let parsed = parser.parse("a.b()").unwrap();
    let err = parsed.evaluate(&context, &Value::Undefined).unwrap_err();
    assert_eq!(err, EvalError::NotCallable { callee: "a.b".into() });

    let err = parser.parse("missing(1)").unwrap().evaluate(&context, &Value::Undefined).unwrap_err();
    assert_eq!(err, EvalError::NotCallable { callee: "missing".into() });

    // The parsed expression stays usable.
    let ok = Value::object();
    ok.as_object().unwrap().set("a", Value::object());
    ok.get("a")
        .as_object()
        .unwrap()
        .set("b", Value::function(|_, _| Ok(Value::from(1))));
    assert_eq!(parsed.evaluate(&ok, &Value::Undefined).unwrap(), Value::from(1));
}

#[test]
fn test_native_errors_propagate() {
    let parser = Parser::new();
    let context = Value::object();
    context.as_object().unwrap().set(
        "fail",
        Value::function(|_, _| Err(EvalError::Thrown("nope".into()))),
    );
    let err = parser.parse("1 + fail()").unwrap().evaluate(&context, &Value::Undefined).unwrap_err();
    assert_eq!(err, EvalError::Thrown("nope".into()));
}

// ----------------------------------------------------------------- Aliases

#[test]
fn test_alias_resolution() {
    let parser = Parser::new();
    let parsed = parser.parse("@item.name + '/' + title").unwrap();
    assert_eq!(parsed.aliases(), ["item"]);
    assert_eq!(parsed.identifiers(), ["title"]);
    let context = Value::from(json!({"title": "t", "item": {"name": "shadowed"}}));
    let aliases = Value::from(json!({"item": {"name": "n"}}));
    assert_eq!(parsed.evaluate(&context, &aliases).unwrap(), Value::from("n/t"));
    assert_eq!(
        parsed.evaluate(&context, &Value::Undefined).unwrap(),
        Value::from("undefined/t")
    );
}

#[test]
fn test_alias_separation() {
    let parser = Parser::new();
    let parsed = parser.parse("@x.y + z").unwrap();
    assert_eq!(parsed.aliases(), ["x"]);
    assert_eq!(parsed.identifiers(), ["z"]);
}

// ----------------------------------------------------------------- Parser

#[test]
fn test_identifiers() {
    let parser = Parser::new();
    assert_eq!(parser.parse("a.b + a.c").unwrap().identifiers(), ["a.b", "a.c"]);
    assert_eq!(
        parser.parse("user.age > 18 && user.name").unwrap().identifiers(),
        ["user.age", "user.name"]
    );
    assert_eq!(
        parser.parse("list[sel].label").unwrap().identifiers(),
        ["list", "sel"]
    );
}

#[test]
fn test_parse_cache_identity() {
    let parser = Parser::new();
    let a = parser.parse("x * 2").unwrap();
    let b = parser.parse("x * 2").unwrap();
    assert!(Rc::ptr_eq(&a, &b));
}

#[test]
fn test_evaluation_is_live() {
    let parser = Parser::new();
    let parsed = parser.parse("x * 2").unwrap();
    let first = Value::from(json!({"x": 1}));
    let second = Value::from(json!({"x": 5}));
    assert_eq!(parsed.evaluate(&first, &Value::Undefined).unwrap(), Value::from(2));
    assert_eq!(parsed.evaluate(&second, &Value::Undefined).unwrap(), Value::from(10));
    first.as_object().unwrap().set("x", 3);
    assert_eq!(parsed.evaluate(&first, &Value::Undefined).unwrap(), Value::from(6));
}

#[test]
fn test_broken_expression_not_cached() {
    let parser = Parser::new();
    let err = parser.parse("foo(").unwrap_err();
    assert_eq!(err.expression, "foo(");
    assert!(matches!(err.kind, ParseErrorKind::Unbalanced('(')));
    assert!(!parser.is_cached("foo("));
    assert_eq!(parser.cache_len(), 0);

    let context = Value::object();
    context
        .as_object()
        .unwrap()
        .set("foo", Value::function(|_, _| Ok(Value::from("ok"))));
    assert_eq!(
        parse_and_run(&parser, "foo()", &context).unwrap(),
        Value::from("ok")
    );
}

#[test]
fn test_expression_error_wraps_both_failures() {
    let parser = Parser::new();
    let context = Value::object();
    assert!(matches!(
        parse_and_run(&parser, "1 +", &context),
        Err(ExpressionError::Parse(_))
    ));
    assert!(matches!(
        parse_and_run(&parser, "nothing()", &context),
        Err(ExpressionError::Eval(EvalError::NotCallable { .. }))
    ));
}

#[test]
fn test_parse_error_messages() {
    let parser = Parser::new();
    let err = parser.parse("a +* b").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::MissingOperand("*".into()));
    assert!(err.to_string().contains("a +* b"), "got: {err}");
    let err = parser.parse("'open").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
    let err = parser.parse("3d").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::InvalidIdentifier("3d".into()));
}

#[test]
fn test_nesting_depth_is_capped() {
    let parser = Parser::new();
    let chain = vec!["x"; 1000].join(" + ");
    let err = parser.parse(&chain).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::TooDeep(bindery_expression::MAX_DEPTH));
    assert_eq!(err.expression, chain);
    assert!(!parser.is_cached(&chain));

    let negations = format!("{}a", "!".repeat(1000));
    let err = parser.parse(&negations).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::TooDeep(_)));

    let arrays = format!("{}1{}", "[".repeat(1000), "]".repeat(1000));
    assert!(matches!(
        parser.parse(&arrays).unwrap_err().kind,
        ParseErrorKind::TooDeep(_)
    ));

    let chain = vec!["x"; 100].join(" + ");
    check(&chain, json!({"x": 2}), 200);
}

#[test]
fn test_number_to_string_uses_exponent_outside_plain_range() {
    check("'' + 1e20", json!({}), "100000000000000000000");
    check("'' + 1e21", json!({}), "1e+21");
    check("'' + big", json!({"big": 1.5e300}), "1.5e+300");
    check("'' + 0.000001", json!({}), "0.000001");
    check("'' + 1e-7", json!({}), "1e-7");
}

// ----------------------------------------------------------------- Properties

proptest! {
    #[test]
    fn prop_multiplication_binds_tighter(a in 0i32..1000, b in 0i32..1000, c in 0i32..1000) {
        let expected = (a + b * c) as f64;
        let result = eval(&format!("{a} + {b} * {c}"), json!({}));
        prop_assert_eq!(result.as_f64(), Some(expected));
    }

    #[test]
    fn prop_subtraction_is_left_associative(a in 0i32..1000, b in 0i32..1000, c in 0i32..1000) {
        let expected = (a - b - c) as f64;
        let result = eval(&format!("{a} - {b} - {c}"), json!({}));
        prop_assert_eq!(result.as_f64(), Some(expected));
    }

    #[test]
    fn prop_identifiers_round_trip(
        paths in prop::collection::vec(
            prop::collection::vec("[a-z][a-z0-9_]{0,5}", 1..4).prop_map(|s| s.join(".")),
            1..6,
        )
    ) {
        prop_assume!(paths.iter().all(|p| {
            let root = p.split('.').next().unwrap_or_default();
            !matches!(root, "true" | "false" | "null" | "undefined")
        }));
        let parser = Parser::new();
        let expression = paths.join(" + ");
        let parsed = parser.parse(&expression).unwrap();
        let mut expected: Vec<String> = Vec::new();
        for path in &paths {
            if !expected.contains(path) {
                expected.push(path.clone());
            }
        }
        prop_assert_eq!(parsed.identifiers(), expected.as_slice());
    }
}
