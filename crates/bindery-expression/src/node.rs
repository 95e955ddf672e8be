//! Evaluator tree and the postfix pass that builds it.

use crate::error::{EvalError, ParseError, ParseErrorKind};
use crate::token::{BinaryOp, Token, UnaryOp};
use crate::util::{
    add, js_gt, js_gte, js_lt, js_lte, loose_equals, strict_equals, to_int32, to_js_string,
    to_number, to_property_key, truthy,
};
use crate::value::{ObjectRef, Value};
use bindery_util::join_identifier;
use indexmap::IndexSet;

#[derive(Debug)]
pub(crate) enum Node {
    Literal(Value),
    Variable(String),
    Alias(String),
    Member {
        target: Box<Node>,
        name: String,
    },
    Index {
        target: Box<Node>,
        key: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Array(Vec<Node>),
    Object(Vec<(Node, Node)>),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Ternary {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
}

/// What an evaluation resolves names against.
pub(crate) struct Scope<'a> {
    pub context: &'a Value,
    pub aliases: &'a Value,
}

impl Node {
    pub(crate) fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, EvalError> {
        match self {
            Node::Literal(value) => Ok(value.clone()),
            Node::Variable(name) => Ok(scope.context.get(name)),
            Node::Alias(name) => Ok(scope.aliases.get(name)),
            Node::Member { target, name } => Ok(target.evaluate(scope)?.get(name)),
            Node::Index { target, key } => {
                let target = target.evaluate(scope)?;
                let key = key.evaluate(scope)?;
                Ok(target.get(&to_property_key(&key)))
            }
            Node::Call { callee, args } => call(callee, args, scope),
            Node::Array(items) => {
                let values = evaluate_all(items, scope)?;
                Ok(Value::array(values))
            }
            Node::Object(entries) => {
                let object = ObjectRef::new();
                for (key, value) in entries {
                    let key = to_property_key(&key.evaluate(scope)?);
                    object.set(&key, value.evaluate(scope)?);
                }
                Ok(Value::Object(object))
            }
            Node::Unary { op, operand } => {
                let value = operand.evaluate(scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!truthy(&value)),
                    UnaryOp::Neg => Value::Number(-to_number(&value)),
                    UnaryOp::Plus => Value::Number(to_number(&value)),
                })
            }
            Node::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let left = left.evaluate(scope)?;
                if truthy(&left) {
                    right.evaluate(scope)
                } else {
                    Ok(left)
                }
            }
            Node::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let left = left.evaluate(scope)?;
                if truthy(&left) {
                    Ok(left)
                } else {
                    right.evaluate(scope)
                }
            }
            Node::Binary { op, left, right } => {
                let left = left.evaluate(scope)?;
                let right = right.evaluate(scope)?;
                Ok(binary(*op, &left, &right))
            }
            Node::Ternary {
                test,
                consequent,
                alternate,
            } => {
                if truthy(&test.evaluate(scope)?) {
                    consequent.evaluate(scope)
                } else {
                    alternate.evaluate(scope)
                }
            }
        }
    }

    /// Source-like rendering of a callee, for error messages.
    fn describe(&self) -> String {
        match self {
            Node::Variable(name) => name.clone(),
            Node::Alias(name) => format!("@{name}"),
            Node::Member { target, name } => format!("{}.{}", target.describe(), name),
            Node::Index { target, key } => match key.as_ref() {
                Node::Literal(k) => format!("{}[{}]", target.describe(), to_js_string(k)),
                _ => format!("{}[...]", target.describe()),
            },
            Node::Literal(value) => to_js_string(value),
            Node::Call { callee, .. } => format!("{}(...)", callee.describe()),
            _ => "expression".to_string(),
        }
    }
}

fn evaluate_all(nodes: &[Node], scope: &Scope<'_>) -> Result<Vec<Value>, EvalError> {
    nodes.iter().map(|node| node.evaluate(scope)).collect()
}

/// Member calls receive their target as `this`.
fn call(callee: &Node, args: &[Node], scope: &Scope<'_>) -> Result<Value, EvalError> {
    let (this, function) = match callee {
        Node::Member { target, name } => {
            let this = target.evaluate(scope)?;
            let function = this.get(name);
            (this, function)
        }
        Node::Index { target, key } => {
            let this = target.evaluate(scope)?;
            let function = this.get(&to_property_key(&key.evaluate(scope)?));
            (this, function)
        }
        other => (Value::Undefined, other.evaluate(scope)?),
    };
    let args = evaluate_all(args, scope)?;
    match function {
        Value::Function(function) => function.call(&this, &args),
        _ => Err(EvalError::NotCallable {
            callee: callee.describe(),
        }),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let int32 = |v: &Value| to_int32(to_number(v));
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(to_number(left) - to_number(right)),
        BinaryOp::Mul => Value::Number(to_number(left) * to_number(right)),
        BinaryOp::Div => Value::Number(to_number(left) / to_number(right)),
        BinaryOp::Mod => Value::Number(to_number(left) % to_number(right)),
        BinaryOp::Lt => Value::Bool(js_lt(left, right)),
        BinaryOp::Gt => Value::Bool(js_gt(left, right)),
        BinaryOp::Lte => Value::Bool(js_lte(left, right)),
        BinaryOp::Gte => Value::Bool(js_gte(left, right)),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
        BinaryOp::BitAnd => Value::Number((int32(left) & int32(right)) as f64),
        BinaryOp::BitXor => Value::Number((int32(left) ^ int32(right)) as f64),
        BinaryOp::BitOr => Value::Number((int32(left) | int32(right)) as f64),
        BinaryOp::And => {
            if truthy(left) {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Or => {
            if truthy(left) {
                left.clone()
            } else {
                right.clone()
            }
        }
    }
}

// ---------------------------------------------------------------- Building

/// A context path an operand reads, still open for extension by member
/// access or literal indexing.
struct Path {
    alias: bool,
    segments: Vec<String>,
    /// Index of the root token; postfix keeps operands in source order.
    order: usize,
}

struct Operand {
    node: Node,
    path: Option<Path>,
    /// Height of `node`; leaves are 1.
    depth: usize,
}

impl Operand {
    fn plain(node: Node) -> Self {
        Operand {
            node,
            path: None,
            depth: 0,
        }
    }
}

/// Deepest tree `build` accepts. `evaluate` and drop both recurse per level.
pub const MAX_DEPTH: usize = 256;

#[derive(Default)]
struct References {
    identifiers: Vec<(usize, String)>,
    aliases: Vec<(usize, String)>,
}

impl References {
    fn record(&mut self, path: Option<Path>) {
        let Some(path) = path else {
            return;
        };
        if path.alias {
            self.aliases.push((path.order, path.segments[0].clone()));
        } else {
            self.identifiers
                .push((path.order, join_identifier(&path.segments)));
        }
    }

    fn into_sets(self) -> (Vec<String>, Vec<String>) {
        (ordered(self.identifiers), ordered(self.aliases))
    }
}

fn ordered(mut entries: Vec<(usize, String)>) -> Vec<String> {
    entries.sort_by_key(|(order, _)| *order);
    entries
        .into_iter()
        .map(|(_, path)| path)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug)]
pub(crate) struct Built {
    pub root: Node,
    pub identifiers: Vec<String>,
    pub aliases: Vec<String>,
}

struct Builder<'a> {
    expression: &'a str,
    stack: Vec<Operand>,
    references: References,
    /// Tallest operand popped by the current step.
    deepest: usize,
}

impl<'a> Builder<'a> {
    fn pop(&mut self, token: &Token) -> Result<Operand, ParseError> {
        let operand = self.stack.pop().ok_or_else(|| {
            ParseError::new(
                self.expression,
                self.expression.chars().count(),
                ParseErrorKind::MissingOperand(token.to_string()),
            )
        })?;
        self.deepest = self.deepest.max(operand.depth);
        Ok(operand)
    }

    fn pop_node(&mut self, token: &Token) -> Result<Box<Node>, ParseError> {
        let operand = self.pop(token)?;
        self.references.record(operand.path);
        Ok(Box::new(operand.node))
    }

    fn pop_nodes(&mut self, count: usize, token: &Token) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(*self.pop_node(token)?);
        }
        nodes.reverse();
        Ok(nodes)
    }

    fn step(&mut self, order: usize, token: Token) -> Result<Operand, ParseError> {
        self.deepest = 0;
        let mut operand = match token {
            Token::Literal(value) => Operand::plain(Node::Literal(value)),
            Token::Variable(name) => Operand {
                path: Some(Path {
                    alias: false,
                    segments: vec![name.clone()],
                    order,
                }),
                node: Node::Variable(name),
                depth: 0,
            },
            Token::Alias(name) => Operand {
                path: Some(Path {
                    alias: true,
                    segments: vec![name.clone()],
                    order,
                }),
                node: Node::Alias(name),
                depth: 0,
            },
            Token::Member(ref name) => {
                let target = self.pop(&token)?;
                let path = target.path.map(|mut path| {
                    path.segments.push(name.clone());
                    path
                });
                Operand {
                    node: Node::Member {
                        target: Box::new(target.node),
                        name: name.clone(),
                    },
                    path,
                    depth: 0,
                }
            }
            Token::Index => {
                let key = self.pop(&token)?;
                let target = self.pop(&token)?;
                let literal_key = match (&key.node, &key.path) {
                    (Node::Literal(k @ (Value::String(_) | Value::Number(_))), None) => {
                        Some(to_property_key(k))
                    }
                    _ => None,
                };
                match (literal_key, target.path) {
                    (Some(segment), Some(mut path)) => {
                        path.segments.push(segment);
                        Operand {
                            node: Node::Index {
                                target: Box::new(target.node),
                                key: Box::new(key.node),
                            },
                            path: Some(path),
                            depth: 0,
                        }
                    }
                    (_, target_path) => {
                        self.references.record(target_path);
                        self.references.record(key.path);
                        Operand::plain(Node::Index {
                            target: Box::new(target.node),
                            key: Box::new(key.node),
                        })
                    }
                }
            }
            Token::Call(count) => {
                let args = self.pop_nodes(count, &token)?;
                let callee = self.pop_node(&token)?;
                Operand::plain(Node::Call { callee, args })
            }
            Token::Array(count) => Operand::plain(Node::Array(self.pop_nodes(count, &token)?)),
            Token::Object(count) => {
                let mut flat = self.pop_nodes(count * 2, &token)?.into_iter();
                let mut entries = Vec::with_capacity(count);
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    entries.push((key, value));
                }
                Operand::plain(Node::Object(entries))
            }
            Token::Unary(op) => {
                let operand = self.pop_node(&token)?;
                Operand::plain(Node::Unary { op, operand })
            }
            Token::Binary(op) => {
                let right = self.pop_node(&token)?;
                let left = self.pop_node(&token)?;
                Operand::plain(Node::Binary { op, left, right })
            }
            Token::Ternary => {
                let alternate = self.pop_node(&token)?;
                let consequent = self.pop_node(&token)?;
                let test = self.pop_node(&token)?;
                Operand::plain(Node::Ternary {
                    test,
                    consequent,
                    alternate,
                })
            }
        };
        operand.depth = self.deepest + 1;
        if operand.depth > MAX_DEPTH {
            return Err(ParseError::new(
                self.expression,
                self.expression.chars().count(),
                ParseErrorKind::TooDeep(MAX_DEPTH),
            ));
        }
        Ok(operand)
    }
}

/// Second pass: folds postfix tokens into a tree, collecting the context
/// paths and alias roots the expression reads.
pub(crate) fn build(expression: &str, tokens: Vec<Token>) -> Result<Built, ParseError> {
    let mut builder = Builder {
        expression,
        stack: Vec::new(),
        references: References::default(),
        deepest: 0,
    };
    for (order, token) in tokens.into_iter().enumerate() {
        let operand = builder.step(order, token)?;
        builder.stack.push(operand);
    }
    let end = expression.chars().count();
    let Some(root) = builder.stack.pop() else {
        return Err(ParseError::new(expression, 0, ParseErrorKind::Empty));
    };
    if !builder.stack.is_empty() {
        return Err(ParseError::new(
            expression,
            end,
            ParseErrorKind::UnexpectedToken(expression.to_string()),
        ));
    }
    builder.references.record(root.path);
    let (identifiers, aliases) = builder.references.into_sets();
    Ok(Built {
        root: root.node,
        identifiers,
        aliases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::create_tokens;
    use serde_json::json;

    fn built(expression: &str) -> Built {
        build(expression, create_tokens(expression).unwrap()).unwrap()
    }

    fn eval(expression: &str, context: serde_json::Value) -> Value {
        let context = Value::from(context);
        let scope = Scope {
            context: &context,
            aliases: &Value::Undefined,
        };
        built(expression).root.evaluate(&scope).unwrap()
    }

    #[test]
    fn test_identifier_paths() {
        assert_eq!(built("a.b + a.c").identifiers, vec!["a.b", "a.c"]);
        assert_eq!(built("items[0].name").identifiers, vec!["items.0.name"]);
        assert_eq!(built("a['b'].c").identifiers, vec!["a.b.c"]);
        assert_eq!(built("items[i].name").identifiers, vec!["items", "i"]);
        assert_eq!(built("x + x").identifiers, vec!["x"]);
        assert_eq!(built("f(a, b.c)").identifiers, vec!["f", "a", "b.c"]);
        assert_eq!(built("user.greet()").identifiers, vec!["user.greet"]);
        assert!(built("1 + 2").identifiers.is_empty());
    }

    #[test]
    fn test_identifier_keeps_bracket_keys_whole() {
        assert_eq!(built("a['x.y']").identifiers, vec![r#"a["x.y"]"#]);
        assert_eq!(built("a['x.y'].z").identifiers, vec![r#"a["x.y"].z"#]);
        assert_eq!(built("a[1.5]").identifiers, vec![r#"a["1.5"]"#]);
        assert_eq!(built("a['']").identifiers, vec![r#"a[""]"#]);
        assert_ne!(
            built("a['x.y']").identifiers,
            built("a.x.y").identifiers
        );
    }

    #[test]
    fn test_tree_depth_is_bounded() {
        let within = vec!["1"; MAX_DEPTH].join(" + ");
        assert!(build(&within, create_tokens(&within).unwrap()).is_ok());

        let beyond = vec!["1"; MAX_DEPTH + 1].join(" + ");
        let err = build(&beyond, create_tokens(&beyond).unwrap()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeep(MAX_DEPTH));
    }

    #[test]
    fn test_identifiers_in_source_order() {
        assert_eq!(built("c + b * a").identifiers, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_aliases_excluded_from_identifiers() {
        let b = built("@x.y + z + @x");
        assert_eq!(b.aliases, vec!["x"]);
        assert_eq!(b.identifiers, vec!["z"]);
    }

    #[test]
    fn test_evaluate_operators() {
        assert_eq!(eval("7 % 3", json!({})), Value::from(1));
        assert_eq!(eval("'a' + 1", json!({})), Value::from("a1"));
        assert_eq!(eval("5 & 3 | 8 ^ 1", json!({})), Value::from(9));
        assert_eq!(eval("'1' == 1", json!({})), Value::Bool(true));
        assert_eq!(eval("'1' === 1", json!({})), Value::Bool(false));
        assert_eq!(eval("null == undefined", json!({})), Value::Bool(true));
        assert_eq!(eval("!0", json!({})), Value::Bool(true));
        assert_eq!(eval("-'3'", json!({})), Value::from(-3));
    }

    #[test]
    fn test_short_circuit_returns_operand() {
        assert_eq!(eval("a || 'fallback'", json!({"a": ""})), Value::from("fallback"));
        assert_eq!(eval("a && a.b", json!({"a": null})), Value::Null);
    }

    #[test]
    fn test_short_circuit_skips_right_side() {
        let context = Value::object();
        let hits = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = hits.clone();
        context.as_object().unwrap().set(
            "tick",
            Value::function(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(Value::Bool(true))
            }),
        );
        let scope = Scope {
            context: &context,
            aliases: &Value::Undefined,
        };
        built("false && tick()").root.evaluate(&scope).unwrap();
        built("true || tick()").root.evaluate(&scope).unwrap();
        built("true ? 1 : tick()").root.evaluate(&scope).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_literals_build_fresh_containers() {
        let value = eval("{a: [1, x], 'b': {}}", json!({"x": 2}));
        assert_eq!(value.to_json(), json!({"a": [1, 2], "b": {}}));
    }

    #[test]
    fn test_not_callable() {
        let context = Value::from(json!({"user": {"name": "x"}}));
        let scope = Scope {
            context: &context,
            aliases: &Value::Undefined,
        };
        let err = built("user.name()").root.evaluate(&scope).unwrap_err();
        assert_eq!(
            err,
            EvalError::NotCallable {
                callee: "user.name".into()
            }
        );
    }
}
