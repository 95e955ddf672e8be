//! bindery-expression - binding expressions and the value graph they read.
//!
//! # Overview
//!
//! Expressions are small JavaScript-flavoured strings such as
//! `items.length + 1` or `user.isAdmin ? 'admin' : name`. The [`Parser`]
//! tokenizes them into postfix form with a shunting-yard pass, folds the
//! tokens into an evaluator tree and caches the result by source text. A
//! [`ParsedExpression`] reports which context paths it reads, so a binding
//! layer can observe exactly those.
//!
//! Values live in an observable graph ([`Value`], [`ObjectRef`],
//! [`ArrayRef`]) whose nodes carry per-key interceptors and array mutation
//! hooks.
//!
//! # Example
//!
//! ```
//! use bindery_expression::{Parser, Value};
//! use serde_json::json;
//!
//! let parser = Parser::new();
//! let expr = parser.parse("a.b + a.c * 2").unwrap();
//! assert_eq!(expr.identifiers(), ["a.b", "a.c"]);
//!
//! let context = Value::from(json!({"a": {"b": 1, "c": 3}}));
//! assert_eq!(expr.evaluate(&context, &Value::Undefined).unwrap(), Value::from(7));
//! ```

mod builtins;
pub mod error;
mod node;
pub mod parser;
pub mod token;
pub mod tokenizer;
pub mod util;
pub mod value;

pub use error::{EvalError, ExpressionError, ParseError, ParseErrorKind};
pub use parser::{ParsedExpression, Parser, ParserOptions};
pub use token::{BinaryOp, Token, UnaryOp};
pub use node::MAX_DEPTH;
pub use tokenizer::create_tokens;
pub use value::{
    ArrayChange, ArrayMethod, ArrayRef, FunctionRef, MutationHook, ObjectRef, PropertyHook, Value,
};
