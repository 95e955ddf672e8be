//! Expression parser with a string-keyed cache of parsed expressions.

use crate::error::{EvalError, ParseError};
use crate::node::{build, Node, Scope};
use crate::tokenizer::create_tokens;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Parser configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Upper bound on cached expressions. `None` caches every distinct
    /// expression for the parser's lifetime; with a bound, the oldest entry
    /// is evicted first.
    pub cache_capacity: Option<usize>,
}

/// The result of parsing one expression string.
///
/// Evaluation is always live: nothing computed by one `evaluate` call is
/// reused by the next.
#[derive(Clone)]
pub struct ParsedExpression {
    expression: String,
    identifiers: Vec<String>,
    aliases: Vec<String>,
    one_time: bool,
    root: Rc<Node>,
}

impl ParsedExpression {
    /// The source text.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Distinct context paths the expression reads, in source order and in
    /// dot form (`items[0].name` is reported as `items.0.name`).
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Distinct alias roots (`@row.id` contributes `row`).
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_one_time(&self) -> bool {
        self.one_time
    }

    /// A copy flagged as a one-time binding. Evaluation is unchanged; the
    /// flag tells the binding layer not to re-observe once a value resolved.
    pub fn as_one_time(&self) -> ParsedExpression {
        ParsedExpression {
            one_time: true,
            ..self.clone()
        }
    }

    /// Evaluates against `context`, resolving `@name` roots in `aliases`.
    ///
    /// ```
    /// use bindery_expression::{Parser, Value};
    /// use serde_json::json;
    ///
    /// let parser = Parser::new();
    /// let expr = parser.parse("price * qty").unwrap();
    /// let context = Value::from(json!({"price": 2.5, "qty": 4}));
    /// assert_eq!(expr.evaluate(&context, &Value::Undefined).unwrap(), Value::from(10));
    /// ```
    pub fn evaluate(&self, context: &Value, aliases: &Value) -> Result<Value, EvalError> {
        self.root.evaluate(&Scope { context, aliases })
    }
}

impl fmt::Debug for ParsedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedExpression")
            .field("expression", &self.expression)
            .field("identifiers", &self.identifiers)
            .field("aliases", &self.aliases)
            .field("one_time", &self.one_time)
            .finish()
    }
}

/// Parses expressions and caches the results by their raw text.
///
/// Parsing the same text twice yields the same shared instance. Failed
/// parses are not cached.
pub struct Parser {
    options: ParserOptions,
    cache: RefCell<IndexMap<String, Rc<ParsedExpression>>>,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        Parser {
            options,
            cache: RefCell::new(IndexMap::new()),
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn parse(&self, expression: &str) -> Result<Rc<ParsedExpression>, ParseError> {
        if let Some(cached) = self.cache.borrow().get(expression) {
            return Ok(Rc::clone(cached));
        }
        debug!(expression, "parse cache miss");

        let tokens = create_tokens(expression)?;
        let built = build(expression, tokens)?;
        let parsed = Rc::new(ParsedExpression {
            expression: expression.to_string(),
            identifiers: built.identifiers,
            aliases: built.aliases,
            one_time: false,
            root: Rc::new(built.root),
        });
        self.remember(expression, &parsed);
        Ok(parsed)
    }

    fn remember(&self, expression: &str, parsed: &Rc<ParsedExpression>) {
        let mut cache = self.cache.borrow_mut();
        if let Some(capacity) = self.options.cache_capacity {
            if capacity == 0 {
                return;
            }
            while cache.len() >= capacity {
                match cache.shift_remove_index(0) {
                    Some((evicted, _)) => debug!(expression = %evicted, "evicted parsed expression"),
                    None => break,
                }
            }
        }
        cache.insert(expression.to_string(), Rc::clone(parsed));
    }

    pub fn is_cached(&self, expression: &str) -> bool {
        self.cache.borrow().contains_key(expression)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("options", &self.options)
            .field("cached", &self.cache_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[test]
    fn test_cache_identity() {
        let parser = Parser::new();
        let a = parser.parse("a + b").unwrap();
        let b = parser.parse("a + b").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(parser.cache_len(), 1);
        let c = parser.parse("a+b").unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_failed_parse_not_cached() {
        let parser = Parser::new();
        let err = parser.parse("foo(").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unbalanced('('));
        assert_eq!(err.expression, "foo(");
        assert!(!parser.is_cached("foo("));
        assert!(parser.parse("foo()").is_ok());
        assert_eq!(parser.cache_len(), 1);
    }

    #[test]
    fn test_bounded_cache_evicts_oldest() {
        let parser = Parser::with_options(ParserOptions {
            cache_capacity: Some(2),
        });
        parser.parse("a").unwrap();
        parser.parse("b").unwrap();
        parser.parse("c").unwrap();
        assert_eq!(parser.cache_len(), 2);
        assert!(!parser.is_cached("a"));
        assert!(parser.is_cached("b"));
        assert!(parser.is_cached("c"));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let parser = Parser::with_options(ParserOptions {
            cache_capacity: Some(0),
        });
        let a = parser.parse("a").unwrap();
        let b = parser.parse("a").unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(parser.cache_len(), 0);
    }

    #[test]
    fn test_clear_cache() {
        let parser = Parser::new();
        parser.parse("x").unwrap();
        parser.clear_cache();
        assert_eq!(parser.cache_len(), 0);
    }

    #[test]
    fn test_one_time_copy() {
        let parser = Parser::new();
        let parsed = parser.parse("a.b").unwrap();
        let once = parsed.as_one_time();
        assert!(once.is_one_time());
        assert!(!parsed.is_one_time());
        assert_eq!(once.identifiers(), parsed.identifiers());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ParserOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ParserOptions::default());
        let options: ParserOptions = serde_json::from_str(r#"{"cache_capacity": 8}"#).unwrap();
        assert_eq!(options.cache_capacity, Some(8));
    }
}
