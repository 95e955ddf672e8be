use bindery_expression::{EvalError, ExpressionError, ParseError};
use thiserror::Error;

/// Errors surfaced by the binding runtime.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("invalid runtime options: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<ParseError> for ContextError {
    fn from(err: ParseError) -> Self {
        ContextError::Expression(err.into())
    }
}

impl From<EvalError> for ContextError {
    fn from(err: EvalError) -> Self {
        ContextError::Expression(err.into())
    }
}
