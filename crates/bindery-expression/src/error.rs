use thiserror::Error;

/// What went wrong while tokenizing or building an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("empty expression")]
    Empty,

    #[error("unbalanced `{0}`")]
    Unbalanced(char),

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),

    #[error("unexpected `{0}`")]
    UnexpectedToken(String),

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing operand for `{0}`")]
    MissingOperand(String),

    #[error("invalid object key")]
    InvalidKey,

    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
}

/// A malformed expression. Carries the offending source text.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot parse `{expression}` at {position}: {kind}")]
pub struct ParseError {
    pub expression: String,
    /// Character offset where the problem was detected.
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(expression: &str, position: usize, kind: ParseErrorKind) -> Self {
        ParseError {
            expression: expression.to_string(),
            position,
            kind,
        }
    }
}

/// A runtime failure inside `evaluate`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("`{callee}` is not a function")]
    NotCallable { callee: String },

    #[error("`{method}` called on a value that is not an array")]
    InvalidReceiver { method: String },

    #[error("{0}")]
    Thrown(String),
}

/// Either failure, for callers that parse and evaluate in one step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
