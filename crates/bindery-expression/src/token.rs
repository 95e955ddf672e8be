//! Token kinds produced by the tokenizer, in postfix order.

use crate::value::Value;
use std::fmt;

/// One postfix token.
///
/// Arity-bearing tokens (`Call`, `Array`, `Object`) carry the number of
/// operands they take off the evaluation stack. `Object(n)` takes `n`
/// key/value pairs, so `2n` operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(Value),
    Variable(String),
    /// `@name`; the name is stored without the marker.
    Alias(String),
    Member(String),
    Index,
    Call(usize),
    Array(usize),
    Object(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Ternary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

impl UnaryOp {
    pub const PRECEDENCE: u8 = 14;

    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

/// Every operator lexeme, longest first so a greedy scan can try them in
/// order.
pub(crate) const OPERATOR_LEXEMES: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "&",
    "^", "|",
];

impl BinaryOp {
    pub fn from_lexeme(lexeme: &str) -> Option<BinaryOp> {
        let op = match lexeme {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Lte,
            ">=" => BinaryOp::Gte,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNotEq,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter. All binary operators are
    /// left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 13,
            BinaryOp::Add | BinaryOp::Sub => 12,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => 10,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 9,
            BinaryOp::BitAnd => 8,
            BinaryOp::BitXor => 7,
            BinaryOp::BitOr => 6,
            BinaryOp::And => 5,
            BinaryOp::Or => 4,
        }
    }
}

/// Precedence of `?:`, the loosest operator.
pub const TERNARY_PRECEDENCE: u8 = 3;

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(v) => write!(f, "{v:?}"),
            Token::Variable(name) => f.write_str(name),
            Token::Alias(name) => write!(f, "@{name}"),
            Token::Member(name) => write!(f, ".{name}"),
            Token::Index => f.write_str("[]"),
            Token::Call(n) => write!(f, "call/{n}"),
            Token::Array(n) => write!(f, "array/{n}"),
            Token::Object(n) => write!(f, "object/{n}"),
            Token::Unary(op) => write!(f, "unary{}", op.as_str()),
            Token::Binary(op) => f.write_str(op.as_str()),
            Token::Ternary => f.write_str("?:"),
        }
    }
}
