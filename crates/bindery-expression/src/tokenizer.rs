//! Single-pass shunting-yard tokenizer.
//!
//! The scan keeps an explicit stack of pending operators and open delimiters
//! plus a stack of item counters, one per open call, array or object literal.
//! Nothing recurses here; the tree built from the tokens is capped at
//! [`MAX_DEPTH`](crate::MAX_DEPTH) levels.

use crate::error::{ParseError, ParseErrorKind};
use crate::token::{BinaryOp, Token, UnaryOp, OPERATOR_LEXEMES, TERNARY_PRECEDENCE};
use crate::value::Value;
use bindery_util::strings::{
    is_digit, is_identifier_part, is_identifier_start, is_operator_char, is_quote, is_whitespace,
    CharPredicate,
};
use bindery_util::{alias_root, is_alias, is_index, is_numeric, is_valid_variable};

/// Turns an expression into postfix tokens.
///
/// ```
/// use bindery_expression::{create_tokens, BinaryOp, Token, Value};
///
/// let tokens = create_tokens("a + 1").unwrap();
/// assert_eq!(
///     tokens,
///     vec![
///         Token::Variable("a".into()),
///         Token::Literal(Value::from(1)),
///         Token::Binary(BinaryOp::Add),
///     ]
/// );
/// ```
pub fn create_tokens(input: &str) -> Result<Vec<Token>, ParseError> {
    Tokenizer::new(input).run()
}

/// What the previous significant token was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Start,
    Operand,
    Operator,
    Open,
    Comma,
    /// The `:` after an object key.
    Colon,
    /// An object key, waiting for its `:`.
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// A `?` whose `:` has not been seen yet.
    Question,
    /// A ternary whose `:` has been seen; pops like an operator.
    Ternary,
    Group,
    Call,
    Index,
    Array,
    Object,
}

impl Pending {
    /// `(precedence, right associative)` for operators.
    fn precedence(self) -> Option<(u8, bool)> {
        match self {
            Pending::Unary(_) => Some((UnaryOp::PRECEDENCE, true)),
            Pending::Binary(op) => Some((op.precedence(), false)),
            Pending::Ternary => Some((TERNARY_PRECEDENCE, true)),
            _ => None,
        }
    }

    fn is_delimiter(self) -> bool {
        matches!(
            self,
            Pending::Group | Pending::Call | Pending::Index | Pending::Array | Pending::Object
        )
    }

    fn open_char(self) -> char {
        match self {
            Pending::Group | Pending::Call => '(',
            Pending::Index | Pending::Array => '[',
            Pending::Object => '{',
            _ => '?',
        }
    }

    fn into_token(self) -> Option<Token> {
        match self {
            Pending::Unary(op) => Some(Token::Unary(op)),
            Pending::Binary(op) => Some(Token::Binary(op)),
            Pending::Ternary => Some(Token::Ternary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Key,
    Colon,
    Value,
}

/// Item counter of an open call, array or object literal.
#[derive(Debug)]
struct Frame {
    count: usize,
    key_state: KeyState,
}

impl Frame {
    fn new(key_state: KeyState) -> Self {
        Frame {
            count: 0,
            key_state,
        }
    }
}

struct Tokenizer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    output: Vec<Token>,
    pending: Vec<Pending>,
    frames: Vec<Frame>,
    last: Last,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Tokenizer {
            source,
            chars: source.chars().collect(),
            pos: 0,
            output: Vec::new(),
            pending: Vec::new(),
            frames: Vec::new(),
            last: Last::Start,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.pos += 1;
                continue;
            }
            if self.expects_key() {
                self.read_key()?;
                continue;
            }
            match ch {
                '.' => self.read_dot()?,
                '\'' | '"' => {
                    let start = self.pos;
                    let text = self.read_string()?;
                    self.push_operand(Token::Literal(Value::string(text)), start)?;
                }
                '(' => self.open_paren()?,
                ')' => self.close_paren()?,
                '[' => self.open_bracket()?,
                ']' => self.close_bracket()?,
                '{' => self.open_brace()?,
                '}' => self.close_brace()?,
                ',' => self.comma()?,
                '?' => self.question()?,
                ':' => self.colon()?,
                c if is_digit(c) => self.read_number()?,
                c if is_identifier_start(c) => self.read_word()?,
                c if is_operator_char(c) => self.read_operator(c)?,
                c => return Err(self.error(ParseErrorKind::UnexpectedChar(c))),
            }
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Vec<Token>, ParseError> {
        let end = self.chars.len();
        if self.output.is_empty() && self.pending.is_empty() {
            return Err(self.error_at(0, ParseErrorKind::Empty));
        }
        if let Some(open) = self.pending.iter().rev().find(|p| p.is_delimiter()) {
            return Err(self.error_at(end, ParseErrorKind::Unbalanced(open.open_char())));
        }
        if self.last != Last::Operand {
            return Err(self.error_at(end, ParseErrorKind::UnexpectedEnd));
        }
        while let Some(op) = self.pending.pop() {
            if op == Pending::Question {
                return Err(self.error_at(end, ParseErrorKind::UnexpectedEnd));
            }
            self.emit(op);
        }
        Ok(self.output)
    }

    // ---------------------------------------------------------------- operands

    fn push_operand(&mut self, token: Token, start: usize) -> Result<(), ParseError> {
        if matches!(self.last, Last::Operand | Last::Key) {
            let text = self.slice(start, self.pos);
            return Err(self.error_at(start, ParseErrorKind::UnexpectedToken(text)));
        }
        self.output.push(token);
        self.last = Last::Operand;
        Ok(())
    }

    /// Numbers: `12`, `1.5`, `.5`, `1.`, `2e-3`.
    ///
    /// A `.` right after the integer digits belongs to the literal, so `1.e`
    /// is a malformed number and member access on an integer needs `1..x`
    /// or `1 .x`.
    fn read_number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.skip_while(is_digit);
        if self.peek() == Some('.') && self.pos > start {
            self.pos += 1;
            self.skip_while(is_digit);
        } else if self.peek() == Some('.') && self.peek_at(1).is_some_and(is_digit) {
            self.pos += 1;
            self.skip_while(is_digit);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut look = self.pos + 1;
            if matches!(self.char_at(look), Some('+' | '-')) {
                look += 1;
            }
            if self.char_at(look).is_some_and(is_digit) {
                self.pos = look;
                self.skip_while(is_digit);
            }
        }
        if self.peek().is_some_and(is_identifier_part) {
            self.skip_while(is_identifier_part);
            let text = self.slice(start, self.pos);
            return Err(self.error_at(start, ParseErrorKind::InvalidIdentifier(text)));
        }
        let text = self.slice(start, self.pos);
        let number = match text.parse::<f64>() {
            Ok(n) if is_numeric(&text) => n,
            _ => return Err(self.error_at(start, ParseErrorKind::InvalidNumber(text))),
        };
        self.push_operand(Token::Literal(Value::Number(number)), start)
    }

    /// A `.` is member access after an operand, otherwise a leading decimal
    /// point.
    fn read_dot(&mut self) -> Result<(), ParseError> {
        if self.last != Last::Operand {
            if self.peek_at(1).is_some_and(is_digit) {
                return self.read_number();
            }
            return Err(self.error(ParseErrorKind::UnexpectedChar('.')));
        }
        self.pos += 1;
        self.skip_while(is_whitespace);
        let start = self.pos;
        self.skip_while(is_identifier_part);
        let name = self.slice(start, self.pos);
        if name.is_empty() {
            return Err(match self.peek() {
                None => self.error(ParseErrorKind::UnexpectedEnd),
                Some(c) => self.error(ParseErrorKind::UnexpectedChar(c)),
            });
        }
        if !is_index(&name) && (is_alias(&name) || !is_valid_variable(&name)) {
            return Err(self.error_at(start, ParseErrorKind::InvalidIdentifier(name)));
        }
        self.output.push(Token::Member(name));
        Ok(())
    }

    fn read_word(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.skip_while(is_identifier_part);
        let word = self.slice(start, self.pos);
        let token = match word.as_str() {
            "true" => Token::Literal(Value::Bool(true)),
            "false" => Token::Literal(Value::Bool(false)),
            "null" => Token::Literal(Value::Null),
            "undefined" => Token::Literal(Value::Undefined),
            _ if !is_valid_variable(&word) => {
                return Err(self.error_at(start, ParseErrorKind::InvalidIdentifier(word)))
            }
            _ => match alias_root(&word) {
                Some(alias) => Token::Alias(alias.to_string()),
                None => Token::Variable(word),
            },
        };
        self.push_operand(token, start)
    }

    /// Reads a quoted literal, resolving backslash escapes. Returns the
    /// contents without delimiters.
    fn read_string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let quote = self.chars[start];
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(self.error_at(start, ParseErrorKind::UnterminatedString));
            };
            if ch == quote {
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let Some(escaped) = self.bump() else {
                return Err(self.error_at(start, ParseErrorKind::UnterminatedString));
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'v' => out.push('\u{b}'),
                '0' => out.push('\0'),
                'u' => match self.read_unicode_escape() {
                    Some(c) => out.push(c),
                    None => out.push('u'),
                },
                other => out.push(other),
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Option<char> {
        let digits: String = self.chars.get(self.pos..self.pos + 4)?.iter().collect();
        let code = u32::from_str_radix(&digits, 16).ok()?;
        let ch = char::from_u32(code)?;
        self.pos += 4;
        Some(ch)
    }

    /// Object keys: identifiers, numbers or string literals, always emitted
    /// as string literals.
    fn read_key(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let key = match self.peek() {
            Some('}') => return self.close_brace(),
            Some(c) if is_quote(c) => self.read_string()?,
            Some(c) if is_identifier_part(c) => {
                self.skip_while(is_identifier_part);
                let word = self.slice(start, self.pos);
                let valid = (is_valid_variable(&word) && !is_alias(&word)) || is_numeric(&word);
                if !valid {
                    return Err(self.error_at(start, ParseErrorKind::InvalidKey));
                }
                word
            }
            _ => return Err(self.error(ParseErrorKind::InvalidKey)),
        };
        self.output.push(Token::Literal(Value::string(key)));
        if let Some(frame) = self.frames.last_mut() {
            frame.key_state = KeyState::Colon;
        }
        self.last = Last::Key;
        Ok(())
    }

    fn expects_key(&self) -> bool {
        self.pending.last() == Some(&Pending::Object)
            && self
                .frames
                .last()
                .is_some_and(|f| f.key_state == KeyState::Key)
    }

    // ---------------------------------------------------------------- operators

    fn read_operator(&mut self, first: char) -> Result<(), ParseError> {
        let start = self.pos;
        let Some(lexeme) = OPERATOR_LEXEMES.iter().copied().find(|l| self.lookahead(l)) else {
            return Err(self.error(ParseErrorKind::UnexpectedChar(first)));
        };
        self.pos += lexeme.chars().count();

        if self.last == Last::Key {
            return Err(self.error_at(start, ParseErrorKind::UnexpectedToken(lexeme.to_string())));
        }
        if self.last != Last::Operand {
            let op = match lexeme {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                "+" => UnaryOp::Plus,
                other => {
                    return Err(
                        self.error_at(start, ParseErrorKind::MissingOperand(other.to_string()))
                    )
                }
            };
            // Prefix operators have no left operand to reduce.
            self.pending.push(Pending::Unary(op));
        } else {
            let Some(op) = BinaryOp::from_lexeme(lexeme) else {
                return Err(self.error_at(start, ParseErrorKind::UnexpectedToken(lexeme.to_string())));
            };
            self.reduce(op.precedence(), false);
            self.pending.push(Pending::Binary(op));
        }
        self.last = Last::Operator;
        Ok(())
    }

    /// Emits pending operators that bind at least as tight as an incoming one
    /// (strictly tighter for right-associative ones).
    fn reduce(&mut self, precedence: u8, right_assoc: bool) {
        while let Some(&top) = self.pending.last() {
            let Some((top_precedence, _)) = top.precedence() else {
                break;
            };
            let pops = if right_assoc {
                top_precedence > precedence
            } else {
                top_precedence >= precedence
            };
            if !pops {
                break;
            }
            self.pending.pop();
            self.emit(top);
        }
    }

    fn question(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        if self.last != Last::Operand {
            return Err(self.error_at(at, ParseErrorKind::MissingOperand("?".into())));
        }
        self.reduce(TERNARY_PRECEDENCE, true);
        self.pending.push(Pending::Question);
        self.last = Last::Operator;
        Ok(())
    }

    /// A `:` belongs to the nearest unmatched `?` unless an object literal
    /// opened more recently.
    fn colon(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        let owner = self
            .pending
            .iter()
            .rev()
            .find(|p| **p == Pending::Question || p.is_delimiter())
            .copied();
        match owner {
            Some(Pending::Question) => {
                if self.last != Last::Operand {
                    return Err(self.error_at(at, ParseErrorKind::MissingOperand(":".into())));
                }
                while let Some(op) = self.pending.pop() {
                    if op == Pending::Question {
                        break;
                    }
                    self.emit(op);
                }
                self.pending.push(Pending::Ternary);
                self.last = Last::Operator;
            }
            Some(Pending::Object) if self.last == Last::Key => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.key_state = KeyState::Value;
                }
                self.last = Last::Colon;
            }
            _ => return Err(self.error_at(at, ParseErrorKind::UnexpectedToken(":".into()))),
        }
        Ok(())
    }

    // ---------------------------------------------------------------- delimiters

    fn open_paren(&mut self) -> Result<(), ParseError> {
        match self.last {
            Last::Key => return Err(self.error(ParseErrorKind::UnexpectedChar('('))),
            Last::Operand => {
                self.pending.push(Pending::Call);
                self.frames.push(Frame::new(KeyState::Value));
            }
            _ => self.pending.push(Pending::Group),
        }
        self.pos += 1;
        self.last = Last::Open;
        Ok(())
    }

    fn close_paren(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        match self.unwind(')', at)? {
            Pending::Group => {
                if self.last != Last::Operand {
                    return Err(self.error_at(at, ParseErrorKind::UnexpectedToken(")".into())));
                }
            }
            Pending::Call => {
                let count = self.close_frame(')', at)?;
                self.output.push(Token::Call(count));
            }
            _ => return Err(self.error_at(at, ParseErrorKind::Unbalanced(')'))),
        }
        self.last = Last::Operand;
        Ok(())
    }

    fn open_bracket(&mut self) -> Result<(), ParseError> {
        match self.last {
            Last::Key => return Err(self.error(ParseErrorKind::UnexpectedChar('['))),
            Last::Operand => self.pending.push(Pending::Index),
            _ => {
                self.pending.push(Pending::Array);
                self.frames.push(Frame::new(KeyState::Value));
            }
        }
        self.pos += 1;
        self.last = Last::Open;
        Ok(())
    }

    fn close_bracket(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        match self.unwind(']', at)? {
            Pending::Index => {
                if self.last != Last::Operand {
                    return Err(self.error_at(at, ParseErrorKind::UnexpectedToken("]".into())));
                }
                self.output.push(Token::Index);
            }
            Pending::Array => {
                let count = self.close_frame(']', at)?;
                self.output.push(Token::Array(count));
            }
            _ => return Err(self.error_at(at, ParseErrorKind::Unbalanced(']'))),
        }
        self.last = Last::Operand;
        Ok(())
    }

    fn open_brace(&mut self) -> Result<(), ParseError> {
        if matches!(self.last, Last::Operand | Last::Key) {
            return Err(self.error(ParseErrorKind::UnexpectedChar('{')));
        }
        self.pending.push(Pending::Object);
        self.frames.push(Frame::new(KeyState::Key));
        self.pos += 1;
        self.last = Last::Open;
        Ok(())
    }

    fn close_brace(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        match self.unwind('}', at)? {
            Pending::Object => {
                let count = self.close_frame('}', at)?;
                self.output.push(Token::Object(count));
            }
            _ => return Err(self.error_at(at, ParseErrorKind::Unbalanced('}'))),
        }
        self.last = Last::Operand;
        Ok(())
    }

    fn comma(&mut self) -> Result<(), ParseError> {
        let at = self.pos;
        self.pos += 1;
        let unexpected = |this: &Self| this.error_at(at, ParseErrorKind::UnexpectedToken(",".into()));
        if self.last != Last::Operand {
            return Err(unexpected(self));
        }
        loop {
            match self.pending.last().copied() {
                Some(p) if p.is_delimiter() => break,
                Some(Pending::Question) | None => return Err(unexpected(self)),
                Some(op) => {
                    self.pending.pop();
                    self.emit(op);
                }
            }
        }
        let open = self.pending.last().copied();
        let Some(frame) = self.frames.last_mut() else {
            return Err(unexpected(self));
        };
        match open {
            Some(Pending::Call | Pending::Array) => frame.count += 1,
            Some(Pending::Object) if frame.key_state == KeyState::Value => {
                frame.count += 1;
                frame.key_state = KeyState::Key;
            }
            _ => return Err(unexpected(self)),
        }
        self.last = Last::Comma;
        Ok(())
    }

    /// Pops operators down to the innermost open delimiter and returns it.
    fn unwind(&mut self, close: char, at: usize) -> Result<Pending, ParseError> {
        loop {
            match self.pending.pop() {
                None => return Err(self.error_at(at, ParseErrorKind::Unbalanced(close))),
                Some(Pending::Question) => {
                    return Err(self.error_at(at, ParseErrorKind::UnexpectedToken(close.to_string())))
                }
                Some(p) if p.is_delimiter() => return Ok(p),
                Some(op) => self.emit(op),
            }
        }
    }

    /// Closes the innermost counter; a trailing comma is tolerated.
    fn close_frame(&mut self, close: char, at: usize) -> Result<usize, ParseError> {
        let Some(frame) = self.frames.pop() else {
            return Err(self.error_at(at, ParseErrorKind::Unbalanced(close)));
        };
        match self.last {
            Last::Operand => Ok(frame.count + 1),
            Last::Open | Last::Comma => Ok(frame.count),
            _ => Err(self.error_at(at, ParseErrorKind::MissingOperand(close.to_string()))),
        }
    }

    fn emit(&mut self, op: Pending) {
        if let Some(token) = op.into_token() {
            self.output.push(token);
        }
    }

    // ---------------------------------------------------------------- cursor

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_while(&mut self, predicate: CharPredicate) {
        while self.peek().is_some_and(predicate) {
            self.pos += 1;
        }
    }

    fn lookahead(&self, lexeme: &str) -> bool {
        lexeme
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(self.pos, kind)
    }

    fn error_at(&self, position: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.source, position, kind)
    }
}
