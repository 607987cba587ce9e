//! Single-pass tokenizer for directive expressions.
//!
//! The scanner keeps one bit of state: whether a binary operator may appear
//! next. It is set after anything that can end an operand (a literal, a
//! name, a property or a closing parenthesis) and cleared after operators,
//! `(`, `,` and `!`. A leading `+`/`-` is a numeric sign only while it is
//! clear, and `<`/`>` are operators only while it is set.

use nom::{
    IResult,
    bytes::complete::take_while,
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::{pair, tuple},
};

use crate::error::{TwoWayError, TwoWayResult};

/// Lexical category of an expression token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprTokenKind {
    Whitespace,
    OpenParen,
    CloseParen,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    CharLiteral,
    StringLiteral,
    IntLiteral,
    LongLiteral,
    FloatLiteral,
    DoubleLiteral,
    BigDecimalLiteral,
    Null,
    True,
    False,
    /// A bare name resolved against the context.
    Value,
    /// `.name`
    Property,
    /// `.name` immediately followed by `(`
    Function,
    /// `?.name`
    SafeProperty,
    /// `?.name` immediately followed by `(`
    SafeFunction,
}

/// A token together with its source text and character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprToken {
    pub kind: ExprTokenKind,
    pub text: String,
    pub position: usize,
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_part)))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((opt(one_of("+-")), digit1, opt(pair(char('.'), digit0)))))(input)
}

/// Split an expression into tokens.
pub fn tokenize(expression: &str) -> TwoWayResult<Vec<ExprToken>> {
    Tokenizer::new(expression).run()
}

struct Tokenizer<'a> {
    source: &'a str,
    /// Byte offset of the scan position.
    offset: usize,
    binary_op_available: bool,
    tokens: Vec<ExprToken>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            binary_op_available: false,
            tokens: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn char_position(&self, byte_offset: usize) -> usize {
        self.source[..byte_offset].chars().count()
    }

    fn error(&self, byte_offset: usize, message: impl Into<String>) -> TwoWayError {
        TwoWayError::tokenize(self.source, self.char_position(byte_offset), message)
    }

    fn push(&mut self, kind: ExprTokenKind, len: usize) {
        let start = self.offset;
        self.tokens.push(ExprToken {
            kind,
            text: self.source[start..start + len].to_string(),
            position: self.char_position(start),
        });
        self.offset += len;
        self.binary_op_available = matches!(
            kind,
            ExprTokenKind::CloseParen
                | ExprTokenKind::CharLiteral
                | ExprTokenKind::StringLiteral
                | ExprTokenKind::IntLiteral
                | ExprTokenKind::LongLiteral
                | ExprTokenKind::FloatLiteral
                | ExprTokenKind::DoubleLiteral
                | ExprTokenKind::BigDecimalLiteral
                | ExprTokenKind::Null
                | ExprTokenKind::True
                | ExprTokenKind::False
                | ExprTokenKind::Value
                | ExprTokenKind::Property
                | ExprTokenKind::SafeProperty
        ) || (kind == ExprTokenKind::Whitespace && self.binary_op_available);
    }

    fn run(mut self) -> TwoWayResult<Vec<ExprToken>> {
        while let Some(c) = self.rest().chars().next() {
            let next = self.rest().chars().nth(1);
            match c {
                c if c.is_whitespace() => {
                    let len = self
                        .rest()
                        .find(|ch: char| !ch.is_whitespace())
                        .unwrap_or(self.rest().len());
                    self.push(ExprTokenKind::Whitespace, len);
                }
                '(' => self.push(ExprTokenKind::OpenParen, 1),
                ')' => self.push(ExprTokenKind::CloseParen, 1),
                ',' => self.push(ExprTokenKind::Comma, 1),
                '&' if next == Some('&') => self.push(ExprTokenKind::And, 2),
                '|' if next == Some('|') => self.push(ExprTokenKind::Or, 2),
                '=' if next == Some('=') => self.push(ExprTokenKind::Eq, 2),
                '!' if next == Some('=') => self.push(ExprTokenKind::Ne, 2),
                '>' if next == Some('=') => self.push(ExprTokenKind::Ge, 2),
                '<' if next == Some('=') => self.push(ExprTokenKind::Le, 2),
                '>' if self.binary_op_available => self.push(ExprTokenKind::Gt, 1),
                '<' if self.binary_op_available => self.push(ExprTokenKind::Lt, 1),
                '!' => self.push(ExprTokenKind::Not, 1),
                '\'' => self.read_char_literal()?,
                '"' => self.read_string_literal()?,
                '+' | '-' if !self.binary_op_available => self.read_number()?,
                c if c.is_ascii_digit() => self.read_number()?,
                '.' => self.read_member(1, false)?,
                '?' if next == Some('.') => self.read_member(2, true)?,
                c if is_ident_start(c) => self.read_word()?,
                other => {
                    return Err(self.error(self.offset, format!("unsupported character '{}'", other)));
                }
            }
        }
        Ok(self.tokens)
    }

    fn read_char_literal(&mut self) -> TwoWayResult<()> {
        let mut chars = self.rest().char_indices().skip(1);
        match (chars.next(), chars.next()) {
            (Some((_, c)), Some((end, '\''))) if c != '\'' => {
                self.push(ExprTokenKind::CharLiteral, end + 1);
                Ok(())
            }
            _ => Err(self.error(self.offset, "unterminated or invalid character literal")),
        }
    }

    fn read_string_literal(&mut self) -> TwoWayResult<()> {
        let rest = self.rest();
        let mut chars = rest.char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if let Some((_, '"')) = chars.peek() {
                    chars.next();
                    continue;
                }
                self.push(ExprTokenKind::StringLiteral, i + 1);
                return Ok(());
            }
        }
        Err(self.error(self.offset, "unterminated string literal"))
    }

    fn read_number(&mut self) -> TwoWayResult<()> {
        let start = self.offset;
        let (after, digits) = number(self.rest())
            .map_err(|_| self.error(start, "malformed numeric literal"))?;
        if digits.ends_with('.') {
            return Err(self.error(start, "a decimal point must be followed by a digit"));
        }
        let mut len = digits.len();
        let has_point = digits.contains('.');
        let mut kind = if has_point {
            ExprTokenKind::BigDecimalLiteral
        } else {
            ExprTokenKind::IntLiteral
        };
        let mut tail = after.chars();
        match tail.next() {
            Some('F' | 'f') => {
                kind = ExprTokenKind::FloatLiteral;
                len += 1;
            }
            Some('D' | 'd') => {
                kind = ExprTokenKind::DoubleLiteral;
                len += 1;
            }
            Some('B' | 'b') => {
                kind = ExprTokenKind::BigDecimalLiteral;
                len += 1;
            }
            Some('L' | 'l') if !has_point => {
                kind = ExprTokenKind::LongLiteral;
                len += 1;
            }
            _ => {}
        }
        if let Some(c) = self.source[start + len..].chars().next() {
            if c == '.' && self.source[start + len + 1..].starts_with(|ch: char| ch.is_ascii_digit()) {
                return Err(self.error(start, "numeric literal has more than one decimal point"));
            }
            if is_ident_part(c) {
                return Err(self.error(start, format!("unexpected '{}' after numeric literal", c)));
            }
        }
        self.push(kind, len);
        Ok(())
    }

    fn read_member(&mut self, prefix: usize, safe: bool) -> TwoWayResult<()> {
        let name_start = self.offset + prefix;
        let (after, name) = identifier(&self.source[name_start..])
            .map_err(|_| self.error(self.offset, "'.' must be followed by a property or function name"))?;
        let is_call = after.starts_with('(');
        let kind = match (is_call, safe) {
            (true, false) => ExprTokenKind::Function,
            (true, true) => ExprTokenKind::SafeFunction,
            (false, false) => ExprTokenKind::Property,
            (false, true) => ExprTokenKind::SafeProperty,
        };
        self.push(kind, prefix + name.len());
        Ok(())
    }

    fn read_word(&mut self) -> TwoWayResult<()> {
        let (_, word) = identifier(self.rest()).map_err(|_| self.error(self.offset, "invalid identifier"))?;
        let kind = match word {
            "null" => ExprTokenKind::Null,
            "true" => ExprTokenKind::True,
            "false" => ExprTokenKind::False,
            _ => ExprTokenKind::Value,
        };
        self.push(kind, word.len());
        Ok(())
    }
}
