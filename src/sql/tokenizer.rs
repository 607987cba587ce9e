//! Template tokenizer.
//!
//! Splits two-way SQL into words, quotes, punctuation, whitespace, comments
//! and directives. Keywords are recognized case-insensitively on whole
//! words; `group by`, `order by` and `for update` may span any whitespace.
//! A block comment is a directive only when its first character says so:
//!
//! ```text
//! /*name*/'x'    bind value     (a test value must follow immediately)
//! /*n*/-1        bind value with a signed numeric test value
//! /*#expr*/      embedded value
//! /*^expr*/'x'   literal value
//! /*%...*/       block or expand directive
//! /* ... */      anything else, including a leading space, is a plain comment
//! ```

use nom::{
    IResult,
    bytes::complete::{is_not, tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{char, multispace1, one_of, satisfy},
    combinator::{not, peek, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::error::{TwoWayError, TwoWayResult};
use crate::expr::tokenizer::{is_ident_part, is_ident_start};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlTokenKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    ForUpdate,
    And,
    Or,
    Union,
    Except,
    Minus,
    Intersect,
    OpenParen,
    CloseParen,
    Quote,
    Word,
    Other,
    Whitespace,
    LineComment,
    BlockComment,
    Bind(String),
    Embedded(String),
    Literal(String),
    Expand(String),
    If(String),
    Elseif(String),
    Else,
    End,
    For { identifier: String, expression: String },
    Eof,
}

impl SqlTokenKind {
    pub fn is_set_operator(&self) -> bool {
        matches!(
            self,
            SqlTokenKind::Union | SqlTokenKind::Except | SqlTokenKind::Minus | SqlTokenKind::Intersect
        )
    }

    pub fn is_clause(&self) -> bool {
        matches!(
            self,
            SqlTokenKind::Select
                | SqlTokenKind::From
                | SqlTokenKind::Where
                | SqlTokenKind::GroupBy
                | SqlTokenKind::Having
                | SqlTokenKind::OrderBy
                | SqlTokenKind::ForUpdate
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub kind: SqlTokenKind,
    pub text: String,
    /// Character offset within the template.
    pub position: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '@')
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(input)
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    multispace1(input)
}

/// `'...'` with `''` as the escaped quote.
fn quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(nom::branch::alt((is_not("'"), tag("''")))),
        char('\''),
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), take_while(|c| c != '\n' && c != '\r')))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// Two keywords separated by whitespace, ending on a word boundary.
fn two_words<'a>(first: &'static str, second: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    recognize(terminated(
        tuple((tag_no_case(first), multispace1, tag_no_case(second))),
        not(peek(nom::character::complete::satisfy(is_word_char))),
    ))
}

/// Split a template into tokens; the last token is always `Eof`.
pub fn tokenize(template: &str) -> TwoWayResult<Vec<SqlToken>> {
    SqlTokenizer::new(template).run()
}

struct SqlTokenizer<'a> {
    source: &'a str,
    offset: usize,
    tokens: Vec<SqlToken>,
}

impl<'a> SqlTokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
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

    fn push(&mut self, kind: SqlTokenKind, len: usize) {
        let start = self.offset;
        self.tokens.push(SqlToken {
            kind,
            text: self.source[start..start + len].to_string(),
            position: self.char_position(start),
        });
        self.offset += len;
    }

    fn run(mut self) -> TwoWayResult<Vec<SqlToken>> {
        while let Some(c) = self.rest().chars().next() {
            let rest = self.rest();
            if let Ok((_, ws)) = whitespace(rest) {
                self.push(SqlTokenKind::Whitespace, ws.len());
            } else if c == '(' {
                self.push(SqlTokenKind::OpenParen, 1);
            } else if c == ')' {
                self.push(SqlTokenKind::CloseParen, 1);
            } else if c == '\'' {
                let (_, q) = quoted(rest).map_err(|_| self.error(self.offset, "quote is not closed"))?;
                self.push(SqlTokenKind::Quote, q.len());
            } else if let Ok((_, comment)) = line_comment(rest) {
                self.push(SqlTokenKind::LineComment, comment.len());
            } else if rest.starts_with("/*") {
                let (_, comment) =
                    block_comment(rest).map_err(|_| self.error(self.offset, "block comment is not closed"))?;
                let kind = self.classify_comment(comment)?;
                let takes_test_value = matches!(kind, SqlTokenKind::Bind(_) | SqlTokenKind::Literal(_));
                self.push(kind, comment.len());
                if takes_test_value {
                    self.read_signed_number();
                }
            } else if is_word_char(c) {
                self.read_word()?;
            } else {
                self.push(SqlTokenKind::Other, c.len_utf8());
            }
        }
        self.tokens.push(SqlToken {
            kind: SqlTokenKind::Eof,
            text: String::new(),
            position: self.source.chars().count(),
        });
        Ok(self.tokens)
    }

    fn read_word(&mut self) -> TwoWayResult<()> {
        let rest = self.rest();
        for (first, second, kind) in [
            ("group", "by", SqlTokenKind::GroupBy),
            ("order", "by", SqlTokenKind::OrderBy),
            ("for", "update", SqlTokenKind::ForUpdate),
        ] {
            if let Ok((_, matched)) = two_words(first, second)(rest) {
                self.push(kind, matched.len());
                return Ok(());
            }
        }
        let (_, w) = word(rest).map_err(|_| self.error(self.offset, "word expected"))?;
        let kind = match w.to_ascii_lowercase().as_str() {
            "select" => SqlTokenKind::Select,
            "from" => SqlTokenKind::From,
            "where" => SqlTokenKind::Where,
            "having" => SqlTokenKind::Having,
            "and" => SqlTokenKind::And,
            "or" => SqlTokenKind::Or,
            "union" => SqlTokenKind::Union,
            "except" => SqlTokenKind::Except,
            "minus" => SqlTokenKind::Minus,
            "intersect" => SqlTokenKind::Intersect,
            _ => SqlTokenKind::Word,
        };
        self.push(kind, w.len());
        Ok(())
    }

    /// Decide what a `/* ... */` comment is from its body alone.
    fn classify_comment(&self, comment: &str) -> TwoWayResult<SqlTokenKind> {
        let body = &comment[2..comment.len() - 2];
        let Some(first) = body.chars().next() else {
            return Ok(SqlTokenKind::BlockComment);
        };
        match first {
            '#' => Ok(SqlTokenKind::Embedded(body[1..].to_string())),
            '^' => Ok(SqlTokenKind::Literal(body[1..].to_string())),
            '%' => self.classify_block_directive(&body[1..]),
            c if is_ident_start(c) => Ok(SqlTokenKind::Bind(body.to_string())),
            _ => Ok(SqlTokenKind::BlockComment),
        }
    }

    /// `-1` or `+1.5` directly after a bind or literal directive is one test value.
    fn read_signed_number(&mut self) {
        let parsed: IResult<&str, &str> = recognize(tuple((
            one_of("+-"),
            satisfy(|c| c.is_ascii_digit()),
            take_while(is_word_char),
        )))(self.rest());
        if let Ok((_, number)) = parsed {
            self.push(SqlTokenKind::Word, number.len());
        }
    }

    fn classify_block_directive(&self, body: &str) -> TwoWayResult<SqlTokenKind> {
        let name_len = body.chars().take_while(|c| is_ident_part(*c)).map(char::len_utf8).sum::<usize>();
        let (name, rest) = body.split_at(name_len);
        let separated = rest.is_empty() || rest.starts_with(char::is_whitespace);
        match name {
            "if" if separated => Ok(SqlTokenKind::If(rest.to_string())),
            "elseif" if separated => Ok(SqlTokenKind::Elseif(rest.to_string())),
            "else" if rest.trim().is_empty() => Ok(SqlTokenKind::Else),
            "end" if rest.trim().is_empty() => Ok(SqlTokenKind::End),
            "expand" if separated => Ok(SqlTokenKind::Expand(rest.to_string())),
            "for" if separated => self.for_directive(rest),
            _ => Err(self.error(self.offset, format!("unsupported directive `%{}`", body.trim()))),
        }
    }

    /// `/*%for x in expr*/`
    fn for_directive(&self, body: &str) -> TwoWayResult<SqlTokenKind> {
        let parsed: IResult<&str, &str> = preceded(
            multispace1,
            terminated(
                recognize(pair(
                    nom::character::complete::satisfy(is_ident_start),
                    take_while(is_ident_part),
                )),
                tuple((multispace1, tag("in"), multispace1)),
            ),
        )(body);
        match parsed {
            Ok((expression, identifier)) if !expression.trim().is_empty() => Ok(SqlTokenKind::For {
                identifier: identifier.to_string(),
                expression: expression.to_string(),
            }),
            _ => Err(self.error(self.offset, "for directive must have the form `%for <name> in <expression>`")),
        }
    }
}
