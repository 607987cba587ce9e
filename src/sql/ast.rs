//! Template AST.
//!
//! Nodes keep the exact source text they were parsed from, so
//! `parse(t)?.to_text() == t` for every template that parses.

use serde::Serialize;

use crate::error::Location;
use crate::expr::ExprNode;

/// Clause-leading and continuation keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    /// `and` continuation inside a clause
    And,
    /// `or` continuation inside a clause
    Or,
}

impl ClauseKind {
    pub fn is_logical(&self) -> bool {
        matches!(self, ClauseKind::And | ClauseKind::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetOpKind {
    Union,
    Except,
    Minus,
    Intersect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Word,
    /// A quoted string literal.
    Quote,
    Other,
    Whitespace,
    /// A line or block comment that is not a directive.
    Comment,
}

impl TokenKind {
    /// Whether emitting this token makes the enclosing clause non-empty.
    pub fn is_content(&self) -> bool {
        matches!(self, TokenKind::Word | TokenKind::Quote | TokenKind::Other)
    }
}

/// A directive comment and its pre-parsed expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    /// Position of the directive within the template.
    pub location: Location,
    /// The full comment, e.g. `/*%if a > 1*/`.
    pub text: String,
    pub expression: ExprNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub directive: Directive,
    pub body: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseBranch {
    pub text: String,
    pub body: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum SqlNode {
    Statement {
        children: Vec<SqlNode>,
    },
    SetOp {
        kind: SetOpKind,
        keyword: String,
        left: Box<SqlNode>,
        right: Box<SqlNode>,
    },
    Keyword {
        kind: ClauseKind,
        keyword: String,
        children: Vec<SqlNode>,
    },
    ForUpdate {
        keyword: String,
        children: Vec<SqlNode>,
    },
    Token {
        kind: TokenKind,
        text: String,
    },
    Paren {
        inner: Box<SqlNode>,
    },
    BindValue {
        directive: Directive,
        placeholder: Box<SqlNode>,
    },
    EmbeddedValue {
        directive: Directive,
    },
    LiteralValue {
        directive: Directive,
        placeholder: Box<SqlNode>,
    },
    Expand {
        directive: Directive,
        placeholder: Box<SqlNode>,
    },
    IfBlock {
        if_branch: Branch,
        elseif_branches: Vec<Branch>,
        else_branch: Option<ElseBranch>,
        end: String,
    },
    ForBlock {
        directive: Directive,
        /// Loop variable name, `x` in `/*%for x in xs*/`.
        identifier: String,
        body: Vec<SqlNode>,
        end: String,
    },
}

impl SqlNode {
    pub fn token(kind: TokenKind, text: impl Into<String>) -> Self {
        SqlNode::Token {
            kind,
            text: text.into(),
        }
    }

    pub fn statement(children: Vec<SqlNode>) -> Self {
        SqlNode::Statement { children }
    }

    /// Reassemble the source text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            SqlNode::Statement { children } => write_all(children, out),
            SqlNode::SetOp {
                keyword, left, right, ..
            } => {
                left.write_text(out);
                out.push_str(keyword);
                right.write_text(out);
            }
            SqlNode::Keyword {
                keyword, children, ..
            }
            | SqlNode::ForUpdate { keyword, children } => {
                out.push_str(keyword);
                write_all(children, out);
            }
            SqlNode::Token { text, .. } => out.push_str(text),
            SqlNode::Paren { inner } => {
                out.push('(');
                inner.write_text(out);
                out.push(')');
            }
            SqlNode::BindValue {
                directive,
                placeholder,
            }
            | SqlNode::LiteralValue {
                directive,
                placeholder,
            }
            | SqlNode::Expand {
                directive,
                placeholder,
            } => {
                out.push_str(&directive.text);
                placeholder.write_text(out);
            }
            SqlNode::EmbeddedValue { directive } => out.push_str(&directive.text),
            SqlNode::IfBlock {
                if_branch,
                elseif_branches,
                else_branch,
                end,
            } => {
                out.push_str(&if_branch.directive.text);
                write_all(&if_branch.body, out);
                for branch in elseif_branches {
                    out.push_str(&branch.directive.text);
                    write_all(&branch.body, out);
                }
                if let Some(e) = else_branch {
                    out.push_str(&e.text);
                    write_all(&e.body, out);
                }
                out.push_str(end);
            }
            SqlNode::ForBlock {
                directive, body, end, ..
            } => {
                out.push_str(&directive.text);
                write_all(body, out);
                out.push_str(end);
            }
        }
    }
}

fn write_all(nodes: &[SqlNode], out: &mut String) {
    for node in nodes {
        node.write_text(out);
    }
}
