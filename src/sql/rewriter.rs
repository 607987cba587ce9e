//! Structural rewrites of a parsed template.
//!
//! Both transforms work on the AST, so directives keep working in the
//! rewritten statement.

use super::ast::{ClauseKind, SqlNode, TokenKind};

/// Append `limit`/`offset` to a statement, ahead of any trailing `for update`.
pub fn rewrite_for_pagination(ast: &SqlNode, limit: Option<u64>, offset: Option<u64>) -> SqlNode {
    let mut tail = Vec::new();
    if let Some(n) = limit {
        tail.extend(keyword_with_number("limit", n));
    }
    if let Some(n) = offset {
        tail.extend(keyword_with_number("offset", n));
    }
    if tail.is_empty() {
        return ast.clone();
    }

    let (mut children, for_update) = split_for_update(ast);
    let Some(clause) = for_update else {
        children.extend(tail);
        return SqlNode::statement(children);
    };
    // the space that preceded `for update` now separates the body from the tail
    let body_ends_in_space = children
        .last()
        .is_some_and(|n| n.to_text().ends_with(char::is_whitespace));
    if body_ends_in_space {
        tail.remove(0);
    }
    children.extend(tail);
    children.push(SqlNode::token(TokenKind::Whitespace, " "));
    children.push(clause);
    SqlNode::statement(children)
}

/// Wrap a statement as `select count(*) from (<statement>) t_`.
///
/// A trailing `for update` is dropped.
pub fn rewrite_for_count(ast: &SqlNode) -> SqlNode {
    let (children, _) = split_for_update(ast);
    let space = || SqlNode::token(TokenKind::Whitespace, " ");
    SqlNode::statement(vec![
        SqlNode::Keyword {
            kind: ClauseKind::Select,
            keyword: "select".to_string(),
            children: vec![
                space(),
                SqlNode::token(TokenKind::Word, "count"),
                SqlNode::Paren {
                    inner: Box::new(SqlNode::statement(vec![SqlNode::token(TokenKind::Other, "*")])),
                },
                space(),
            ],
        },
        SqlNode::Keyword {
            kind: ClauseKind::From,
            keyword: "from".to_string(),
            children: vec![
                space(),
                SqlNode::Paren {
                    inner: Box::new(SqlNode::statement(children)),
                },
                space(),
                SqlNode::token(TokenKind::Word, "t_"),
            ],
        },
    ])
}

fn keyword_with_number(keyword: &str, n: u64) -> [SqlNode; 4] {
    [
        SqlNode::token(TokenKind::Whitespace, " "),
        SqlNode::token(TokenKind::Word, keyword),
        SqlNode::token(TokenKind::Whitespace, " "),
        SqlNode::token(TokenKind::Word, n.to_string()),
    ]
}

/// Top-level children, with a trailing `for update` clause split off.
fn split_for_update(ast: &SqlNode) -> (Vec<SqlNode>, Option<SqlNode>) {
    match ast {
        SqlNode::Statement { children } => {
            let mut children = children.clone();
            let position = children
                .iter()
                .rposition(|n| !matches!(n, SqlNode::Token { kind: TokenKind::Whitespace | TokenKind::Comment, .. }));
            match position {
                Some(i) if matches!(children[i], SqlNode::ForUpdate { .. }) => {
                    let for_update = children.split_off(i).into_iter().next();
                    (children, for_update)
                }
                _ => (children, None),
            }
        }
        other => (vec![other.clone()], None),
    }
}
