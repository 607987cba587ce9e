//! Recursive-descent template parser.
//!
//! A statement is a sequence of clauses. A clause keyword owns every node up
//! to the next clause keyword, set operator, `)` or block boundary; an
//! `and`/`or` keyword owns nodes up to the next logical or clause keyword.
//! Block directives nest freely inside any of these.

use tracing::debug;

use super::ast::{Branch, ClauseKind, Directive, ElseBranch, SetOpKind, SqlNode, TokenKind};
use super::tokenizer::{SqlToken, SqlTokenKind, tokenize};
use crate::error::{Location, TwoWayError, TwoWayResult};
use crate::expr::{ExprNode, parse_expression};

/// Parse a template into its AST.
pub fn parse(template: &str) -> TwoWayResult<SqlNode> {
    let tokens = tokenize(template)?;
    let mut parser = SqlParser {
        template,
        tokens,
        index: 0,
    };
    let statement = parser.parse_statement()?;
    let token = parser.peek();
    match token.kind {
        SqlTokenKind::Eof => {}
        SqlTokenKind::CloseParen => return Err(parser.error(token.position, "unexpected `)`")),
        _ => {
            return Err(parser.error(
                token.position,
                format!("`{}` has no matching `/*%if*/` or `/*%for*/`", token.text),
            ));
        }
    }
    debug!(template, "parsed template");
    Ok(statement)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Statement,
    Clause,
    Logical,
}

struct SqlParser<'a> {
    template: &'a str,
    tokens: Vec<SqlToken>,
    index: usize,
}

impl<'a> SqlParser<'a> {
    fn peek(&self) -> &SqlToken {
        // the token list always ends with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> SqlToken {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn error(&self, position: usize, message: impl Into<String>) -> TwoWayError {
        TwoWayError::parse(self.template, position, message)
    }

    fn parse_statement(&mut self) -> TwoWayResult<SqlNode> {
        let children = self.parse_sequence(Scope::Statement)?;
        let token = self.peek().clone();
        let kind = match token.kind {
            SqlTokenKind::Union => SetOpKind::Union,
            SqlTokenKind::Except => SetOpKind::Except,
            SqlTokenKind::Minus => SetOpKind::Minus,
            SqlTokenKind::Intersect => SetOpKind::Intersect,
            _ => return Ok(SqlNode::statement(children)),
        };
        self.next();
        let right = self.parse_statement()?;
        Ok(SqlNode::SetOp {
            kind,
            keyword: token.text,
            left: Box::new(SqlNode::statement(children)),
            right: Box::new(right),
        })
    }

    /// Nodes until a token that ends `scope`; that token is left unconsumed.
    fn parse_sequence(&mut self, scope: Scope) -> TwoWayResult<Vec<SqlNode>> {
        let mut nodes = Vec::new();
        loop {
            let kind = self.peek().kind.clone();
            let ends_scope = match &kind {
                SqlTokenKind::Eof
                | SqlTokenKind::CloseParen
                | SqlTokenKind::Elseif(_)
                | SqlTokenKind::Else
                | SqlTokenKind::End => true,
                k if k.is_set_operator() => true,
                k if k.is_clause() => scope != Scope::Statement,
                SqlTokenKind::And | SqlTokenKind::Or => scope == Scope::Logical,
                _ => false,
            };
            if ends_scope {
                return Ok(nodes);
            }
            nodes.push(self.parse_node()?);
        }
    }

    fn parse_node(&mut self) -> TwoWayResult<SqlNode> {
        let token = self.next();
        let node = match token.kind {
            SqlTokenKind::Select => self.clause(ClauseKind::Select, token.text)?,
            SqlTokenKind::From => self.clause(ClauseKind::From, token.text)?,
            SqlTokenKind::Where => self.clause(ClauseKind::Where, token.text)?,
            SqlTokenKind::GroupBy => self.clause(ClauseKind::GroupBy, token.text)?,
            SqlTokenKind::Having => self.clause(ClauseKind::Having, token.text)?,
            SqlTokenKind::OrderBy => self.clause(ClauseKind::OrderBy, token.text)?,
            SqlTokenKind::ForUpdate => SqlNode::ForUpdate {
                keyword: token.text,
                children: self.parse_sequence(Scope::Clause)?,
            },
            SqlTokenKind::And => self.logical(ClauseKind::And, token.text)?,
            SqlTokenKind::Or => self.logical(ClauseKind::Or, token.text)?,
            SqlTokenKind::OpenParen => self.paren(token.position)?,
            SqlTokenKind::Quote => SqlNode::token(TokenKind::Quote, token.text),
            SqlTokenKind::Word => SqlNode::token(TokenKind::Word, token.text),
            SqlTokenKind::Other => SqlNode::token(TokenKind::Other, token.text),
            SqlTokenKind::Whitespace => SqlNode::token(TokenKind::Whitespace, token.text),
            SqlTokenKind::LineComment | SqlTokenKind::BlockComment => SqlNode::token(TokenKind::Comment, token.text),
            SqlTokenKind::Bind(ref expression) => {
                let directive = self.directive(&token, expression)?;
                let placeholder = self.test_value(&token, "bind value")?;
                SqlNode::BindValue {
                    directive,
                    placeholder: Box::new(placeholder),
                }
            }
            SqlTokenKind::Literal(ref expression) => {
                let directive = self.directive(&token, expression)?;
                let placeholder = self.test_value(&token, "literal value")?;
                if matches!(placeholder, SqlNode::Paren { .. }) {
                    return Err(self.error(token.position, "literal value directive requires a single test value"));
                }
                SqlNode::LiteralValue {
                    directive,
                    placeholder: Box::new(placeholder),
                }
            }
            SqlTokenKind::Embedded(ref expression) => SqlNode::EmbeddedValue {
                directive: self.directive(&token, expression)?,
            },
            SqlTokenKind::Expand(ref expression) => {
                let directive = self.directive(&token, expression)?;
                let next = self.peek();
                if next.kind != SqlTokenKind::Other || next.text != "*" {
                    return Err(self.error(token.position, "expand directive must be followed by `*`"));
                }
                let star = self.next();
                SqlNode::Expand {
                    directive,
                    placeholder: Box::new(SqlNode::token(TokenKind::Other, star.text)),
                }
            }
            SqlTokenKind::If(ref expression) => self.if_block(&token, expression)?,
            SqlTokenKind::For {
                ref identifier,
                ref expression,
            } => self.for_block(&token, identifier, expression)?,
            // parse_sequence stops on every other kind
            _ => return Err(self.error(token.position, format!("unexpected `{}`", token.text))),
        };
        Ok(node)
    }

    fn clause(&mut self, kind: ClauseKind, keyword: String) -> TwoWayResult<SqlNode> {
        Ok(SqlNode::Keyword {
            kind,
            keyword,
            children: self.parse_sequence(Scope::Clause)?,
        })
    }

    fn logical(&mut self, kind: ClauseKind, keyword: String) -> TwoWayResult<SqlNode> {
        Ok(SqlNode::Keyword {
            kind,
            keyword,
            children: self.parse_sequence(Scope::Logical)?,
        })
    }

    fn paren(&mut self, position: usize) -> TwoWayResult<SqlNode> {
        let inner = self.parse_statement()?;
        let close = self.next();
        match close.kind {
            SqlTokenKind::CloseParen => Ok(SqlNode::Paren { inner: Box::new(inner) }),
            SqlTokenKind::Eof => Err(self.error(position, "parenthesis is not closed")),
            _ => Err(self.error(close.position, format!("`{}` crosses a parenthesis boundary", close.text))),
        }
    }

    fn directive(&self, token: &SqlToken, expression: &str) -> TwoWayResult<Directive> {
        let expr = if expression.trim().is_empty() {
            ExprNode::Empty {
                location: Location::new(expression, 0),
            }
        } else {
            parse_expression(expression)?
        };
        Ok(Directive {
            location: Location::new(self.template, token.position),
            text: token.text.clone(),
            expression: expr,
        })
    }

    /// The dummy value that keeps a two-way template executable as plain SQL.
    fn test_value(&mut self, directive: &SqlToken, what: &str) -> TwoWayResult<SqlNode> {
        let next = self.peek().clone();
        match next.kind {
            SqlTokenKind::Quote => {
                self.next();
                Ok(SqlNode::token(TokenKind::Quote, next.text))
            }
            SqlTokenKind::Word => {
                self.next();
                Ok(SqlNode::token(TokenKind::Word, next.text))
            }
            SqlTokenKind::OpenParen => {
                self.next();
                self.paren(next.position)
            }
            _ => Err(self.error(
                directive.position,
                format!("{} directive `{}` must be followed by a test value", what, directive.text),
            )),
        }
    }

    /// Body of a block: a statement, flattened when it has no set operator.
    fn block_body(&mut self) -> TwoWayResult<Vec<SqlNode>> {
        match self.parse_statement()? {
            SqlNode::Statement { children } => Ok(children),
            other => Ok(vec![other]),
        }
    }

    fn if_block(&mut self, token: &SqlToken, expression: &str) -> TwoWayResult<SqlNode> {
        let if_branch = Branch {
            directive: self.directive(token, expression)?,
            body: self.block_body()?,
        };
        let mut elseif_branches = Vec::new();
        let mut else_branch: Option<ElseBranch> = None;
        loop {
            let next = self.next();
            match next.kind {
                SqlTokenKind::Elseif(ref e) if else_branch.is_none() => {
                    let directive = self.directive(&next, e)?;
                    elseif_branches.push(Branch {
                        directive,
                        body: self.block_body()?,
                    });
                }
                SqlTokenKind::Else if else_branch.is_none() => {
                    else_branch = Some(ElseBranch {
                        text: next.text,
                        body: self.block_body()?,
                    });
                }
                SqlTokenKind::End => {
                    return Ok(SqlNode::IfBlock {
                        if_branch,
                        elseif_branches,
                        else_branch,
                        end: next.text,
                    });
                }
                SqlTokenKind::Elseif(_) | SqlTokenKind::Else => {
                    return Err(self.error(next.position, format!("`{}` after `/*%else*/`", next.text)));
                }
                SqlTokenKind::Eof => {
                    return Err(self.error(token.position, format!("`{}` is not closed by `/*%end*/`", token.text)));
                }
                _ => {
                    return Err(self.error(next.position, format!("`{}` crosses an `/*%if*/` block", next.text)));
                }
            }
        }
    }

    fn for_block(&mut self, token: &SqlToken, identifier: &str, expression: &str) -> TwoWayResult<SqlNode> {
        let directive = self.directive(token, expression)?;
        let body = self.block_body()?;
        let end = self.next();
        match end.kind {
            SqlTokenKind::End => Ok(SqlNode::ForBlock {
                directive,
                identifier: identifier.to_string(),
                body,
                end: end.text,
            }),
            SqlTokenKind::Eof => Err(self.error(token.position, format!("`{}` is not closed by `/*%end*/`", token.text))),
            _ => Err(self.error(end.position, format!("`{}` is not allowed in a `/*%for*/` block", end.text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let templates = [
            "select * from t",
            "SELECT a, b FROM t WHERE a = /*a*/1 AND b = /*b*/'x' ORDER BY a",
            "select * from t where /*%if a != null*/a = /*a*/0/*%elseif b*/b = 1/*%else*/c = 2/*%end*/",
            "select * from t where id in /*ids*/(1, 2, 3) for update",
            "select /*%expand \"t\"*/* from t -- note\n union all select * from u",
            "select * from t where /*%for x in xs*/name = /*x*/'a'/*%if x_has_next*/ or /*%end*//*%end*/",
            "/* header */ select count(*) from (select 1 from dual) x order by /*#sort*/",
            "select /*^n*/1, /*+ hint */ 'a''b' from t group by a having count(*) > 1",
        ];
        for t in templates {
            assert_eq!(parse(t).unwrap().to_text(), t, "{}", t);
        }
    }

    #[test]
    fn test_clause_structure() {
        let ast = parse("select a from t where x = 1 and y = 2").unwrap();
        let SqlNode::Statement { children } = ast else { panic!() };
        assert_eq!(children.len(), 3);
        let SqlNode::Keyword { kind, children: where_children, .. } = &children[2] else { panic!() };
        assert_eq!(*kind, ClauseKind::Where);
        assert!(where_children
            .iter()
            .any(|n| matches!(n, SqlNode::Keyword { kind: ClauseKind::And, .. })));
    }

    #[test]
    fn test_set_operator() {
        let ast = parse("select 1 union select 2").unwrap();
        assert!(matches!(ast, SqlNode::SetOp { kind: SetOpKind::Union, .. }));
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse("select (a from t").unwrap_err();
        assert!(err.to_string().contains("parenthesis is not closed"));
    }

    #[test]
    fn test_unexpected_close_paren() {
        assert!(parse("select a) from t").is_err());
    }

    #[test]
    fn test_unmatched_block_directives() {
        assert!(parse("select 1 /*%end*/").is_err());
        assert!(parse("select 1 /*%else*/").is_err());
        assert!(parse("select 1 /*%elseif a*/").is_err());
        assert!(parse("select 1 /*%if a*/ x").is_err());
        assert!(parse("select 1 /*%for x in xs*/ x").is_err());
        assert!(parse("/*%if a*/1/*%else*/2/*%else*/3/*%end*/").is_err());
        assert!(parse("/*%if a*/(1/*%end*/)").is_err());
    }

    #[test]
    fn test_directive_requires_test_value() {
        assert!(parse("select /*^n*/ from t").is_err());
        assert!(parse("select /*%expand*/a from t").is_err());
    }

    #[test]
    fn test_bind_separated_from_test_value() {
        let err = parse("select * from t where id = /*id*/ 1").unwrap_err();
        assert!(matches!(err, TwoWayError::Parse { .. }));
        assert!(err.to_string().contains("must be followed by a test value"), "{}", err);
    }

    #[test]
    fn test_signed_test_value() {
        let ast = parse("select * from t where n > /*n*/-1").unwrap();
        assert_eq!(ast.to_text(), "select * from t where n > /*n*/-1");
        let SqlNode::Statement { children } = ast else { panic!() };
        let SqlNode::Keyword { children: where_children, .. } = &children[2] else { panic!() };
        let Some(SqlNode::BindValue { placeholder, .. }) = where_children.last() else { panic!() };
        assert_eq!(placeholder.to_text(), "-1");
    }

    #[test]
    fn test_prose_comment_before_word() {
        let t = "select * from t where /* the id */id = 1";
        assert_eq!(parse(t).unwrap().to_text(), t);
    }

    #[test]
    fn test_bad_directive_expression() {
        let err = parse("select 1 /*%if a &&*/ x /*%end*/").unwrap_err();
        assert!(matches!(err, TwoWayError::Parse { .. }));
    }
}
