//! Two-way SQL templates.
//!
//! A template is plain, executable SQL whose comments carry directives:
//!
//! ```text
//! select /*%expand*/* from emp where name = /*name*/'smith'
//!        ─────┬─────                        ─────┬──────────
//!             │                                  └── bind value; 'smith' is the test value
//!             └── replaced by the entity's column list
//! ```
//!
//! [`parser::parse`] builds a lossless AST, [`renderer::SqlRenderer`] folds
//! it into a [`BoundSql`], and [`rewriter`] derives paging and counting
//! variants from the same AST.

pub mod ast;
pub mod parser;
pub mod renderer;
pub mod rewriter;
pub mod tokenizer;

pub use ast::{ClauseKind, SetOpKind, SqlNode, TokenKind};
pub use parser::parse;
pub use renderer::{BoundSql, ColumnExpander, SqlRenderer};
pub use rewriter::{rewrite_for_count, rewrite_for_pagination};

use crate::dialect::Dialect;
use crate::error::TwoWayResult;
use crate::expr::{ExprContext, ExprEvaluator};

/// Render with the default evaluator and dialect.
pub fn render(ast: &SqlNode, ctx: &ExprContext, expander: Option<ColumnExpander<'_>>) -> TwoWayResult<BoundSql> {
    let evaluator = ExprEvaluator::default();
    let renderer = SqlRenderer::new(&evaluator, Dialect::default());
    match expander {
        Some(e) => renderer.with_expander(e).render(ast, ctx),
        None => renderer.render(ast, ctx),
    }
}
