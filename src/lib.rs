//! # qail-twoway — Two-way SQL
//!
//! > **Plain SQL in, bound statements out.**
//!
//! A two-way template is SQL that runs as-is in any SQL tool: directives
//! live inside comments and every bind site carries a test value. At
//! runtime the directives are evaluated against a context and the test
//! values are replaced by `?` placeholders.
//!
//! ```text
//! select /*%expand*/* from emp where
//! /*%if name != null*/ name like /*name.asPrefix()*/'S%' /*%end*/
//!                │                        │
//!      sql::parse│                        │ expr::parse_expression
//!                ▼                        ▼
//!            SqlNode tree  ──render──▶  BoundSql { text, values, log }
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use qail_twoway::prelude::*;
//!
//! let engine = TemplateEngine::new(Dialect::Postgres);
//! let sql = engine
//!     .query("select * from emp where id = /*id*/0")
//!     .bind("id", 7)
//!     .render()?;
//! // sql.text => "select * from emp where id = ?"
//! // sql.log  => "select * from emp where id = 7"
//! ```
//!
//! The [`entity`] module compiles entity metadata into insert, update,
//! delete, upsert and merge statements with optimistic locking.
//!
//! ## Directives
//!
//! | Directive              | Meaning                              |
//! |------------------------|--------------------------------------|
//! | `/*expr*/test`         | Bind value (`?`)                     |
//! | `/*#expr*/`            | Embedded SQL fragment                |
//! | `/*^expr*/test`        | Inlined literal                      |
//! | `/*%expand*/*`         | Column list                          |
//! | `/*%if*/ … /*%end*/`   | Conditional, with `elseif` / `else`  |
//! | `/*%for x in xs*/`     | Loop, with `x_index` / `x_has_next`  |

pub mod config;
pub mod dialect;
pub mod engine;
pub mod entity;
pub mod error;
pub mod expr;
pub mod sql;
pub mod value;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dialect::Dialect;
    pub use crate::engine::{TemplateEngine, TemplateQuery};
    pub use crate::entity::{
        Entity, EntityCompiler, EntityMeta, EntityOptions, EntityStore, Executor, MetaRegistry, PropKind, PropMeta,
        UpsertAction,
    };
    pub use crate::error::*;
    pub use crate::expr::{ExprContext, ExprEvaluator};
    pub use crate::sql::{BoundSql, SqlNode};
    pub use crate::value::{DataType, TypedValue, Value};
}

/// Parse a two-way template into its AST.
///
/// # Example
///
/// ```
/// use qail_twoway::parse;
///
/// let ast = parse("select * from emp where id = /*id*/0").unwrap();
/// assert_eq!(ast.to_text(), "select * from emp where id = /*id*/0");
/// ```
pub fn parse(template: &str) -> error::TwoWayResult<sql::SqlNode> {
    sql::parse(template)
}

/// Parse and render a template with the default dialect.
///
/// # Example
///
/// ```
/// use qail_twoway::{expr::ExprContext, render};
///
/// let ctx = ExprContext::new().with("id", 7);
/// let sql = render("select * from emp where id = /*id*/0", &ctx).unwrap();
/// assert_eq!(sql.text, "select * from emp where id = ?");
/// ```
pub fn render(template: &str, ctx: &expr::ExprContext) -> error::TwoWayResult<sql::BoundSql> {
    sql::render(&sql::parse(template)?, ctx, None)
}

/// Evaluate a directive expression with the default resolver.
pub fn evaluate(expression: &str, ctx: &expr::ExprContext) -> error::TwoWayResult<value::TypedValue> {
    expr::evaluate(expression, ctx)
}
