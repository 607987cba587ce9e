//! The expression language embedded in template directives.
//!
//! ```text
//! /*%if name != null && name.startsWith("A") */
//!       ──┬─ ──┬─ ──┬─ ──┬─ ───────┬──────
//!         │    │    │    │         └── function call through the resolver
//!         │    │    │    └── logical operator (Boolean operands only)
//!         │    │    └── literal
//!         │    └── comparison / equality
//!         └── value reference, resolved from the context
//! ```
//!
//! Pipeline: [`tokenizer`] → [`parser`] → [`evaluator`], with member lookup
//! delegated to a [`resolver::MemberResolver`].

pub mod ast;
pub mod evaluator;
pub mod parser;
pub mod resolver;
pub mod tokenizer;

pub use ast::{BinaryOp, ExprNode};
pub use evaluator::{ExprContext, ExprEvaluator};
pub use parser::parse_expression;
pub use resolver::{DefaultResolver, MemberResolver, ResolveError};

use crate::error::TwoWayResult;
use crate::value::TypedValue;

/// Evaluate an expression with the default resolver.
pub fn evaluate(expression: &str, ctx: &ExprContext) -> TwoWayResult<TypedValue> {
    ExprEvaluator::default().evaluate_str(expression, ctx)
}
