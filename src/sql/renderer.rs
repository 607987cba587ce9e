//! Directive-driven rendering of a template AST.

use serde::Serialize;
use tracing::debug;

use super::ast::{Directive, SqlNode};
use crate::dialect::Dialect;
use crate::error::{TwoWayError, TwoWayResult};
use crate::expr::{ExprContext, ExprEvaluator};
use crate::value::{DataType, TypedValue, Value};

/// Maps an alias prefix (`""` or `"a."`) to qualified column names.
pub type ColumnExpander<'a> = &'a dyn Fn(&str) -> Vec<String>;

/// Executable SQL: text with `?` placeholders, the values to bind in order,
/// and the same statement with literals inlined for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundSql {
    pub text: String,
    pub values: Vec<TypedValue>,
    pub log: String,
}

#[derive(Debug, Default)]
struct State {
    text: String,
    log: String,
    values: Vec<TypedValue>,
    /// Set once anything other than whitespace or a comment was written.
    available: bool,
}

impl State {
    fn push_sql(&mut self, sql: &str) {
        self.text.push_str(sql);
        self.log.push_str(sql);
    }

    fn bind(&mut self, value: TypedValue, dialect: Dialect) {
        self.text.push('?');
        self.log.push_str(&dialect.format_value(&value));
        self.values.push(value);
    }

    fn append(&mut self, other: State) {
        self.text.push_str(&other.text);
        self.log.push_str(&other.log);
        self.values.extend(other.values);
    }
}

/// Renders templates against an expression context.
pub struct SqlRenderer<'a> {
    evaluator: &'a ExprEvaluator,
    dialect: Dialect,
    expander: Option<ColumnExpander<'a>>,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(evaluator: &'a ExprEvaluator, dialect: Dialect) -> Self {
        Self {
            evaluator,
            dialect,
            expander: None,
        }
    }

    pub fn with_expander(mut self, expander: ColumnExpander<'a>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn render(&self, ast: &SqlNode, ctx: &ExprContext) -> TwoWayResult<BoundSql> {
        let mut ctx = ctx.clone();
        let mut state = State::default();
        self.visit(ast, &mut state, &mut ctx)?;
        debug!(sql = %state.text, values = state.values.len(), "rendered template");
        Ok(BoundSql {
            text: state.text,
            values: state.values,
            log: state.log,
        })
    }

    fn visit_all(&self, nodes: &[SqlNode], state: &mut State, ctx: &mut ExprContext) -> TwoWayResult<()> {
        for node in nodes {
            self.visit(node, state, ctx)?;
        }
        Ok(())
    }

    fn visit(&self, node: &SqlNode, state: &mut State, ctx: &mut ExprContext) -> TwoWayResult<()> {
        match node {
            SqlNode::Statement { children } => self.visit_all(children, state, ctx)?,
            SqlNode::SetOp { keyword, left, right, .. } => {
                self.visit(left, state, ctx)?;
                state.push_sql(keyword);
                self.visit(right, state, ctx)?;
                state.available = true;
            }
            SqlNode::Keyword { kind, keyword, children } if kind.is_logical() => {
                if state.available {
                    state.push_sql(keyword);
                }
                self.visit_all(children, state, ctx)?;
            }
            SqlNode::Keyword { keyword, children, .. } => {
                let mut clause = State::default();
                self.visit_all(children, &mut clause, ctx)?;
                if clause.available {
                    state.push_sql(keyword);
                    state.append(clause);
                    state.available = true;
                }
            }
            SqlNode::ForUpdate { keyword, children } => {
                state.push_sql(keyword);
                self.visit_all(children, state, ctx)?;
                state.available = true;
            }
            SqlNode::Token { kind, text } => {
                state.push_sql(text);
                if kind.is_content() {
                    state.available = true;
                }
            }
            SqlNode::Paren { inner } => {
                let mut nested = State::default();
                self.visit(inner, &mut nested, ctx)?;
                state.push_sql("(");
                state.append(nested);
                state.push_sql(")");
                state.available = true;
            }
            SqlNode::BindValue { directive, .. } => {
                let value = self.evaluator.evaluate(&directive.expression, ctx)?;
                match value.value {
                    Value::List(items) if items.is_empty() => state.push_sql("(null)"),
                    Value::List(items) => {
                        state.push_sql("(");
                        for (i, item) in items.into_iter().enumerate() {
                            if i > 0 {
                                state.push_sql(", ");
                            }
                            state.bind(TypedValue::from(item), self.dialect);
                        }
                        state.push_sql(")");
                    }
                    _ => state.bind(value, self.dialect),
                }
                state.available = true;
            }
            SqlNode::EmbeddedValue { directive } => {
                let value = self.evaluator.evaluate(&directive.expression, ctx)?;
                if !value.value.is_null() {
                    let fragment = value.value.to_plain_string();
                    check_embeddable(directive, &fragment)?;
                    state.push_sql(&fragment);
                    if !fragment.trim().is_empty() {
                        state.available = true;
                    }
                }
            }
            SqlNode::LiteralValue { directive, .. } => {
                let value = self.evaluator.evaluate(&directive.expression, ctx)?;
                state.push_sql(&self.dialect.format_value(&value));
                state.available = true;
            }
            SqlNode::Expand { directive, placeholder } => {
                let Some(expander) = self.expander else {
                    debug!(directive = %directive.text, "no column expander, keeping placeholder");
                    self.visit(placeholder, state, ctx)?;
                    return Ok(());
                };
                let alias = self.evaluator.evaluate(&directive.expression, ctx)?;
                let prefix = match alias.value.to_plain_string() {
                    a if alias.value.is_null() || a.is_empty() => String::new(),
                    a => format!("{}.", a),
                };
                let columns = expander(&prefix);
                if !columns.is_empty() {
                    state.push_sql(&columns.join(", "));
                    state.available = true;
                }
            }
            SqlNode::IfBlock {
                if_branch,
                elseif_branches,
                else_branch,
                ..
            } => {
                for branch in std::iter::once(if_branch).chain(elseif_branches) {
                    if self.condition(&branch.directive, ctx)? {
                        return self.visit_all(&branch.body, state, ctx);
                    }
                }
                if let Some(e) = else_branch {
                    self.visit_all(&e.body, state, ctx)?;
                }
            }
            SqlNode::ForBlock {
                directive,
                identifier,
                body,
                ..
            } => self.visit_for(directive, identifier, body, state, ctx)?,
        }
        Ok(())
    }

    fn condition(&self, directive: &Directive, ctx: &ExprContext) -> TwoWayResult<bool> {
        let value = self.evaluator.evaluate(&directive.expression, ctx)?;
        match value.value {
            Value::Bool(b) => Ok(b),
            Value::Null => Err(TwoWayError::eval(
                &directive.location,
                format!("the condition of `{}` is null", directive.text),
            )),
            other => Err(TwoWayError::eval(
                &directive.location,
                format!(
                    "the condition of `{}` is not Boolean but {}",
                    directive.text,
                    other.data_type()
                ),
            )),
        }
    }

    fn visit_for(
        &self,
        directive: &Directive,
        identifier: &str,
        body: &[SqlNode],
        state: &mut State,
        ctx: &mut ExprContext,
    ) -> TwoWayResult<()> {
        let value = self.evaluator.evaluate(&directive.expression, ctx)?;
        let Value::List(items) = value.value else {
            return Err(TwoWayError::eval(
                &directive.location,
                format!(
                    "the expression of `{}` is not a List but {}",
                    directive.text,
                    value.value.data_type()
                ),
            ));
        };

        let index_name = format!("{}_index", identifier);
        let has_next_name = format!("{}_has_next", identifier);
        let shadowed: Vec<(String, Option<TypedValue>)> = [identifier.to_string(), index_name.clone(), has_next_name.clone()]
            .into_iter()
            .map(|name| {
                let previous = ctx.get(&name).cloned();
                (name, previous)
            })
            .collect();

        let len = items.len();
        let mut result = Ok(());
        for (i, item) in items.into_iter().enumerate() {
            ctx.insert_typed(identifier, TypedValue::from(item));
            ctx.insert_typed(index_name.as_str(), TypedValue::new(Value::Int(i as i32), DataType::Int));
            ctx.insert_typed(has_next_name.as_str(), TypedValue::new(Value::Bool(i + 1 < len), DataType::Boolean));
            result = self.visit_all(body, state, ctx);
            if result.is_err() {
                break;
            }
        }

        for (name, previous) in shadowed {
            match previous {
                Some(v) => {
                    ctx.insert_typed(name, v);
                }
                None => {
                    ctx.remove(&name);
                }
            }
        }
        result
    }
}

/// Reject fragments that could end or comment out the surrounding statement.
fn check_embeddable(directive: &Directive, fragment: &str) -> TwoWayResult<()> {
    for forbidden in ["'", ";", "--", "/*"] {
        if fragment.contains(forbidden) {
            return Err(TwoWayError::eval(
                &directive.location,
                format!(
                    "the embedded value of `{}` contains `{}`, which is not allowed",
                    directive.text, forbidden
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse;
    use pretty_assertions::assert_eq;

    fn render(template: &str, ctx: &ExprContext) -> BoundSql {
        let evaluator = ExprEvaluator::default();
        let ast = parse(template).unwrap();
        SqlRenderer::new(&evaluator, Dialect::Postgres).render(&ast, ctx).unwrap()
    }

    #[test]
    fn test_bind_value() {
        let ctx = ExprContext::new().with("name", "Alice");
        let sql = render("select * from emp where name = /*name*/'x'", &ctx);
        assert_eq!(sql.text, "select * from emp where name = ?");
        assert_eq!(sql.log, "select * from emp where name = 'Alice'");
        assert_eq!(sql.values, vec![TypedValue::of("Alice")]);
    }

    #[test]
    fn test_bind_list() {
        let ctx = ExprContext::new().with("ids", vec![1, 2, 3]);
        let sql = render("select * from emp where id in /*ids*/(0)", &ctx);
        assert_eq!(sql.text, "select * from emp where id in (?, ?, ?)");
        assert_eq!(sql.values.len(), 3);

        let ctx = ExprContext::new().with("ids", Vec::<i32>::new());
        let sql = render("select * from emp where id in /*ids*/(0)", &ctx);
        assert_eq!(sql.text, "select * from emp where id in (null)");
        assert_eq!(sql.log, "select * from emp where id in (null)");
        assert!(sql.values.is_empty());
    }

    #[test]
    fn test_where_clause_elided() {
        let ctx = ExprContext::new().with("name", Value::Null);
        let sql = render(
            "select * from emp where /*%if name != null*/name = /*name*/'x'/*%end*/",
            &ctx,
        );
        assert_eq!(sql.text, "select * from emp ");
    }

    #[test]
    fn test_leading_and_dropped() {
        let ctx = ExprContext::new().with("a", Value::Null).with("b", 2);
        let sql = render(
            "select * from t where /*%if a != null*/a = /*a*/1/*%end*/ /*%if b != null*/and b = /*b*/1/*%end*/",
            &ctx,
        );
        assert_eq!(sql.text, "select * from t where   b = ?");
    }

    #[test]
    fn test_elseif_else() {
        let template = "select * from t where /*%if n == 1*/a/*%elseif n == 2*/b/*%else*/c/*%end*/ = 0";
        assert_eq!(render(template, &ExprContext::new().with("n", 1)).text, "select * from t where a = 0");
        assert_eq!(render(template, &ExprContext::new().with("n", 2)).text, "select * from t where b = 0");
        assert_eq!(render(template, &ExprContext::new().with("n", 3)).text, "select * from t where c = 0");
    }

    #[test]
    fn test_for_block() {
        let mut ctx = ExprContext::new().with("names", vec!["a", "b"]);
        ctx.insert("name", "outer");
        let evaluator = ExprEvaluator::default();
        let ast = parse(
            "select * from t where /*%for name in names*/n = /*name*/'x'/*%if name_has_next*/ or /*%end*//*%end*/",
        )
        .unwrap();
        let sql = SqlRenderer::new(&evaluator, Dialect::Postgres).render(&ast, &ctx).unwrap();
        assert_eq!(sql.text, "select * from t where n = ? or n = ?");
        assert_eq!(sql.values, vec![TypedValue::of("a"), TypedValue::of("b")]);
        // the caller's context is untouched
        assert_eq!(ctx.get("name").unwrap().value, Value::from("outer"));
    }

    #[test]
    fn test_for_index_binding() {
        let ctx = ExprContext::new().with("xs", vec![10, 20]);
        let sql = render("select /*%for x in xs*//*^x_index*/0/*%if x_has_next*/,/*%end*//*%end*/", &ctx);
        assert_eq!(sql.text, "select 0,1");
    }

    #[test]
    fn test_for_requires_list() {
        let evaluator = ExprEvaluator::default();
        let ast = parse("select /*%for x in xs*/1/*%end*/").unwrap();
        let ctx = ExprContext::new().with("xs", 1);
        let err = SqlRenderer::new(&evaluator, Dialect::Postgres).render(&ast, &ctx).unwrap_err();
        assert!(err.to_string().contains("not a List"));
    }

    #[test]
    fn test_embedded_value() {
        let ctx = ExprContext::new().with("sort", "name desc");
        let sql = render("select * from t order by /*#sort*/", &ctx);
        assert_eq!(sql.text, "select * from t order by name desc");

        let ctx = ExprContext::new().with("sort", Value::Null);
        let sql = render("select * from t order by /*#sort*/", &ctx);
        assert_eq!(sql.text, "select * from t ");
    }

    #[test]
    fn test_embedded_value_rejects_injection() {
        let evaluator = ExprEvaluator::default();
        let ast = parse("select * from t order by /*#sort*/").unwrap();
        let ctx = ExprContext::new().with("sort", "1; drop table t");
        let err = SqlRenderer::new(&evaluator, Dialect::Postgres).render(&ast, &ctx).unwrap_err();
        assert!(matches!(err, TwoWayError::Evaluation { .. }));
    }

    #[test]
    fn test_literal_value() {
        let ctx = ExprContext::new().with("kind", "it's");
        let sql = render("select * from t where kind = /*^kind*/'x'", &ctx);
        assert_eq!(sql.text, "select * from t where kind = 'it''s'");
        assert!(sql.values.is_empty());
    }

    #[test]
    fn test_expand() {
        let evaluator = ExprEvaluator::default();
        let expander = |p: &str| vec![format!("{}id", p), format!("{}name", p)];
        let renderer = SqlRenderer::new(&evaluator, Dialect::Postgres).with_expander(&expander);
        let ast = parse("select /*%expand \"e\"*/* from emp e").unwrap();
        let sql = renderer.render(&ast, &ExprContext::new()).unwrap();
        assert_eq!(sql.text, "select e.id, e.name from emp e");
    }

    #[test]
    fn test_non_boolean_condition() {
        let evaluator = ExprEvaluator::default();
        let ast = parse("select 1 /*%if n*/x/*%end*/").unwrap();
        let ctx = ExprContext::new().with("n", 1);
        let err = SqlRenderer::new(&evaluator, Dialect::Postgres).render(&ast, &ctx).unwrap_err();
        assert!(err.to_string().contains("is not Boolean but Int"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let ctx = ExprContext::new().with("a", 1).with("b", vec!["x", "y"]);
        let t = "select * from t where a = /*a*/0 and b in /*b*/('z')";
        assert_eq!(render(t, &ctx), render(t, &ctx));
    }
}
