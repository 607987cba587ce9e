//! Tree-walking evaluator for directive expressions.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{BinaryOp, ExprNode};
use super::parser::parse_expression;
use super::resolver::{DefaultResolver, MemberResolver};
use crate::error::{Location, TwoWayError, TwoWayResult};
use crate::value::{DataType, TypedValue, Value};

/// Name → typed value bindings visible to an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprContext {
    values: HashMap<String, TypedValue>,
}

impl ExprContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a value of its natural type.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<TypedValue> {
        self.values.insert(name.into(), TypedValue::of(value))
    }

    /// Bind `name` to a value with an explicit declared type.
    pub fn insert_typed(&mut self, name: impl Into<String>, value: TypedValue) -> Option<TypedValue> {
        self.values.insert(name.into(), value)
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<TypedValue> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ExprContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = ExprContext::new();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}

/// Evaluates expression trees against a context.
///
/// Names missing from the supplied context fall back to the evaluator's
/// default context and then to a null of type `Any`.
#[derive(Clone)]
pub struct ExprEvaluator {
    resolver: Arc<dyn MemberResolver>,
    defaults: ExprContext,
}

impl std::fmt::Debug for ExprEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprEvaluator")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Default for ExprEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultResolver::default()))
    }
}

impl ExprEvaluator {
    pub fn new(resolver: Arc<dyn MemberResolver>) -> Self {
        Self {
            resolver,
            defaults: ExprContext::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: ExprContext) -> Self {
        self.defaults = defaults;
        self
    }

    /// Parse and evaluate an expression string.
    pub fn evaluate_str(&self, expression: &str, ctx: &ExprContext) -> TwoWayResult<TypedValue> {
        let node = parse_expression(expression)?;
        self.evaluate(&node, ctx)
    }

    pub fn evaluate(&self, node: &ExprNode, ctx: &ExprContext) -> TwoWayResult<TypedValue> {
        match node {
            ExprNode::Literal { value, data_type, .. } => Ok(TypedValue::new(value.clone(), *data_type)),
            ExprNode::ValueRef { name, .. } => Ok(ctx
                .get(name)
                .or_else(|| self.defaults.get(name))
                .cloned()
                .unwrap_or_else(|| TypedValue::null(DataType::Any))),
            ExprNode::Not { location, operand } => {
                let v = self.evaluate(operand, ctx)?;
                let b = Self::require_bool(location, "operand of `!`", &v)?;
                Ok(TypedValue::of(!b))
            }
            ExprNode::Binary {
                location,
                op,
                left,
                right,
            } => self.binary(location, *op, left, right, ctx),
            ExprNode::PropertyAccess {
                location,
                receiver,
                name,
                safe,
            } => {
                let recv = self.evaluate(receiver, ctx)?;
                if recv.value.is_null() {
                    return if *safe {
                        Ok(TypedValue::null(DataType::Any))
                    } else {
                        Err(TwoWayError::eval(
                            location,
                            format!("cannot read property `{}` of a null receiver `{}`", name, receiver),
                        ))
                    };
                }
                self.resolver.find_property(&recv, name).map_err(|e| {
                    TwoWayError::eval_caused(location, format!("failed to resolve property `{}`", name), e)
                })
            }
            ExprNode::FunctionCall {
                location,
                receiver,
                name,
                args,
                safe,
            } => {
                let recv = self.evaluate(receiver, ctx)?;
                if recv.value.is_null() {
                    return if *safe {
                        Ok(TypedValue::null(DataType::Any))
                    } else {
                        Err(TwoWayError::eval(
                            location,
                            format!("cannot call function `{}` on a null receiver `{}`", name, receiver),
                        ))
                    };
                }
                let args = match args.as_ref() {
                    ExprNode::Empty { .. } => Vec::new(),
                    ExprNode::ArgList { nodes, .. } => nodes
                        .iter()
                        .map(|n| self.evaluate(n, ctx))
                        .collect::<TwoWayResult<Vec<_>>>()?,
                    single => vec![self.evaluate(single, ctx)?],
                };
                self.resolver.find_function(&recv, name, &args).map_err(|e| {
                    TwoWayError::eval_caused(location, format!("failed to call function `{}`", name), e)
                })
            }
            ExprNode::ArgList { nodes, .. } => {
                let items = nodes
                    .iter()
                    .map(|n| self.evaluate(n, ctx).map(|tv| tv.value))
                    .collect::<TwoWayResult<Vec<_>>>()?;
                Ok(TypedValue::new(Value::List(items), DataType::List))
            }
            ExprNode::Empty { .. } => Ok(TypedValue::null(DataType::Any)),
        }
    }

    fn binary(
        &self,
        location: &Location,
        op: BinaryOp,
        left: &ExprNode,
        right: &ExprNode,
        ctx: &ExprContext,
    ) -> TwoWayResult<TypedValue> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let l = self.evaluate(left, ctx)?;
                let lb = Self::require_bool(location, &format!("left operand of `{}`", op.symbol()), &l)?;
                // short-circuit
                if (op == BinaryOp::And && !lb) || (op == BinaryOp::Or && lb) {
                    return Ok(TypedValue::of(lb));
                }
                let r = self.evaluate(right, ctx)?;
                let rb = Self::require_bool(location, &format!("right operand of `{}`", op.symbol()), &r)?;
                Ok(TypedValue::of(rb))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let equal = l.value == r.value;
                Ok(TypedValue::of(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Ge | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Lt => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                if l.value.is_null() {
                    return Err(TwoWayError::eval(
                        location,
                        format!("the left operand `{}` of `{}` is null", left, op.symbol()),
                    ));
                }
                if r.value.is_null() {
                    return Err(TwoWayError::eval(
                        location,
                        format!("the right operand `{}` of `{}` is null", right, op.symbol()),
                    ));
                }
                let ordering = l.value.compare(&r.value).ok_or_else(|| {
                    TwoWayError::eval(
                        location,
                        format!(
                            "the operands of `{}` are not comparable: {} and {}",
                            op.symbol(),
                            l.value.data_type(),
                            r.value.data_type()
                        ),
                    )
                })?;
                let result = match op {
                    BinaryOp::Ge => ordering != Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => ordering == Ordering::Less,
                };
                Ok(TypedValue::of(result))
            }
        }
    }

    fn require_bool(location: &Location, what: &str, v: &TypedValue) -> TwoWayResult<bool> {
        match &v.value {
            Value::Bool(b) => Ok(*b),
            Value::Null => Err(TwoWayError::eval(location, format!("the {} is null", what))),
            other => Err(TwoWayError::eval(
                location,
                format!("the {} is not Boolean but {}", what, other.data_type()),
            )),
        }
    }
}
