//! Expression AST.

use std::fmt;

use serde::Serialize;

use crate::error::Location;
use crate::value::{DataType, Value};

/// Binary operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Lt => "<",
        }
    }
}

/// A node of a parsed expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum ExprNode {
    Literal {
        location: Location,
        value: Value,
        data_type: DataType,
    },
    ValueRef {
        location: Location,
        name: String,
    },
    Not {
        location: Location,
        operand: Box<ExprNode>,
    },
    Binary {
        location: Location,
        op: BinaryOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    PropertyAccess {
        location: Location,
        receiver: Box<ExprNode>,
        name: String,
        /// `?.`: a null receiver yields null instead of failing.
        safe: bool,
    },
    FunctionCall {
        location: Location,
        receiver: Box<ExprNode>,
        name: String,
        args: Box<ExprNode>,
        safe: bool,
    },
    ArgList {
        location: Location,
        nodes: Vec<ExprNode>,
    },
    Empty {
        location: Location,
    },
}

impl ExprNode {
    pub fn location(&self) -> &Location {
        match self {
            ExprNode::Literal { location, .. }
            | ExprNode::ValueRef { location, .. }
            | ExprNode::Not { location, .. }
            | ExprNode::Binary { location, .. }
            | ExprNode::PropertyAccess { location, .. }
            | ExprNode::FunctionCall { location, .. }
            | ExprNode::ArgList { location, .. }
            | ExprNode::Empty { location } => location,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ExprNode::Empty { .. })
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Literal { value, data_type, .. } => match (value, data_type) {
                (Value::String(s), _) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
                (Value::Char(c), _) => write!(f, "'{}'", c),
                (Value::Long(n), _) => write!(f, "{}L", n),
                (Value::Float(n), _) => write!(f, "{}F", n),
                (Value::Double(n), _) => write!(f, "{}D", n),
                (v, _) => write!(f, "{}", v),
            },
            ExprNode::ValueRef { name, .. } => write!(f, "{}", name),
            ExprNode::Not { operand, .. } => write!(f, "!{}", operand),
            ExprNode::Binary { op, left, right, .. } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ExprNode::PropertyAccess {
                receiver, name, safe, ..
            } => write!(f, "{}{}{}", receiver, if *safe { "?." } else { "." }, name),
            ExprNode::FunctionCall {
                receiver,
                name,
                args,
                safe,
                ..
            } => {
                let dot = if *safe { "?." } else { "." };
                write!(f, "{}{}{}({})", receiver, dot, name, args)
            }
            ExprNode::ArgList { nodes, .. } => {
                for (i, n) in nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", n)?;
                }
                Ok(())
            }
            ExprNode::Empty { .. } => Ok(()),
        }
    }
}
