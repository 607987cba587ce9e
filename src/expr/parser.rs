//! Reducer-stack parser for directive expressions.
//!
//! Operands go on one stack, operators ("reducers") on another. Before a
//! binary operator is pushed, every pending reducer whose priority is at
//! least its own is applied, which keeps equal-priority operators
//! left-associative. Parenthesized groups are parsed recursively with
//! fresh stacks.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::ast::{BinaryOp, ExprNode};
use super::tokenizer::{ExprToken, ExprTokenKind, tokenize};
use crate::error::{Location, TwoWayError, TwoWayResult};
use crate::value::{DataType, Value};

const PRIORITY_MEMBER: u8 = 100;
const PRIORITY_NOT: u8 = 50;
const PRIORITY_COMPARISON: u8 = 40;
const PRIORITY_AND: u8 = 20;
const PRIORITY_OR: u8 = 10;
const PRIORITY_COMMA: u8 = 0;

#[derive(Debug)]
enum ReducerKind {
    Not,
    Binary(BinaryOp),
    Property { name: String, safe: bool },
    Function { name: String, safe: bool },
    Comma,
}

#[derive(Debug)]
struct Reducer {
    kind: ReducerKind,
    location: Location,
}

impl Reducer {
    fn priority(&self) -> u8 {
        match &self.kind {
            ReducerKind::Property { .. } | ReducerKind::Function { .. } => PRIORITY_MEMBER,
            ReducerKind::Not => PRIORITY_NOT,
            ReducerKind::Binary(BinaryOp::And) => PRIORITY_AND,
            ReducerKind::Binary(BinaryOp::Or) => PRIORITY_OR,
            ReducerKind::Binary(_) => PRIORITY_COMPARISON,
            ReducerKind::Comma => PRIORITY_COMMA,
        }
    }

    fn reduce(self, operands: &mut Vec<ExprNode>) -> TwoWayResult<ExprNode> {
        let location = self.location;
        let mut pop = |location: &Location| {
            operands.pop().ok_or_else(|| {
                TwoWayError::parse(&location.text, location.position, "operand not found")
            })
        };
        let node = match self.kind {
            ReducerKind::Not => ExprNode::Not {
                operand: Box::new(pop(&location)?),
                location,
            },
            ReducerKind::Binary(op) => {
                let right = pop(&location)?;
                let left = pop(&location)?;
                ExprNode::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    location,
                }
            }
            ReducerKind::Property { name, safe } => ExprNode::PropertyAccess {
                receiver: Box::new(pop(&location)?),
                name,
                safe,
                location,
            },
            ReducerKind::Function { name, safe } => {
                let args = pop(&location)?;
                let receiver = pop(&location)?;
                ExprNode::FunctionCall {
                    receiver: Box::new(receiver),
                    name,
                    args: Box::new(args),
                    safe,
                    location,
                }
            }
            ReducerKind::Comma => {
                let right = pop(&location)?;
                let left = pop(&location)?;
                let mut nodes = match left {
                    ExprNode::ArgList { nodes, .. } => nodes,
                    other => vec![other],
                };
                nodes.push(right);
                ExprNode::ArgList { nodes, location }
            }
        };
        Ok(node)
    }
}

/// Parse an expression string into an AST.
pub fn parse_expression(expression: &str) -> TwoWayResult<ExprNode> {
    let tokens = tokenize(expression)?
        .into_iter()
        .filter(|t| t.kind != ExprTokenKind::Whitespace)
        .collect::<Vec<_>>();
    let mut parser = ExprParser {
        text: Arc::from(expression),
        tokens,
        pos: 0,
    };
    let node = parser.parse_group(false)?;
    tracing::trace!(expression, node = %node, "parsed expression");
    Ok(node)
}

struct ExprParser {
    text: Arc<str>,
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprParser {
    fn location(&self, position: usize) -> Location {
        Location::new(self.text.as_ref(), position)
    }

    fn error(&self, position: usize, message: impl Into<String>) -> TwoWayError {
        TwoWayError::parse(&self.text, position, message)
    }

    /// Parse until end of input, or until the matching `)` when `nested`.
    fn parse_group(&mut self, nested: bool) -> TwoWayResult<ExprNode> {
        let start = self.tokens.get(self.pos).map(|t| t.position).unwrap_or(self.text.chars().count());
        let mut operands: Vec<ExprNode> = Vec::new();
        let mut reducers: Vec<Reducer> = Vec::new();

        loop {
            let Some(token) = self.tokens.get(self.pos).cloned() else {
                if nested {
                    return Err(self.error(start, "parenthesis is not closed"));
                }
                break;
            };
            self.pos += 1;
            let location = self.location(token.position);
            match token.kind {
                ExprTokenKind::CloseParen => {
                    if !nested {
                        return Err(self.error(token.position, "unexpected ')'"));
                    }
                    break;
                }
                ExprTokenKind::OpenParen => {
                    let inner = self.parse_group(true)?;
                    operands.push(inner);
                }
                ExprTokenKind::Not => reducers.push(Reducer {
                    kind: ReducerKind::Not,
                    location,
                }),
                ExprTokenKind::And
                | ExprTokenKind::Or
                | ExprTokenKind::Eq
                | ExprTokenKind::Ne
                | ExprTokenKind::Ge
                | ExprTokenKind::Gt
                | ExprTokenKind::Le
                | ExprTokenKind::Lt => {
                    let op = match token.kind {
                        ExprTokenKind::And => BinaryOp::And,
                        ExprTokenKind::Or => BinaryOp::Or,
                        ExprTokenKind::Eq => BinaryOp::Eq,
                        ExprTokenKind::Ne => BinaryOp::Ne,
                        ExprTokenKind::Ge => BinaryOp::Ge,
                        ExprTokenKind::Gt => BinaryOp::Gt,
                        ExprTokenKind::Le => BinaryOp::Le,
                        _ => BinaryOp::Lt,
                    };
                    let reducer = Reducer {
                        kind: ReducerKind::Binary(op),
                        location,
                    };
                    Self::push_binary(reducer, &mut operands, &mut reducers)?;
                }
                ExprTokenKind::Comma => {
                    let reducer = Reducer {
                        kind: ReducerKind::Comma,
                        location,
                    };
                    Self::push_binary(reducer, &mut operands, &mut reducers)?;
                }
                ExprTokenKind::Property | ExprTokenKind::SafeProperty => {
                    let safe = token.kind == ExprTokenKind::SafeProperty;
                    let name = token.text.trim_start_matches('?').trim_start_matches('.').to_string();
                    let reducer = Reducer {
                        kind: ReducerKind::Property { name, safe },
                        location,
                    };
                    Self::push_binary(reducer, &mut operands, &mut reducers)?;
                }
                ExprTokenKind::Function | ExprTokenKind::SafeFunction => {
                    let safe = token.kind == ExprTokenKind::SafeFunction;
                    let name = token.text.trim_start_matches('?').trim_start_matches('.').to_string();
                    let reducer = Reducer {
                        kind: ReducerKind::Function { name, safe },
                        location,
                    };
                    Self::push_binary(reducer, &mut operands, &mut reducers)?;
                    // the tokenizer guarantees '(' follows
                    self.pos += 1;
                    let args = self.parse_group(true)?;
                    operands.push(args);
                }
                _ => {
                    let node = self.operand(&token, location)?;
                    operands.push(node);
                }
            }
        }

        while let Some(reducer) = reducers.pop() {
            let node = reducer.reduce(&mut operands)?;
            operands.push(node);
        }

        match operands.len() {
            0 => Ok(ExprNode::Empty {
                location: self.location(start),
            }),
            1 => Ok(operands.remove(0)),
            _ => {
                let extra = operands[1].location().position;
                Err(self.error(extra, "unexpected operand; an operator is missing"))
            }
        }
    }

    fn push_binary(
        reducer: Reducer,
        operands: &mut Vec<ExprNode>,
        reducers: &mut Vec<Reducer>,
    ) -> TwoWayResult<()> {
        while reducers
            .last()
            .is_some_and(|pending| pending.priority() >= reducer.priority())
        {
            if let Some(pending) = reducers.pop() {
                let node = pending.reduce(operands)?;
                operands.push(node);
            }
        }
        reducers.push(reducer);
        Ok(())
    }

    fn operand(&self, token: &ExprToken, location: Location) -> TwoWayResult<ExprNode> {
        let text = token.text.as_str();
        let unsigned = text.trim_start_matches('+');
        let number_err = |_| self.error(token.position, format!("invalid numeric literal '{}'", text));
        let (value, data_type) = match token.kind {
            ExprTokenKind::Null => (Value::Null, DataType::Any),
            ExprTokenKind::True => (Value::Bool(true), DataType::Boolean),
            ExprTokenKind::False => (Value::Bool(false), DataType::Boolean),
            ExprTokenKind::CharLiteral => {
                let c = text.chars().nth(1).unwrap_or_default();
                (Value::Char(c), DataType::Char)
            }
            ExprTokenKind::StringLiteral => {
                let inner = &text[1..text.len() - 1];
                (Value::String(inner.replace("\"\"", "\"")), DataType::String)
            }
            ExprTokenKind::IntLiteral => (
                Value::Int(unsigned.parse::<i32>().map_err(|e| number_err(e.to_string()))?),
                DataType::Int,
            ),
            ExprTokenKind::LongLiteral => {
                let digits = &unsigned[..unsigned.len() - 1];
                (
                    Value::Long(digits.parse::<i64>().map_err(|e| number_err(e.to_string()))?),
                    DataType::Long,
                )
            }
            ExprTokenKind::FloatLiteral => {
                let digits = &unsigned[..unsigned.len() - 1];
                (
                    Value::Float(digits.parse::<f32>().map_err(|e| number_err(e.to_string()))?),
                    DataType::Float,
                )
            }
            ExprTokenKind::DoubleLiteral => {
                let digits = &unsigned[..unsigned.len() - 1];
                (
                    Value::Double(digits.parse::<f64>().map_err(|e| number_err(e.to_string()))?),
                    DataType::Double,
                )
            }
            ExprTokenKind::BigDecimalLiteral => {
                let digits = unsigned.trim_end_matches(['B', 'b']);
                (
                    Value::BigDecimal(Decimal::from_str(digits).map_err(|e| number_err(e.to_string()))?),
                    DataType::BigDecimal,
                )
            }
            ExprTokenKind::Value => {
                return Ok(ExprNode::ValueRef {
                    location,
                    name: text.to_string(),
                });
            }
            other => {
                return Err(self.error(token.position, format!("token not supported: {:?}", other)));
            }
        };
        Ok(ExprNode::Literal {
            location,
            value,
            data_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(expr: &str) -> String {
        parse_expression(expr).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(shape("a || b && c"), "(a || (b && c))");
        assert_eq!(shape("a && b || c"), "((a && b) || c)");
        assert_eq!(shape("a == 1 && b != 2"), "((a == 1) && (b != 2))");
        assert_eq!(shape("!a && b"), "(!a && b)");
        assert_eq!(shape("!a == b"), "(!a == b)");
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(shape("a && b && c"), "((a && b) && c)");
        assert_eq!(shape("a || b || c"), "((a || b) || c)");
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(shape("(a || b) && c"), "((a || b) && c)");
        assert_eq!(shape("!(a || b)"), "!(a || b)");
    }

    #[test]
    fn test_property_and_function() {
        assert_eq!(shape("a.b.c"), "a.b.c");
        assert_eq!(shape("a.b == 1"), "(a.b == 1)");
        assert_eq!(shape("name.startsWith(\"x\")"), "name.startsWith(\"x\")");
        assert_eq!(shape("a.f(1, 2, 3)"), "a.f(1, 2, 3)");
        assert_eq!(shape("a.f()"), "a.f()");
        assert_eq!(shape("!a?.isEmpty()"), "!a?.isEmpty()");
    }

    #[test]
    fn test_arg_list_is_flat() {
        let node = parse_expression("a.f(1, 2, 3)").unwrap();
        let ExprNode::FunctionCall { args, .. } = node else {
            panic!("expected function call");
        };
        let ExprNode::ArgList { nodes, .. } = *args else {
            panic!("expected arg list");
        };
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_literal_types() {
        let node = parse_expression("10L").unwrap();
        assert!(matches!(node, ExprNode::Literal { value: Value::Long(10), .. }));
        let node = parse_expression("1.5").unwrap();
        assert!(matches!(node, ExprNode::Literal { data_type: DataType::BigDecimal, .. }));
        let node = parse_expression("-3").unwrap();
        assert!(matches!(node, ExprNode::Literal { value: Value::Int(-3), .. }));
        let node = parse_expression("\"it\"\"s\"").unwrap();
        assert!(matches!(node, ExprNode::Literal { value: Value::String(ref s), .. } if s == "it\"s"));
    }

    #[test]
    fn test_empty_expression() {
        assert!(parse_expression("").unwrap().is_empty());
        assert!(parse_expression("   ").unwrap().is_empty());
    }

    #[test]
    fn test_operand_not_found() {
        let err = parse_expression("a &&").unwrap_err();
        assert!(err.to_string().contains("operand not found"));
        assert!(parse_expression("== b").is_err());
        assert!(parse_expression(".b").is_err());
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(parse_expression("(a && b").is_err());
        assert!(parse_expression("a && b)").is_err());
    }

    #[test]
    fn test_missing_operator() {
        let err = parse_expression("a b").unwrap_err();
        assert!(err.to_string().contains("operator is missing"));
    }
}
