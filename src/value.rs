//! Runtime values flowing through expressions, templates and entities.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Declared type of a value.
///
/// `Any` is the type of an unresolved reference or an untyped null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Any,
    Boolean,
    Char,
    String,
    Int,
    Long,
    Float,
    Double,
    BigDecimal,
    Timestamp,
    List,
    Object,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Float | DataType::Double | DataType::BigDecimal
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Any => "Any",
            DataType::Boolean => "Boolean",
            DataType::Char => "Char",
            DataType::String => "String",
            DataType::Int => "Int",
            DataType::Long => "Long",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::BigDecimal => "BigDecimal",
            DataType::Timestamp => "Timestamp",
            DataType::List => "List",
            DataType::Object => "Object",
        };
        write!(f, "{}", name)
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigDecimal(Decimal),
    Timestamp(NaiveDateTime),
    List(Vec<Value>),
    /// A record; fields are exposed as properties to expressions.
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The natural type of this value. `Null` reports `Any`.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Any,
            Value::Bool(_) => DataType::Boolean,
            Value::Char(_) => DataType::Char,
            Value::String(_) => DataType::String,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::BigDecimal(_) => DataType::BigDecimal,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::List(_) => DataType::List,
            Value::Object(_) => DataType::Object,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n as i64),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(n) => Some(Decimal::from(*n)),
            Value::Long(n) => Some(Decimal::from(*n)),
            Value::Float(n) => Decimal::from_f32(*n),
            Value::Double(n) => Decimal::from_f64(*n),
            Value::BigDecimal(d) => Some(*d),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Long(n) => Some(*n as f64),
            Value::Float(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            Value::BigDecimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Ordering between two values of mutually comparable types.
    ///
    /// Numbers compare across widths; strings, chars, booleans and
    /// timestamps only compare with their own kind. Lists, objects and
    /// nulls are never comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) if a.data_type().is_numeric() && b.data_type().is_numeric() => {
                match (a, b) {
                    (Value::Int(_) | Value::Long(_), Value::Int(_) | Value::Long(_)) => {
                        Some(a.as_i64()?.cmp(&b.as_i64()?))
                    }
                    (Value::Float(_) | Value::Double(_), _) | (_, Value::Float(_) | Value::Double(_)) => {
                        a.as_f64()?.partial_cmp(&b.as_f64()?)
                    }
                    _ => Some(a.as_decimal()?.cmp(&b.as_decimal()?)),
                }
            }
            _ => None,
        }
    }

    /// The text spliced into SQL by an embedded-value directive.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Char(c) => c.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (a, b) if a.data_type().is_numeric() && b.data_type().is_numeric() => {
                a.compare(b) == Some(Ordering::Equal)
            }
            (a, b) => a.data_type() == b.data_type() && a.compare(b) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::BigDecimal(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::BigDecimal(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::Long(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => {
                Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A value paired with its declared type.
///
/// The declared type matters for nulls: a null `String` binds differently
/// from a null `Int` at the execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: Value,
    pub data_type: DataType,
}

impl TypedValue {
    pub fn new(value: Value, data_type: DataType) -> Self {
        Self { value, data_type }
    }

    /// Wrap a value using its natural type.
    pub fn of(value: impl Into<Value>) -> Self {
        Self::from(value.into())
    }

    /// A null of the given type.
    pub fn null(data_type: DataType) -> Self {
        Self {
            value: Value::Null,
            data_type,
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        let data_type = value.data_type();
        Self { value, data_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_across_widths() {
        assert_eq!(Value::Int(1), Value::Long(1));
        assert_eq!(Value::Double(2.5), Value::Float(2.5));
        assert_ne!(Value::Int(1), Value::String("1".to_string()));
    }

    #[test]
    fn test_compare_rejects_mixed_kinds() {
        assert_eq!(Value::Int(3).compare(&Value::Long(2)), Some(Ordering::Greater));
        assert_eq!(Value::String("a".into()).compare(&Value::Int(1)), None);
        assert_eq!(Value::List(vec![]).compare(&Value::List(vec![])), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_decimal_compare() {
        let d = Decimal::new(150, 2);
        assert_eq!(Value::BigDecimal(d).compare(&Value::Int(1)), Some(Ordering::Greater));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"street": "B", "ids": [1, 2], "big": 9_000_000_000i64});
        let Value::Object(fields) = Value::from(json) else {
            panic!("expected object");
        };
        assert_eq!(fields["street"], Value::String("B".into()));
        assert_eq!(fields["ids"], Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(fields["big"], Value::Long(_)));
    }
}
