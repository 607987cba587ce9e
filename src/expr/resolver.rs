//! Property and function resolution for expression receivers.
//!
//! A receiver exposes its own members (object fields) plus a fixed list of
//! host-registered extension members, matched by name, receiver type and
//! argument types.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::dialect::DEFAULT_ESCAPE_CHAR;
use crate::value::{DataType, TypedValue, Value};

/// Why a member could not be resolved or invoked.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("no property '{name}' on receiver of type {receiver}")]
    PropertyNotFound { name: String, receiver: DataType },

    #[error("no function '{name}' on receiver of type {receiver} accepting ({})", join_types(.arg_types))]
    FunctionNotFound {
        name: String,
        receiver: DataType,
        arg_types: Vec<DataType>,
    },

    #[error("{0}")]
    Failed(String),
}

fn join_types(types: &[DataType]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// Resolves members of expression receivers.
pub trait MemberResolver: Send + Sync {
    fn find_property(&self, receiver: &TypedValue, name: &str) -> Result<TypedValue, ResolveError>;

    fn find_function(
        &self,
        receiver: &TypedValue,
        name: &str,
        args: &[TypedValue],
    ) -> Result<TypedValue, ResolveError>;
}

pub type ExtensionFn =
    Arc<dyn Fn(&TypedValue, &[TypedValue]) -> Result<TypedValue, ResolveError> + Send + Sync>;

/// A host-registered member.
#[derive(Clone)]
pub struct Extension {
    /// `None` matches any receiver type.
    pub receiver: Option<DataType>,
    pub name: String,
    /// `DataType::Any` accepts any argument.
    pub params: Vec<DataType>,
    pub call: ExtensionFn,
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("receiver", &self.receiver)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl Extension {
    fn accepts(&self, receiver: DataType, args: &[TypedValue]) -> bool {
        self.receiver.is_none_or(|r| r == receiver)
            && self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(p, a)| *p == DataType::Any || *p == a.data_type || a.value.is_null())
    }
}

/// Resolver with object-field access and the built-in string/list helpers.
#[derive(Debug, Clone)]
pub struct DefaultResolver {
    escape_char: char,
    properties: Vec<Extension>,
    functions: Vec<Extension>,
}

impl Default for DefaultResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ESCAPE_CHAR)
    }
}

impl DefaultResolver {
    /// Create a resolver whose LIKE helpers escape with `escape_char`.
    pub fn new(escape_char: char) -> Self {
        let mut resolver = Self {
            escape_char,
            properties: Vec::new(),
            functions: Vec::new(),
        };
        resolver.register_builtins();
        resolver
    }

    pub fn escape_char(&self) -> char {
        self.escape_char
    }

    pub fn register_property<F>(&mut self, receiver: Option<DataType>, name: &str, f: F)
    where
        F: Fn(&TypedValue) -> Result<TypedValue, ResolveError> + Send + Sync + 'static,
    {
        self.properties.push(Extension {
            receiver,
            name: name.to_string(),
            params: Vec::new(),
            call: Arc::new(move |recv: &TypedValue, _: &[TypedValue]| f(recv)),
        });
    }

    pub fn register_function<F>(&mut self, receiver: Option<DataType>, name: &str, params: Vec<DataType>, f: F)
    where
        F: Fn(&TypedValue, &[TypedValue]) -> Result<TypedValue, ResolveError> + Send + Sync + 'static,
    {
        self.functions.push(Extension {
            receiver,
            name: name.to_string(),
            params,
            call: Arc::new(f),
        });
    }

    fn register_builtins(&mut self) {
        let esc = self.escape_char;
        let string = Some(DataType::String);
        let list = Some(DataType::List);

        self.register_function(string, "escape", vec![], move |r, _| Ok(TypedValue::of(escape_like(str_of(r), esc))));
        self.register_function(string, "asPrefix", vec![], move |r, _| {
            Ok(TypedValue::of(format!("{}%", escape_like(str_of(r), esc))))
        });
        self.register_function(string, "asInfix", vec![], move |r, _| {
            Ok(TypedValue::of(format!("%{}%", escape_like(str_of(r), esc))))
        });
        self.register_function(string, "asSuffix", vec![], move |r, _| {
            Ok(TypedValue::of(format!("%{}", escape_like(str_of(r), esc))))
        });
        self.register_function(string, "isEmpty", vec![], |r, _| Ok(TypedValue::of(str_of(r).is_empty())));
        self.register_function(string, "isNotEmpty", vec![], |r, _| Ok(TypedValue::of(!str_of(r).is_empty())));
        self.register_function(string, "isBlank", vec![], |r, _| Ok(TypedValue::of(str_of(r).trim().is_empty())));
        self.register_function(string, "isNotBlank", vec![], |r, _| {
            Ok(TypedValue::of(!str_of(r).trim().is_empty()))
        });
        self.register_function(string, "trim", vec![], |r, _| Ok(TypedValue::of(str_of(r).trim())));
        self.register_function(string, "uppercase", vec![], |r, _| Ok(TypedValue::of(str_of(r).to_uppercase())));
        self.register_function(string, "lowercase", vec![], |r, _| Ok(TypedValue::of(str_of(r).to_lowercase())));
        self.register_function(string, "startsWith", vec![DataType::String], |r, a| {
            Ok(TypedValue::of(str_of(r).starts_with(str_of(&a[0]))))
        });
        self.register_function(string, "endsWith", vec![DataType::String], |r, a| {
            Ok(TypedValue::of(str_of(r).ends_with(str_of(&a[0]))))
        });
        self.register_function(string, "contains", vec![DataType::String], |r, a| {
            Ok(TypedValue::of(str_of(r).contains(str_of(&a[0]))))
        });
        self.register_property(string, "length", |r| Ok(TypedValue::of(str_of(r).chars().count() as i32)));

        self.register_function(list, "isEmpty", vec![], |r, _| Ok(TypedValue::of(items_of(r).is_empty())));
        self.register_function(list, "isNotEmpty", vec![], |r, _| Ok(TypedValue::of(!items_of(r).is_empty())));
        self.register_function(list, "size", vec![], |r, _| Ok(TypedValue::of(items_of(r).len() as i32)));
        self.register_function(list, "contains", vec![DataType::Any], |r, a| {
            Ok(TypedValue::of(items_of(r).contains(&a[0].value)))
        });
        self.register_property(list, "size", |r| Ok(TypedValue::of(items_of(r).len() as i32)));

        self.register_function(None, "toString", vec![], |r, _| Ok(TypedValue::of(r.value.to_plain_string())));
    }
}

impl MemberResolver for DefaultResolver {
    fn find_property(&self, receiver: &TypedValue, name: &str) -> Result<TypedValue, ResolveError> {
        if let Value::Object(fields) = &receiver.value {
            if let Some(v) = fields.get(name) {
                return Ok(TypedValue::from(v.clone()));
            }
        }
        let receiver_type = receiver.value.data_type();
        self.properties
            .iter()
            .find(|ext| ext.name == name && ext.accepts(receiver_type, &[]))
            .ok_or_else(|| ResolveError::PropertyNotFound {
                name: name.to_string(),
                receiver: receiver_type,
            })
            .and_then(|ext| (ext.call)(receiver, &[]))
    }

    fn find_function(
        &self,
        receiver: &TypedValue,
        name: &str,
        args: &[TypedValue],
    ) -> Result<TypedValue, ResolveError> {
        let receiver_type = receiver.value.data_type();
        self.functions
            .iter()
            .find(|ext| ext.name == name && ext.accepts(receiver_type, args))
            .ok_or_else(|| ResolveError::FunctionNotFound {
                name: name.to_string(),
                receiver: receiver_type,
                arg_types: args.iter().map(|a| a.data_type).collect(),
            })
            .and_then(|ext| (ext.call)(receiver, args))
    }
}

fn str_of(v: &TypedValue) -> &str {
    v.value.as_str().unwrap_or_default()
}

fn items_of(v: &TypedValue) -> &[Value] {
    match &v.value {
        Value::List(items) => items,
        _ => &[],
    }
}

/// Escape LIKE wildcards (`%`, `_`) and the escape character itself.
pub fn escape_like(text: &str, escape: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c == '_' || c == escape {
            out.push(escape);
        }
        out.push(c);
    }
    out
}
