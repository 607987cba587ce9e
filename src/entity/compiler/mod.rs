//! Entity-to-SQL compilation.
//!
//! Each statement family lives in its own module and adds `build_*` methods
//! to [`EntityCompiler`]. All of them share the include/exclude filtering in
//! [`EntityOptions`] and the text/log/value accumulation in [`SqlBuilder`].

mod delete;
mod insert;
mod select;
mod update;
mod upsert;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;

use super::meta::{EntityMeta, LeafProp};
use super::sequence::SequenceGenerator;
use super::value::Entity;
use crate::dialect::Dialect;
use crate::error::{TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::{DataType, TypedValue, Value};

pub use upsert::UpsertAction;

static SEQUENCES: Lazy<Arc<SequenceGenerator>> = Lazy::new(|| Arc::new(SequenceGenerator::new()));

/// Source of "now" for created/updated timestamps.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Per-statement options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityOptions {
    /// Only these properties (dotted paths; an embedded name covers its
    /// leaves). Takes precedence over `exclude`.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Drop the version predicate; the version is still incremented.
    pub ignore_version: bool,
    /// Report a lost update as success instead of an error.
    pub suppress_optimistic_lock_error: bool,
}

impl EntityOptions {
    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignore_version(mut self) -> Self {
        self.ignore_version = true;
        self
    }

    pub fn suppress_optimistic_lock_error(mut self) -> Self {
        self.suppress_optimistic_lock_error = true;
        self
    }

    /// Whether statements built with these options carry a version predicate.
    pub fn guards_version(&self, meta: &EntityMeta) -> bool {
        !self.ignore_version && meta.version_property().is_some()
    }

    /// Leaves a statement may touch. Id and version columns are always kept.
    pub fn target_leaves<'m>(&self, meta: &'m EntityMeta) -> Vec<&'m LeafProp> {
        meta.leaves()
            .iter()
            .filter(|leaf| {
                if leaf.is_id() || leaf.is_version() {
                    true
                } else if !self.include.is_empty() {
                    self.include.iter().any(|n| leaf.matches(n))
                } else {
                    !self.exclude.iter().any(|n| leaf.matches(n))
                }
            })
            .collect()
    }
}

/// Compiles entity metadata and values into bound SQL.
#[derive(Clone)]
pub struct EntityCompiler {
    dialect: Dialect,
    sequences: Arc<SequenceGenerator>,
    clock: Clock,
}

impl fmt::Debug for EntityCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCompiler").field("dialect", &self.dialect).finish()
    }
}

impl Default for EntityCompiler {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

impl EntityCompiler {
    /// A compiler using the process-wide sequence cache and the local clock.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sequences: SEQUENCES.clone(),
            clock: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sequences(mut self, sequences: Arc<SequenceGenerator>) -> Self {
        self.sequences = sequences;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn now(&self) -> Value {
        Value::Timestamp((self.clock)())
    }

    fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.dialect)
    }
}

/// Accumulates statement text, its log form and bound values.
pub(crate) struct SqlBuilder {
    dialect: Dialect,
    text: String,
    log: String,
    values: Vec<TypedValue>,
}

impl SqlBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            text: String::new(),
            log: String::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.text.push_str(sql);
        self.log.push_str(sql);
        self
    }

    fn bind(&mut self, value: TypedValue) -> &mut Self {
        self.text.push('?');
        self.log.push_str(&self.dialect.format_value(&value));
        self.values.push(value);
        self
    }

    fn bind_leaf(&mut self, entity: &Entity, leaf: &LeafProp) -> &mut Self {
        self.bind(TypedValue::new(entity.get(&leaf.path).clone(), leaf.data_type()))
    }

    /// `a, b, c`
    fn columns(&mut self, leaves: &[&LeafProp]) -> &mut Self {
        let list = leaves.iter().map(|l| l.column()).collect::<Vec<_>>().join(", ");
        self.push(&list)
    }

    /// `?, ?, ?`
    fn values(&mut self, entity: &Entity, leaves: &[&LeafProp]) -> &mut Self {
        for (i, leaf) in leaves.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind_leaf(entity, leaf);
        }
        self
    }

    /// `a = ?<sep>b = ?`
    fn assignments(&mut self, entity: &Entity, leaves: &[&LeafProp], separator: &str) -> &mut Self {
        for (i, leaf) in leaves.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.push(leaf.column()).push(" = ").bind_leaf(entity, leaf);
        }
        self
    }

    fn finish(self) -> BoundSql {
        BoundSql {
            text: self.text,
            values: self.values,
            log: self.log,
        }
    }
}

/// `version + 1`, keeping the declared width.
fn increment_version(meta: &EntityMeta, leaf: &LeafProp, current: &Value) -> TwoWayResult<Value> {
    let n = current.as_i64().ok_or_else(|| {
        TwoWayError::Configuration(format!(
            "entity '{}': version property '{}' holds {} instead of a number",
            meta.name,
            leaf.dotted(),
            current.data_type()
        ))
    })?;
    match leaf.data_type() {
        DataType::Int => i32::try_from(n + 1)
            .map(Value::Int)
            .map_err(|_| TwoWayError::Configuration(format!("entity '{}': version overflow", meta.name))),
        _ => Ok(Value::Long(n + 1)),
    }
}

/// A zero of the leaf's integral type.
fn zero_of(leaf: &LeafProp) -> Value {
    match leaf.data_type() {
        DataType::Int => Value::Int(0),
        _ => Value::Long(0),
    }
}

/// Resolve explicit key property names, defaulting to the id leaves.
fn key_leaves<'m>(meta: &'m EntityMeta, keys: &[String]) -> TwoWayResult<Vec<&'m LeafProp>> {
    if keys.is_empty() {
        return Ok(meta.id_properties().collect());
    }
    let mut leaves = Vec::new();
    for key in keys {
        let matched: Vec<&LeafProp> = meta.leaves().iter().filter(|l| l.matches(key)).collect();
        if matched.is_empty() {
            return Err(TwoWayError::Configuration(format!(
                "entity '{}' has no property '{}'",
                meta.name, key
            )));
        }
        leaves.extend(matched);
    }
    Ok(leaves)
}
