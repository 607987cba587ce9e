//! Metadata registry.
//!
//! Hosts describe entities and embeddables with definitions that refer to
//! embeddables by name. The registry resolves those references into
//! [`EntityMeta`] trees, rejects cyclic embedding, and caches each built
//! entity.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::meta::{EmbeddableMeta, EntityMeta, PropKind, PropMeta};
use crate::error::{TwoWayError, TwoWayResult};
use crate::value::DataType;

/// Property kind as written in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropDefKind {
    Basic,
    IdAssign,
    IdSequence { sequence: String, increment_by: i64 },
    Version,
    CreatedAt,
    UpdatedAt,
    Embedded { embeddable: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropDef {
    pub name: String,
    #[serde(default = "any_type")]
    pub data_type: DataType,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(flatten)]
    pub kind: PropDefKind,
}

fn any_type() -> DataType {
    DataType::Any
}

impl PropDef {
    pub fn new(name: impl Into<String>, data_type: DataType, kind: PropDefKind) -> Self {
        Self {
            name: name.into(),
            data_type,
            column: None,
            kind,
        }
    }

    pub fn basic(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, PropDefKind::Basic)
    }

    pub fn embedded(name: impl Into<String>, embeddable: impl Into<String>) -> Self {
        Self::new(
            name,
            DataType::Object,
            PropDefKind::Embedded {
                embeddable: embeddable.into(),
            },
        )
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddableDef {
    pub name: String,
    pub properties: Vec<PropDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    /// Defaults to the snake_case entity name.
    #[serde(default)]
    pub table: Option<String>,
    pub properties: Vec<PropDef>,
}

/// Definitions plus a compute-if-absent cache of built metadata.
#[derive(Debug, Default)]
pub struct MetaRegistry {
    entities: DashMap<String, EntityDef>,
    embeddables: DashMap<String, EmbeddableDef>,
    cache: DashMap<String, Arc<EntityMeta>>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity(&self, def: EntityDef) {
        self.cache.remove(&def.name);
        self.entities.insert(def.name.clone(), def);
    }

    pub fn register_embeddable(&self, def: EmbeddableDef) {
        // any entity may embed it
        self.cache.clear();
        self.embeddables.insert(def.name.clone(), def);
    }

    /// Built metadata for `name`, building it on first use.
    pub fn get(&self, name: &str) -> TwoWayResult<Arc<EntityMeta>> {
        if let Some(meta) = self.cache.get(name) {
            return Ok(meta.clone());
        }
        let def = self
            .entities
            .get(name)
            .map(|d| d.clone())
            .ok_or_else(|| TwoWayError::Configuration(format!("unknown entity '{}'", name)))?;
        let properties = def
            .properties
            .iter()
            .map(|p| self.resolve(p, &mut Vec::new()))
            .collect::<TwoWayResult<Vec<_>>>()?;
        let table = def
            .table
            .clone()
            .unwrap_or_else(|| super::meta::to_snake_case(&def.name));
        let meta = Arc::new(EntityMeta::new(def.name.clone(), table, properties)?);
        debug!(entity = name, "built entity metadata");
        Ok(self.cache.entry(name.to_string()).or_insert(meta).clone())
    }

    fn resolve(&self, def: &PropDef, visiting: &mut Vec<String>) -> TwoWayResult<PropMeta> {
        let kind = match &def.kind {
            PropDefKind::Basic => PropKind::Basic,
            PropDefKind::IdAssign => PropKind::IdAssign,
            PropDefKind::IdSequence { sequence, increment_by } => PropKind::IdSequence {
                name: sequence.clone(),
                increment_by: *increment_by,
            },
            PropDefKind::Version => PropKind::Version,
            PropDefKind::CreatedAt => PropKind::CreatedAt,
            PropDefKind::UpdatedAt => PropKind::UpdatedAt,
            PropDefKind::Embedded { embeddable } => PropKind::Embedded(self.resolve_embeddable(embeddable, visiting)?),
        };
        let meta = PropMeta::new(def.name.clone(), def.data_type, kind);
        Ok(match &def.column {
            Some(c) => meta.with_column(c.clone()),
            None => meta,
        })
    }

    fn resolve_embeddable(&self, name: &str, visiting: &mut Vec<String>) -> TwoWayResult<Arc<EmbeddableMeta>> {
        if visiting.iter().any(|v| v == name) {
            visiting.push(name.to_string());
            return Err(TwoWayError::Configuration(format!(
                "cyclic embedding: {}",
                visiting.join(" -> ")
            )));
        }
        let def = self
            .embeddables
            .get(name)
            .map(|d| d.clone())
            .ok_or_else(|| TwoWayError::Configuration(format!("unknown embeddable '{}'", name)))?;
        visiting.push(name.to_string());
        let properties = def
            .properties
            .iter()
            .map(|p| self.resolve(p, visiting))
            .collect::<TwoWayResult<Vec<_>>>()?;
        visiting.pop();
        Ok(Arc::new(EmbeddableMeta {
            name: def.name,
            properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetaRegistry {
        let r = MetaRegistry::new();
        r.register_embeddable(EmbeddableDef {
            name: "Address".to_string(),
            properties: vec![
                PropDef::basic("street", DataType::String),
                PropDef::basic("city", DataType::String),
            ],
        });
        r.register_entity(EntityDef {
            name: "CustomerAccount".to_string(),
            table: None,
            properties: vec![
                PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
                PropDef::embedded("home", "Address"),
                PropDef::new("version", DataType::Int, PropDefKind::Version),
            ],
        });
        r
    }

    #[test]
    fn test_resolves_embeddables() {
        let meta = registry().get("CustomerAccount").unwrap();
        assert_eq!(meta.table, "customer_account");
        assert_eq!(meta.columns(""), vec!["id", "street", "city", "version"]);
    }

    #[test]
    fn test_cached() {
        let r = registry();
        let a = r.get("CustomerAccount").unwrap();
        let b = r.get("CustomerAccount").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_cycle_rejected() {
        let r = registry();
        r.register_embeddable(EmbeddableDef {
            name: "A".to_string(),
            properties: vec![PropDef::embedded("b", "B")],
        });
        r.register_embeddable(EmbeddableDef {
            name: "B".to_string(),
            properties: vec![PropDef::embedded("a", "A")],
        });
        r.register_entity(EntityDef {
            name: "Loop".to_string(),
            table: None,
            properties: vec![
                PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
                PropDef::embedded("a", "A"),
            ],
        });
        let err = r.get("Loop").unwrap_err();
        assert!(err.to_string().contains("cyclic embedding: A -> B -> A"));
    }

    #[test]
    fn test_unknown_names() {
        let r = registry();
        assert!(r.get("Nope").is_err());
        r.register_entity(EntityDef {
            name: "Broken".to_string(),
            table: Some("broken".to_string()),
            properties: vec![
                PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
                PropDef::embedded("x", "Missing"),
            ],
        });
        assert!(r.get("Broken").is_err());
    }

    #[test]
    fn test_definitions_from_json() {
        let def: EntityDef = serde_json::from_value(serde_json::json!({
            "name": "Address",
            "properties": [
                {"name": "addressId", "data_type": "Int", "kind": "id_sequence", "sequence": "ADDRESS_SEQ", "increment_by": 100},
                {"name": "street", "data_type": "String", "kind": "basic"},
                {"name": "version", "data_type": "Int", "kind": "version"}
            ]
        }))
        .unwrap();
        let r = MetaRegistry::new();
        r.register_entity(def);
        let meta = r.get("Address").unwrap();
        assert_eq!(meta.columns(""), vec!["address_id", "street", "version"]);
    }
}
