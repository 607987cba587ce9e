//! Entity metadata.
//!
//! An [`EntityMeta`] is an explicit, pre-resolved property tree. Embedded
//! composites are flattened into leaf properties, each remembering the path
//! from the entity root so values can be read from and written back to an
//! [`Entity`](super::Entity).

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{TwoWayError, TwoWayResult};
use crate::value::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum PropKind {
    Basic,
    /// Identity supplied by the caller.
    IdAssign,
    /// Identity drawn from a database sequence, `increment_by` at a time.
    IdSequence { name: String, increment_by: i64 },
    Version,
    CreatedAt,
    UpdatedAt,
    Embedded(Arc<EmbeddableMeta>),
}

impl PropKind {
    pub fn is_id(&self) -> bool {
        matches!(self, PropKind::IdAssign | PropKind::IdSequence { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropMeta {
    pub name: String,
    pub data_type: DataType,
    pub column: String,
    pub kind: PropKind,
}

impl PropMeta {
    /// A property whose column is the snake_case form of `name`.
    pub fn new(name: impl Into<String>, data_type: DataType, kind: PropKind) -> Self {
        let name = name.into();
        Self {
            column: to_snake_case(&name),
            name,
            data_type,
            kind,
        }
    }

    pub fn basic(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, PropKind::Basic)
    }

    pub fn embedded(name: impl Into<String>, embeddable: Arc<EmbeddableMeta>) -> Self {
        Self::new(name, DataType::Object, PropKind::Embedded(embeddable))
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// A composite value type stored inline in its owner's table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddableMeta {
    pub name: String,
    pub properties: Vec<PropMeta>,
}

/// A scalar property reached by flattening embedded composites.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafProp {
    /// Property names from the entity root down to this leaf.
    pub path: Vec<String>,
    pub prop: PropMeta,
}

impl LeafProp {
    /// Dotted path, e.g. `address.city`.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }

    pub fn column(&self) -> &str {
        &self.prop.column
    }

    pub fn data_type(&self) -> DataType {
        self.prop.data_type
    }

    pub fn is_id(&self) -> bool {
        self.prop.kind.is_id()
    }

    pub fn is_version(&self) -> bool {
        self.prop.kind == PropKind::Version
    }

    /// Whether a filter entry names this leaf or one of its owners.
    pub fn matches(&self, name: &str) -> bool {
        let dotted = self.dotted();
        dotted == name || dotted.starts_with(&format!("{}.", name))
    }
}

#[derive(Debug, Clone)]
struct Views {
    leaves: Vec<LeafProp>,
}

#[derive(Debug)]
pub struct EntityMeta {
    pub name: String,
    pub table: String,
    pub properties: Vec<PropMeta>,
    views: OnceCell<Views>,
}

impl Clone for EntityMeta {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            table: self.table.clone(),
            properties: self.properties.clone(),
            views: OnceCell::new(),
        }
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.table == other.table && self.properties == other.properties
    }
}

impl EntityMeta {
    /// Build and validate entity metadata.
    pub fn new(name: impl Into<String>, table: impl Into<String>, properties: Vec<PropMeta>) -> TwoWayResult<Self> {
        let meta = Self {
            name: name.into(),
            table: table.into(),
            properties,
            views: OnceCell::new(),
        };
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> TwoWayResult<()> {
        let err = |msg: String| TwoWayError::Configuration(format!("entity '{}': {}", self.name, msg));

        let mut names = HashSet::new();
        let mut singletons = [(PropKind::Version, 0), (PropKind::CreatedAt, 0), (PropKind::UpdatedAt, 0)];
        for p in &self.properties {
            if !names.insert(p.name.as_str()) {
                return Err(err(format!("property '{}' is declared twice", p.name)));
            }
            match &p.kind {
                PropKind::Version if !is_integral(p.data_type) => {
                    return Err(err(format!(
                        "version property '{}' must be Int or Long, not {}",
                        p.name, p.data_type
                    )));
                }
                PropKind::IdSequence { increment_by, .. } => {
                    if !is_integral(p.data_type) {
                        return Err(err(format!(
                            "sequence property '{}' must be Int or Long, not {}",
                            p.name, p.data_type
                        )));
                    }
                    if *increment_by < 1 {
                        return Err(err(format!("sequence property '{}' must increment by at least 1", p.name)));
                    }
                }
                PropKind::CreatedAt | PropKind::UpdatedAt if p.data_type != DataType::Timestamp => {
                    return Err(err(format!("timestamp property '{}' must be Timestamp, not {}", p.name, p.data_type)));
                }
                PropKind::Embedded(e) => validate_embeddable(e, &p.name).map_err(err)?,
                _ => {}
            }
            for (kind, count) in singletons.iter_mut() {
                if *kind == p.kind {
                    *count += 1;
                    if *count > 1 {
                        return Err(err(format!("more than one {:?} property", kind)));
                    }
                }
            }
        }
        if !self.properties.iter().any(|p| p.kind.is_id()) {
            return Err(err("no id property".to_string()));
        }

        let mut columns = HashSet::new();
        for leaf in self.leaves() {
            if !columns.insert(leaf.column().to_ascii_lowercase()) {
                return Err(err(format!("column '{}' is mapped twice", leaf.column())));
            }
        }
        Ok(())
    }

    fn views(&self) -> &Views {
        self.views.get_or_init(|| {
            let mut leaves = Vec::new();
            flatten(&self.properties, &mut Vec::new(), &mut leaves);
            Views { leaves }
        })
    }

    /// All scalar properties in declaration order.
    pub fn leaves(&self) -> &[LeafProp] {
        &self.views().leaves
    }

    pub fn id_properties(&self) -> impl Iterator<Item = &LeafProp> {
        self.leaves().iter().filter(|l| l.is_id())
    }

    pub fn non_id_properties(&self) -> impl Iterator<Item = &LeafProp> {
        self.leaves().iter().filter(|l| !l.is_id())
    }

    pub fn version_property(&self) -> Option<&LeafProp> {
        self.find_kind(|k| *k == PropKind::Version)
    }

    pub fn created_at_property(&self) -> Option<&LeafProp> {
        self.find_kind(|k| *k == PropKind::CreatedAt)
    }

    pub fn updated_at_property(&self) -> Option<&LeafProp> {
        self.find_kind(|k| *k == PropKind::UpdatedAt)
    }

    fn find_kind(&self, f: impl Fn(&PropKind) -> bool) -> Option<&LeafProp> {
        self.leaves().iter().find(|l| f(&l.prop.kind))
    }

    /// Leaf columns, optionally qualified with an alias prefix such as `"a."`.
    pub fn columns(&self, prefix: &str) -> Vec<String> {
        self.leaves().iter().map(|l| format!("{}{}", prefix, l.column())).collect()
    }

    /// Look up a leaf by dotted path.
    pub fn leaf(&self, dotted: &str) -> Option<&LeafProp> {
        self.leaves().iter().find(|l| l.dotted() == dotted)
    }
}

fn is_integral(t: DataType) -> bool {
    matches!(t, DataType::Int | DataType::Long)
}

fn validate_embeddable(e: &EmbeddableMeta, owner: &str) -> Result<(), String> {
    for p in &e.properties {
        match &p.kind {
            PropKind::Basic => {}
            PropKind::Embedded(nested) => validate_embeddable(nested, &format!("{}.{}", owner, p.name))?,
            other => {
                return Err(format!(
                    "embedded property '{}.{}' must be a basic property, not {:?}",
                    owner, p.name, other
                ));
            }
        }
    }
    Ok(())
}

fn flatten(props: &[PropMeta], path: &mut Vec<String>, out: &mut Vec<LeafProp>) {
    for p in props {
        path.push(p.name.clone());
        match &p.kind {
            PropKind::Embedded(e) => flatten(&e.properties, path, out),
            _ => out.push(LeafProp {
                path: path.clone(),
                prop: p.clone(),
            }),
        }
        path.pop();
    }
}

/// `addressId` → `address_id`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Arc<EmbeddableMeta> {
        Arc::new(EmbeddableMeta {
            name: "Address".to_string(),
            properties: vec![
                PropMeta::basic("city", DataType::String),
                PropMeta::basic("zipCode", DataType::String),
            ],
        })
    }

    fn person() -> EntityMeta {
        EntityMeta::new(
            "Person",
            "PERSON",
            vec![
                PropMeta::new("personId", DataType::Int, PropKind::IdAssign),
                PropMeta::basic("name", DataType::String),
                PropMeta::embedded("address", address()),
                PropMeta::new("version", DataType::Long, PropKind::Version),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("addressId"), "address_id");
        assert_eq!(to_snake_case("URL"), "url");
        assert_eq!(to_snake_case("line2Text"), "line2_text");
    }

    #[test]
    fn test_leaves_are_flattened() {
        let meta = person();
        let paths: Vec<String> = meta.leaves().iter().map(|l| l.dotted()).collect();
        assert_eq!(paths, vec!["personId", "name", "address.city", "address.zipCode", "version"]);
        assert_eq!(meta.columns("p."), vec!["p.person_id", "p.name", "p.city", "p.zip_code", "p.version"]);
    }

    #[test]
    fn test_views() {
        let meta = person();
        assert_eq!(meta.id_properties().count(), 1);
        assert_eq!(meta.non_id_properties().count(), 4);
        assert_eq!(meta.version_property().unwrap().column(), "version");
        assert!(meta.created_at_property().is_none());
    }

    #[test]
    fn test_leaf_matches_owner() {
        let meta = person();
        let city = meta.leaf("address.city").unwrap();
        assert!(city.matches("address"));
        assert!(city.matches("address.city"));
        assert!(!city.matches("addr"));
    }

    #[test]
    fn test_version_must_be_integral() {
        let err = EntityMeta::new(
            "E",
            "E",
            vec![
                PropMeta::new("id", DataType::Int, PropKind::IdAssign),
                PropMeta::new("version", DataType::String, PropKind::Version),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TwoWayError::Configuration(_)));
    }

    #[test]
    fn test_id_required() {
        assert!(EntityMeta::new("E", "E", vec![PropMeta::basic("name", DataType::String)]).is_err());
    }

    #[test]
    fn test_embedded_must_be_basic() {
        let bad = Arc::new(EmbeddableMeta {
            name: "Bad".to_string(),
            properties: vec![PropMeta::new("v", DataType::Int, PropKind::Version)],
        });
        let err = EntityMeta::new(
            "E",
            "E",
            vec![
                PropMeta::new("id", DataType::Int, PropKind::IdAssign),
                PropMeta::embedded("bad", bad),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be a basic property"));
    }

    #[test]
    fn test_duplicate_column() {
        let err = EntityMeta::new(
            "E",
            "E",
            vec![
                PropMeta::new("id", DataType::Int, PropKind::IdAssign),
                PropMeta::basic("name", DataType::String),
                PropMeta::basic("label", DataType::String).with_column("NAME"),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("mapped twice"));
    }
}
