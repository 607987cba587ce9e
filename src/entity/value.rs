use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TwoWayError, TwoWayResult};
use crate::value::Value;

static NULL: Value = Value::Null;

/// An entity instance: property name to value, embedded composites nested
/// as [`Value::Object`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    fields: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a top-level property.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Value at `path`; missing properties read as null.
    pub fn get(&self, path: &[String]) -> &Value {
        let Some((first, rest)) = path.split_first() else {
            return &NULL;
        };
        let mut current = match self.fields.get(first) {
            Some(v) => v,
            None => return &NULL,
        };
        for name in rest {
            current = match current {
                Value::Object(fields) => match fields.get(name) {
                    Some(v) => v,
                    None => return &NULL,
                },
                _ => return &NULL,
            };
        }
        current
    }

    /// Write `value` at `path`, creating intermediate composites.
    pub fn set(&mut self, path: &[String], value: Value) {
        let Some((last, owners)) = path.split_last() else {
            return;
        };
        let mut fields = &mut self.fields;
        for name in owners {
            let slot = fields.entry(name.clone()).or_insert_with(|| Value::Object(BTreeMap::new()));
            if !matches!(slot, Value::Object(_)) {
                *slot = Value::Object(BTreeMap::new());
            }
            fields = match slot {
                Value::Object(inner) => inner,
                _ => return,
            };
        }
        fields.insert(last.clone(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Read an entity from a JSON object.
    pub fn from_json(json: serde_json::Value) -> TwoWayResult<Self> {
        match Value::from(json) {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(TwoWayError::Config(format!(
                "an entity must be a JSON object, not {}",
                other.data_type()
            ))),
        }
    }
}

impl From<BTreeMap<String, Value>> for Entity {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn test_get_nested() {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), Value::from("Tokyo"));
        let e = Entity::new().with("id", 1).with("address", Value::Object(address));
        assert_eq!(e.get(&path("address.city")), &Value::from("Tokyo"));
        assert_eq!(e.get(&path("address.zip")), &Value::Null);
        assert_eq!(e.get(&path("id.x")), &Value::Null);
    }

    #[test]
    fn test_set_creates_owners() {
        let mut e = Entity::new();
        e.set(&path("address.city"), Value::from("Osaka"));
        assert_eq!(e.get(&path("address.city")), &Value::from("Osaka"));
    }

    #[test]
    fn test_from_json() {
        let e = Entity::from_json(serde_json::json!({"id": 1, "name": "a"})).unwrap();
        assert_eq!(e.get(&path("id")), &Value::Int(1));
        assert!(Entity::from_json(serde_json::json!([1])).is_err());
    }
}
