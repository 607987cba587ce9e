//! UPDATE compilation.

use tracing::debug;

use super::{EntityCompiler, EntityOptions, increment_version};
use crate::entity::meta::{EntityMeta, LeafProp, PropKind};
use crate::entity::value::Entity;
use crate::error::{TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::TypedValue;

impl EntityCompiler {
    /// `update T set <columns> where <ids> [and version = <old>]`.
    ///
    /// The returned entity carries the incremented version and the refreshed
    /// `updatedAt`; the version predicate binds the version passed in.
    pub fn build_update(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
    ) -> TwoWayResult<(BoundSql, Entity)> {
        let updated = self.prepare_update(meta, entity)?;
        let set: Vec<&LeafProp> = options
            .target_leaves(meta)
            .into_iter()
            .filter(|l| !l.is_id() && l.prop.kind != PropKind::CreatedAt)
            .collect();
        if set.is_empty() {
            return Err(TwoWayError::Configuration(format!(
                "entity '{}': no columns left to update",
                meta.name
            )));
        }
        let ids: Vec<&LeafProp> = meta.id_properties().collect();

        let mut sql = self.builder();
        sql.push("update ")
            .push(&meta.table)
            .push(" set ")
            .assignments(&updated, &set, ", ")
            .push(" where ")
            .assignments(entity, &ids, " and ");
        if options.guards_version(meta) {
            if let Some(version) = meta.version_property() {
                sql.push(" and ")
                    .push(version.column())
                    .push(" = ")
                    .bind(TypedValue::new(entity.get(&version.path).clone(), version.data_type()));
            }
        }
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled update");
        Ok((sql, updated))
    }

    /// Increment the version and refresh `updatedAt`.
    pub(super) fn prepare_update(&self, meta: &EntityMeta, entity: &Entity) -> TwoWayResult<Entity> {
        let mut updated = entity.clone();
        if let Some(version) = meta.version_property() {
            let next = increment_version(meta, version, entity.get(&version.path))?;
            updated.set(&version.path, next);
        }
        if let Some(updated_at) = meta.updated_at_property() {
            updated.set(&updated_at.path, self.now());
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::dialect::Dialect;
    use crate::value::{DataType, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_with_version() {
        let meta = employee();
        let c = compiler(Dialect::Postgres);
        let (sql, updated) = c
            .build_update(&meta, &employee_value(), &EntityOptions::default())
            .unwrap();
        assert_eq!(
            sql.text,
            "update employee set name = ?, street = ?, city = ?, version = ?, updated_at = ? where id = ? and version = ?"
        );
        assert_eq!(sql.values[3], TypedValue::new(Value::Int(4), DataType::Int));
        assert_eq!(sql.values[5], TypedValue::new(Value::Long(7), DataType::Long));
        assert_eq!(sql.values[6], TypedValue::new(Value::Int(3), DataType::Int));
        assert_eq!(updated.get(&["version".to_string()]), &Value::Int(4));
    }

    #[test]
    fn test_update_ignore_version() {
        let meta = employee();
        let c = compiler(Dialect::Postgres);
        let options = EntityOptions::default().include(["name"]).ignore_version();
        let (sql, _) = c.build_update(&meta, &employee_value(), &options).unwrap();
        assert_eq!(sql.text, "update employee set name = ?, version = ? where id = ?");
    }

    #[test]
    fn test_update_null_version() {
        let meta = employee();
        let c = compiler(Dialect::Postgres);
        let e = Entity::new().with("id", 1i64);
        let err = c.build_update(&meta, &e, &EntityOptions::default()).unwrap_err();
        assert!(matches!(err, TwoWayError::Configuration(_)));
    }
}
