//! DELETE compilation.

use tracing::debug;

use super::{EntityCompiler, EntityOptions};
use crate::entity::meta::{EntityMeta, LeafProp};
use crate::entity::value::Entity;
use crate::error::TwoWayResult;
use crate::sql::BoundSql;

impl EntityCompiler {
    /// `delete from T where <ids> [and version = <current>]`.
    pub fn build_delete(&self, meta: &EntityMeta, entity: &Entity, options: &EntityOptions) -> TwoWayResult<BoundSql> {
        let mut predicates: Vec<&LeafProp> = meta.id_properties().collect();
        if options.guards_version(meta) {
            predicates.extend(meta.version_property());
        }
        let mut sql = self.builder();
        sql.push("delete from ")
            .push(&meta.table)
            .push(" where ")
            .assignments(entity, &predicates, " and ");
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled delete");
        Ok(sql)
    }
}
