//! SELECT-by-id compilation.

use tracing::debug;

use super::EntityCompiler;
use crate::entity::meta::EntityMeta;
use crate::error::{TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::{TypedValue, Value};

impl EntityCompiler {
    /// `select <columns> from T where <ids>`, with `ids` in id-property order.
    pub fn build_find_by_id(&self, meta: &EntityMeta, ids: &[Value]) -> TwoWayResult<BoundSql> {
        let id_leaves: Vec<_> = meta.id_properties().collect();
        if id_leaves.len() != ids.len() {
            return Err(TwoWayError::Configuration(format!(
                "entity '{}' has {} id properties but {} id values were given",
                meta.name,
                id_leaves.len(),
                ids.len()
            )));
        }
        let mut sql = self.builder();
        sql.push("select ")
            .push(&meta.columns("").join(", "))
            .push(" from ")
            .push(&meta.table)
            .push(" where ");
        for (i, (leaf, id)) in id_leaves.iter().zip(ids).enumerate() {
            if i > 0 {
                sql.push(" and ");
            }
            sql.push(leaf.column())
                .push(" = ")
                .bind(TypedValue::new(id.clone(), leaf.data_type()));
        }
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled find by id");
        Ok(sql)
    }
}
