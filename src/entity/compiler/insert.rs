//! INSERT compilation.

use tracing::debug;

use super::{EntityCompiler, EntityOptions, zero_of};
use crate::entity::meta::{EntityMeta, PropKind};
use crate::entity::sequence::SequenceSource;
use crate::entity::value::Entity;
use crate::error::{TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::{DataType, Value};

impl EntityCompiler {
    /// `insert into T (<columns>) values (<values>)`.
    ///
    /// Sequence ids are drawn, timestamps set and a missing version starts
    /// at 0; the returned entity carries those values.
    pub fn build_insert(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
        sequences: &dyn SequenceSource,
    ) -> TwoWayResult<(BoundSql, Entity)> {
        let prepared = self.prepare_insert(meta, entity, sequences, true)?;
        let leaves = options.target_leaves(meta);
        let mut sql = self.builder();
        sql.push("insert into ")
            .push(&meta.table)
            .push(" (")
            .columns(&leaves)
            .push(") values (")
            .values(&prepared, &leaves)
            .push(")");
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled insert");
        Ok((sql, prepared))
    }

    /// `insert into T (<columns>) values (...), (...)`.
    pub fn build_insert_multiple(
        &self,
        meta: &EntityMeta,
        entities: &[Entity],
        options: &EntityOptions,
        sequences: &dyn SequenceSource,
    ) -> TwoWayResult<(BoundSql, Vec<Entity>)> {
        if entities.is_empty() {
            return Err(TwoWayError::Configuration(format!(
                "entity '{}': a multi-row insert needs at least one entity",
                meta.name
            )));
        }
        let leaves = options.target_leaves(meta);
        let mut prepared = Vec::with_capacity(entities.len());
        let mut sql = self.builder();
        sql.push("insert into ")
            .push(&meta.table)
            .push(" (")
            .columns(&leaves)
            .push(") values ");
        for (i, entity) in entities.iter().enumerate() {
            let p = self.prepare_insert(meta, entity, sequences, true)?;
            if i > 0 {
                sql.push(", ");
            }
            sql.push("(").values(&p, &leaves).push(")");
            prepared.push(p);
        }
        let sql = sql.finish();
        debug!(entity = %meta.name, rows = entities.len(), "compiled multi-row insert");
        Ok((sql, prepared))
    }

    /// Apply insert-time assignments. With `always_draw_ids` false, only
    /// null sequence ids are drawn.
    pub(super) fn prepare_insert(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        sequences: &dyn SequenceSource,
        always_draw_ids: bool,
    ) -> TwoWayResult<Entity> {
        let mut prepared = entity.clone();
        let now = self.now();
        for leaf in meta.leaves() {
            match &leaf.prop.kind {
                PropKind::IdSequence { name, increment_by } => {
                    if always_draw_ids || prepared.get(&leaf.path).is_null() {
                        let key = format!("{}:{}", meta.name, name);
                        let id = self.sequences.next_id(&key, name, *increment_by, sequences)?;
                        let value = match leaf.data_type() {
                            DataType::Int => Value::Int(i32::try_from(id).map_err(|_| {
                                TwoWayError::Configuration(format!(
                                    "entity '{}': sequence '{}' value {} does not fit Int",
                                    meta.name, name, id
                                ))
                            })?),
                            _ => Value::Long(id),
                        };
                        prepared.set(&leaf.path, value);
                    }
                }
                PropKind::CreatedAt | PropKind::UpdatedAt => prepared.set(&leaf.path, now.clone()),
                PropKind::Version if prepared.get(&leaf.path).is_null() => prepared.set(&leaf.path, zero_of(leaf)),
                _ => {}
            }
        }
        Ok(prepared)
    }
}
