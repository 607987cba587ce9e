//! Insert-or-update compilation: `on conflict`, `on duplicate key` and
//! `merge into`, chosen by the dialect.

use tracing::debug;

use super::{EntityCompiler, EntityOptions, SqlBuilder, increment_version, key_leaves};
use crate::dialect::UpsertStyle;
use crate::entity::meta::{EntityMeta, LeafProp, PropKind};
use crate::entity::sequence::SequenceSource;
use crate::entity::value::Entity;
use crate::error::{TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::TypedValue;

/// What happens when the row already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertAction {
    #[default]
    Update,
    Ignore,
}

impl EntityCompiler {
    /// Insert, or update on a key conflict. `keys` are property names and
    /// default to the id properties. Dialects without `on conflict` or
    /// `on duplicate key` get a `merge` statement.
    ///
    /// With [`UpsertAction::Update`] and a versioned entity, the returned
    /// entity is the row as the update branch writes it: version plus one
    /// and a refreshed `updatedAt`. Otherwise it is the row as inserted.
    pub fn build_upsert(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
        keys: &[String],
        action: UpsertAction,
        sequences: &dyn SequenceSource,
    ) -> TwoWayResult<(BoundSql, Entity)> {
        let style = self.dialect.upsert_style();
        if style == UpsertStyle::MergeOnly {
            return self.build_merge(meta, entity, options, keys, action, sequences);
        }
        let prepared = self.prepare_insert(meta, entity, sequences, false)?;
        let keys = key_leaves(meta, keys)?;
        let leaves = options.target_leaves(meta);
        let set = update_leaves(&leaves, &keys);
        let version = meta.version_property();

        let mut sql = self.builder();
        let ignore = action == UpsertAction::Ignore;
        sql.push(if ignore && style == UpsertStyle::OnDuplicateKey {
            "insert ignore into "
        } else {
            "insert into "
        });
        sql.push(&meta.table)
            .push(" (")
            .columns(&leaves)
            .push(") values (")
            .values(&prepared, &leaves)
            .push(")");

        match (style, action) {
            (UpsertStyle::OnConflict, UpsertAction::Ignore) => {
                sql.push(" on conflict (").columns(&keys).push(") do nothing");
            }
            (UpsertStyle::OnConflict, UpsertAction::Update) => {
                sql.push(" on conflict (").columns(&keys).push(") do update set ");
                let mut items: Vec<String> = set
                    .iter()
                    .map(|l| format!("{} = excluded.{}", l.column(), l.column()))
                    .collect();
                if let Some(v) = version {
                    items.push(format!("{} = {}.{} + 1", v.column(), meta.table, v.column()));
                }
                sql.push(&items.join(", "));
                if let Some(v) = version.filter(|_| options.guards_version(meta)) {
                    sql.push(" where ")
                        .push(&meta.table)
                        .push(".")
                        .push(v.column())
                        .push(" = ")
                        .bind(TypedValue::new(prepared.get(&v.path).clone(), v.data_type()));
                }
            }
            (UpsertStyle::OnDuplicateKey, UpsertAction::Ignore) => {}
            (UpsertStyle::OnDuplicateKey, UpsertAction::Update) => {
                let mut items: Vec<String> = set
                    .iter()
                    .map(|l| format!("{} = values({})", l.column(), l.column()))
                    .collect();
                if let Some(v) = version {
                    items.push(format!("{} = {} + 1", v.column(), v.column()));
                }
                sql.push(" on duplicate key update ").push(&items.join(", "));
            }
            (UpsertStyle::MergeOnly, _) => {}
        }
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled upsert");
        if action == UpsertAction::Update && has_version(meta, entity) {
            if let Some(v) = version {
                let next = increment_version(meta, v, prepared.get(&v.path))?;
                let mut updated = prepared;
                updated.set(&v.path, next);
                return Ok((sql, updated));
            }
        }
        Ok((sql, prepared))
    }

    /// `merge into T using dual on (<keys>) when not matched then insert ...
    /// when matched [and version = <current>] then update set ...`.
    pub fn build_merge(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
        keys: &[String],
        action: UpsertAction,
        sequences: &dyn SequenceSource,
    ) -> TwoWayResult<(BoundSql, Entity)> {
        if !self.dialect.supports_merge() {
            return Err(TwoWayError::Unsupported {
                dialect: self.dialect.name(),
                operation: "merge",
            });
        }
        let prepared = self.prepare_insert(meta, entity, sequences, false)?;
        let keys = key_leaves(meta, keys)?;
        let leaves = options.target_leaves(meta);

        let mut sql = self.builder();
        sql.push("merge into ")
            .push(&meta.table)
            .push(" using dual on (")
            .assignments(&prepared, &keys, " and ")
            .push(") when not matched then insert (")
            .columns(&leaves)
            .push(") values (")
            .values(&prepared, &leaves)
            .push(")");

        let mut returned = prepared.clone();
        if action == UpsertAction::Update {
            let updated = self.prepare_update(meta, &prepared)?;
            merge_update(&mut sql, meta, &prepared, &updated, options, &leaves, &keys);
            if has_version(meta, entity) {
                returned = updated;
            }
        }
        let sql = sql.finish();
        debug!(entity = %meta.name, sql = %sql.text, "compiled merge");
        Ok((sql, returned))
    }
}

/// The caller holds a row that already has a version, so the update branch
/// is the expected outcome.
fn has_version(meta: &EntityMeta, entity: &Entity) -> bool {
    meta.version_property()
        .is_some_and(|v| !entity.get(&v.path).is_null())
}

fn merge_update(
    sql: &mut SqlBuilder,
    meta: &EntityMeta,
    prepared: &Entity,
    updated: &Entity,
    options: &EntityOptions,
    leaves: &[&LeafProp],
    keys: &[&LeafProp],
) {
    let set = update_leaves(leaves, keys);
    let version = meta.version_property();

    sql.push(" when matched");
    if let Some(v) = version.filter(|_| options.guards_version(meta)) {
        sql.push(" and ")
            .push(v.column())
            .push(" = ")
            .bind(TypedValue::new(prepared.get(&v.path).clone(), v.data_type()));
    }
    let mut assigned: Vec<&LeafProp> = set;
    assigned.extend(version);
    sql.push(" then update set ").assignments(updated, &assigned, ", ");
}

/// Columns an upsert overwrites: not keys, not ids, not `createdAt`, not the
/// version (which is incremented separately).
fn update_leaves<'m>(leaves: &[&'m LeafProp], keys: &[&LeafProp]) -> Vec<&'m LeafProp> {
    leaves
        .iter()
        .copied()
        .filter(|l| {
            !l.is_id()
                && !l.is_version()
                && l.prop.kind != PropKind::CreatedAt
                && !keys.iter().any(|k| k.path == l.path)
        })
        .collect()
}
