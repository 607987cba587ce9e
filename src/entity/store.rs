//! Running compiled entity statements against an execution boundary.
//!
//! The store owns the caller-side checks: a version-guarded statement that
//! does not affect exactly one row is a lost update, and a duplicate-key
//! failure reported by the boundary becomes a unique-constraint error.

use tracing::{debug, warn};

use super::compiler::{EntityCompiler, EntityOptions, UpsertAction};
use super::meta::EntityMeta;
use super::value::Entity;
use crate::dialect::UpsertStyle;
use crate::error::{ExecutionError, TwoWayError, TwoWayResult};
use crate::sql::BoundSql;
use crate::value::Value;

/// The physical execution boundary (driver, connection or test double).
pub trait Executor {
    /// Run a row-affecting statement and return the affected-row count.
    fn execute(&self, sql: &BoundSql) -> Result<u64, ExecutionError>;

    /// Run statements as one batch; one count per statement.
    fn execute_batch(&self, statements: &[BoundSql]) -> Result<Vec<u64>, ExecutionError> {
        statements.iter().map(|s| self.execute(s)).collect()
    }

    /// Run a query and return its rows as entities.
    fn query(&self, sql: &BoundSql) -> Result<Vec<Entity>, ExecutionError>;

    /// Next value of a database sequence.
    fn next_sequence_value(&self, sequence: &str) -> Result<i64, ExecutionError>;
}

pub struct EntityStore<E: Executor> {
    executor: E,
    compiler: EntityCompiler,
}

impl<E: Executor> EntityStore<E> {
    pub fn new(executor: E, compiler: EntityCompiler) -> Self {
        Self { executor, compiler }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn compiler(&self) -> &EntityCompiler {
        &self.compiler
    }

    fn next_sequence_value(&self, sequence: &str) -> TwoWayResult<i64> {
        Ok(self.executor.next_sequence_value(sequence)?)
    }

    fn classify(&self, meta: &EntityMeta, error: ExecutionError) -> TwoWayError {
        if self.compiler.dialect().is_unique_violation(&error) {
            TwoWayError::UniqueConstraint {
                table: meta.table.clone(),
                source: error,
            }
        } else {
            TwoWayError::Execution(error)
        }
    }

    fn check_count(&self, meta: &EntityMeta, options: &EntityOptions, count: u64, index: Option<usize>) -> TwoWayResult<()> {
        if count == 1 || !options.guards_version(meta) {
            return Ok(());
        }
        if options.suppress_optimistic_lock_error {
            warn!(table = %meta.table, count, "optimistic lock failure suppressed");
            return Ok(());
        }
        Err(TwoWayError::OptimisticLock {
            table: meta.table.clone(),
            count,
            index,
        })
    }

    pub fn insert(&self, meta: &EntityMeta, entity: &Entity, options: &EntityOptions) -> TwoWayResult<Entity> {
        let source = |name: &str| self.next_sequence_value(name);
        let (sql, inserted) = self.compiler.build_insert(meta, entity, options, &source)?;
        self.executor.execute(&sql).map_err(|e| self.classify(meta, e))?;
        Ok(inserted)
    }

    pub fn insert_batch(&self, meta: &EntityMeta, entities: &[Entity], options: &EntityOptions) -> TwoWayResult<Vec<Entity>> {
        let source = |name: &str| self.next_sequence_value(name);
        let mut statements = Vec::with_capacity(entities.len());
        let mut inserted = Vec::with_capacity(entities.len());
        for entity in entities {
            let (sql, e) = self.compiler.build_insert(meta, entity, options, &source)?;
            statements.push(sql);
            inserted.push(e);
        }
        self.executor
            .execute_batch(&statements)
            .map_err(|e| self.classify(meta, e))?;
        debug!(table = %meta.table, rows = inserted.len(), "batch insert");
        Ok(inserted)
    }

    /// Update and return the entity with its new version.
    pub fn update(&self, meta: &EntityMeta, entity: &Entity, options: &EntityOptions) -> TwoWayResult<Entity> {
        let (sql, updated) = self.compiler.build_update(meta, entity, options)?;
        let count = self.executor.execute(&sql).map_err(|e| self.classify(meta, e))?;
        self.check_count(meta, options, count, None)?;
        Ok(updated)
    }

    pub fn update_batch(&self, meta: &EntityMeta, entities: &[Entity], options: &EntityOptions) -> TwoWayResult<Vec<Entity>> {
        let mut statements = Vec::with_capacity(entities.len());
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            let (sql, e) = self.compiler.build_update(meta, entity, options)?;
            statements.push(sql);
            updated.push(e);
        }
        let counts = self
            .executor
            .execute_batch(&statements)
            .map_err(|e| self.classify(meta, e))?;
        for (i, count) in counts.into_iter().enumerate() {
            self.check_count(meta, options, count, Some(i))?;
        }
        Ok(updated)
    }

    pub fn delete(&self, meta: &EntityMeta, entity: &Entity, options: &EntityOptions) -> TwoWayResult<()> {
        let sql = self.compiler.build_delete(meta, entity, options)?;
        let count = self.executor.execute(&sql).map_err(|e| self.classify(meta, e))?;
        self.check_count(meta, options, count, None)
    }

    pub fn delete_batch(&self, meta: &EntityMeta, entities: &[Entity], options: &EntityOptions) -> TwoWayResult<()> {
        let statements = entities
            .iter()
            .map(|e| self.compiler.build_delete(meta, e, options))
            .collect::<TwoWayResult<Vec<_>>>()?;
        let counts = self
            .executor
            .execute_batch(&statements)
            .map_err(|e| self.classify(meta, e))?;
        for (i, count) in counts.into_iter().enumerate() {
            self.check_count(meta, options, count, Some(i))?;
        }
        Ok(())
    }

    /// Insert or update; returns the affected-row count and the entity as
    /// the statement leaves it. See [`EntityCompiler::build_upsert`] for the
    /// version it carries.
    pub fn upsert(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
        keys: &[String],
        action: UpsertAction,
    ) -> TwoWayResult<(u64, Entity)> {
        let source = |name: &str| self.next_sequence_value(name);
        let (sql, upserted) = self.compiler.build_upsert(meta, entity, options, keys, action, &source)?;
        let count = self.executor.execute(&sql).map_err(|e| self.classify(meta, e))?;
        // on duplicate key carries no version predicate
        let guarded = action == UpsertAction::Update
            && self.compiler.dialect().upsert_style() != UpsertStyle::OnDuplicateKey;
        if guarded && count == 0 {
            self.check_count(meta, options, count, None)?;
        }
        Ok((count, upserted))
    }

    pub fn merge(
        &self,
        meta: &EntityMeta,
        entity: &Entity,
        options: &EntityOptions,
        keys: &[String],
        action: UpsertAction,
    ) -> TwoWayResult<(u64, Entity)> {
        let source = |name: &str| self.next_sequence_value(name);
        let (sql, merged) = self.compiler.build_merge(meta, entity, options, keys, action, &source)?;
        let count = self.executor.execute(&sql).map_err(|e| self.classify(meta, e))?;
        if action == UpsertAction::Update && count == 0 {
            self.check_count(meta, options, count, None)?;
        }
        Ok((count, merged))
    }

    pub fn find_by_id(&self, meta: &EntityMeta, ids: &[Value]) -> TwoWayResult<Option<Entity>> {
        let sql = self.compiler.build_find_by_id(meta, ids)?;
        let rows = self.executor.query(&sql)?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::entity::compiler::fixtures::{employee, employee_value, fixed_now};
    use crate::entity::sequence::SequenceGenerator;
    use std::sync::{Arc, Mutex};

    /// Returns queued counts, or a queued error.
    #[derive(Default)]
    struct Scripted {
        counts: Mutex<Vec<Result<u64, ExecutionError>>>,
        executed: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(counts: Vec<Result<u64, ExecutionError>>) -> Self {
            Self {
                counts: Mutex::new(counts),
                executed: Mutex::new(Vec::new()),
            }
        }
    }

    impl Executor for Scripted {
        fn execute(&self, sql: &BoundSql) -> Result<u64, ExecutionError> {
            self.executed.lock().unwrap().push(sql.text.clone());
            let mut counts = self.counts.lock().unwrap();
            if counts.is_empty() { Ok(1) } else { counts.remove(0) }
        }

        fn query(&self, _: &BoundSql) -> Result<Vec<Entity>, ExecutionError> {
            Ok(vec![employee_value()])
        }

        fn next_sequence_value(&self, _: &str) -> Result<i64, ExecutionError> {
            Ok(1000)
        }
    }

    fn store(executor: Scripted, dialect: Dialect) -> EntityStore<Scripted> {
        let compiler = EntityCompiler::new(dialect)
            .with_clock(fixed_now)
            .with_sequences(Arc::new(SequenceGenerator::new()));
        EntityStore::new(executor, compiler)
    }

    #[test]
    fn test_update_zero_rows_is_lock_failure() {
        let s = store(Scripted::with(vec![Ok(0)]), Dialect::Postgres);
        let err = s
            .update(&employee(), &employee_value(), &EntityOptions::default())
            .unwrap_err();
        assert!(matches!(err, TwoWayError::OptimisticLock { count: 0, index: None, .. }));
    }

    #[test]
    fn test_suppressed_lock_failure() {
        let s = store(Scripted::with(vec![Ok(0)]), Dialect::Postgres);
        let options = EntityOptions::default().suppress_optimistic_lock_error();
        assert!(s.update(&employee(), &employee_value(), &options).is_ok());
    }

    #[test]
    fn test_ignore_version_skips_check() {
        let s = store(Scripted::with(vec![Ok(0)]), Dialect::Postgres);
        let options = EntityOptions::default().ignore_version();
        assert!(s.delete(&employee(), &employee_value(), &options).is_ok());
    }

    #[test]
    fn test_batch_reports_element() {
        let s = store(Scripted::with(vec![Ok(1), Ok(0)]), Dialect::Postgres);
        let rows = vec![employee_value(), employee_value()];
        let err = s.update_batch(&employee(), &rows, &EntityOptions::default()).unwrap_err();
        assert!(matches!(err, TwoWayError::OptimisticLock { index: Some(1), .. }));
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let dup = ExecutionError::new("duplicate key").with_sql_state("23505");
        let s = store(Scripted::with(vec![Err(dup)]), Dialect::Postgres);
        let err = s
            .insert(&employee(), &employee_value(), &EntityOptions::default())
            .unwrap_err();
        assert!(matches!(err, TwoWayError::UniqueConstraint { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_other_failures_pass_through() {
        let s = store(Scripted::with(vec![Err(ExecutionError::new("timeout"))]), Dialect::Postgres);
        let err = s
            .insert(&employee(), &employee_value(), &EntityOptions::default())
            .unwrap_err();
        assert!(matches!(err, TwoWayError::Execution(_)));
    }

    #[test]
    fn test_delete_failures_are_classified() {
        let dup = ExecutionError::new("duplicate key").with_sql_state("23505");
        let s = store(Scripted::with(vec![Err(dup)]), Dialect::Postgres);
        let err = s
            .delete(&employee(), &employee_value(), &EntityOptions::default())
            .unwrap_err();
        assert!(matches!(err, TwoWayError::UniqueConstraint { .. }), "{}", err);

        let dup = ExecutionError::new("duplicate key").with_sql_state("23505");
        let s = store(Scripted::with(vec![Ok(1), Err(dup)]), Dialect::Postgres);
        let rows = vec![employee_value(), employee_value()];
        let err = s.delete_batch(&employee(), &rows, &EntityOptions::default()).unwrap_err();
        assert!(matches!(err, TwoWayError::UniqueConstraint { .. }), "{}", err);

        let s = store(Scripted::with(vec![Err(ExecutionError::new("timeout"))]), Dialect::Postgres);
        let err = s
            .delete(&employee(), &employee_value(), &EntityOptions::default())
            .unwrap_err();
        assert!(matches!(err, TwoWayError::Execution(_)));
    }

    #[test]
    fn test_upsert_returns_next_version() {
        let s = store(Scripted::with(vec![Ok(1)]), Dialect::Postgres);
        let (count, upserted) = s
            .upsert(&employee(), &employee_value(), &EntityOptions::default(), &[], UpsertAction::Update)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(upserted.get(&["version".to_string()]), &Value::Int(4));

        let s = store(Scripted::with(vec![Ok(0)]), Dialect::H2);
        let err = s
            .merge(&employee(), &employee_value(), &EntityOptions::default(), &[], UpsertAction::Update)
            .unwrap_err();
        assert!(matches!(err, TwoWayError::OptimisticLock { count: 0, .. }));
    }

    #[test]
    fn test_insert_uses_executor_sequence() {
        let s = store(Scripted::default(), Dialect::Postgres);
        let inserted = s
            .insert(&employee(), &Entity::new().with("name", "x"), &EntityOptions::default())
            .unwrap();
        assert_eq!(inserted.get(&["id".to_string()]), &Value::Long(1000));
    }

    #[test]
    fn test_find_by_id() {
        let s = store(Scripted::default(), Dialect::Postgres);
        let found = s.find_by_id(&employee(), &[Value::Long(7)]).unwrap();
        assert_eq!(found, Some(employee_value()));
    }
}
