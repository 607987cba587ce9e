use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use qail_twoway::entity::{EmbeddableDef, EntityDef, PropDef, PropDefKind, SequenceGenerator};
use qail_twoway::error::ExecutionError;
use qail_twoway::prelude::*;

/// Keeps `id -> version` for one table and honours version predicates.
#[derive(Default)]
struct InMemory {
    versions: Mutex<HashMap<i64, i64>>,
    sequence: Mutex<i64>,
    fetches: Mutex<u32>,
}

impl InMemory {
    fn id_and_version(values: &[TypedValue]) -> Option<(i64, i64)> {
        let n = values.len();
        Some((values.get(n.checked_sub(2)?)?.value.as_i64()?, values[n - 1].value.as_i64()?))
    }
}

impl Executor for InMemory {
    fn execute(&self, sql: &BoundSql) -> Result<u64, ExecutionError> {
        let mut versions = self.versions.lock().unwrap();
        if sql.text.starts_with("insert") {
            // id, name, version
            let id = sql.values[0].value.as_i64().unwrap();
            if versions.contains_key(&id) {
                return Err(ExecutionError::new("duplicate key").with_sql_state("23505"));
            }
            versions.insert(id, sql.values[2].value.as_i64().unwrap());
            return Ok(1);
        }
        if sql.text.starts_with("update") {
            let (id, expected) = Self::id_and_version(&sql.values).unwrap();
            return Ok(match versions.get_mut(&id) {
                Some(current) if *current == expected => {
                    *current += 1;
                    1
                }
                _ => 0,
            });
        }
        Err(ExecutionError::new(format!("unsupported: {}", sql.text)))
    }

    fn query(&self, _: &BoundSql) -> Result<Vec<Entity>, ExecutionError> {
        Ok(Vec::new())
    }

    fn next_sequence_value(&self, _: &str) -> Result<i64, ExecutionError> {
        *self.fetches.lock().unwrap() += 1;
        let mut next = self.sequence.lock().unwrap();
        let value = *next + 1;
        *next += 100;
        Ok(value)
    }
}

fn account() -> Arc<EntityMeta> {
    let registry = MetaRegistry::new();
    registry.register_entity(EntityDef {
        name: "Account".to_string(),
        table: None,
        properties: vec![
            PropDef::new(
                "id",
                DataType::Long,
                PropDefKind::IdSequence {
                    sequence: "account_seq".to_string(),
                    increment_by: 100,
                },
            ),
            PropDef::basic("name", DataType::String),
            PropDef::new("version", DataType::Long, PropDefKind::Version),
        ],
    });
    registry.get("Account").unwrap()
}

fn store() -> EntityStore<InMemory> {
    let compiler = EntityCompiler::new(Dialect::Postgres).with_sequences(Arc::new(SequenceGenerator::new()));
    EntityStore::new(InMemory::default(), compiler)
}

#[test]
fn test_sequence_batching_through_store() {
    let meta = account();
    let store = store();
    let rows: Vec<Entity> = (0..201).map(|i| Entity::new().with("name", format!("a{}", i))).collect();
    let inserted = store.insert_batch(&meta, &rows, &EntityOptions::default()).unwrap();
    let ids: Vec<i64> = inserted
        .iter()
        .map(|e| e.get(&["id".to_string()]).as_i64().unwrap())
        .collect();
    assert_eq!(ids, (1..=201).collect::<Vec<_>>());
    assert_eq!(*store.executor().fetches.lock().unwrap(), 3);
}

#[test]
fn test_stale_version_is_lock_failure() {
    let meta = account();
    let store = store();
    let options = EntityOptions::default();
    let inserted = store
        .insert(&meta, &Entity::new().with("name", "first"), &options)
        .unwrap();
    assert_eq!(inserted.get(&["version".to_string()]), &Value::Long(0));

    let updated = store.update(&meta, &inserted, &options).unwrap();
    assert_eq!(updated.get(&["version".to_string()]), &Value::Long(1));

    // same in-memory copy, now stale
    let err = store.update(&meta, &inserted, &options).unwrap_err();
    assert!(matches!(err, TwoWayError::OptimisticLock { count: 0, .. }), "{}", err);

    // the fresh copy still updates
    assert!(store.update(&meta, &updated, &options).is_ok());
}

fn order() -> Arc<EntityMeta> {
    let registry = MetaRegistry::new();
    registry.register_entity(EntityDef {
        name: "Order".to_string(),
        table: None,
        properties: vec![
            PropDef::new("id", DataType::Long, PropDefKind::IdAssign),
            PropDef::basic("name", DataType::String),
            PropDef::new("version", DataType::Long, PropDefKind::Version),
        ],
    });
    registry.get("Order").unwrap()
}

#[test]
fn test_duplicate_insert_is_unique_violation() {
    let meta = order();
    let store = store();
    let options = EntityOptions::default();
    let row = Entity::new().with("id", 7i64).with("name", "x");
    let inserted = store.insert(&meta, &row, &options).unwrap();
    assert_eq!(inserted.get(&["version".to_string()]), &Value::Long(0));

    let err = store.insert(&meta, &row, &options).unwrap_err();
    match err {
        TwoWayError::UniqueConstraint { table, source } => {
            assert_eq!(table, meta.table);
            assert_eq!(source.sql_state.as_deref(), Some("23505"));
        }
        other => panic!("expected a unique-constraint error, got {}", other),
    }
}

#[test]
fn test_include_exclude_are_complementary() {
    let registry = MetaRegistry::new();
    registry.register_embeddable(EmbeddableDef {
        name: "Address".to_string(),
        properties: vec![
            PropDef::basic("street", DataType::String),
            PropDef::basic("city", DataType::String),
        ],
    });
    registry.register_entity(EntityDef {
        name: "Person".to_string(),
        table: None,
        properties: vec![
            PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
            PropDef::basic("name", DataType::String),
            PropDef::basic("age", DataType::Int),
            PropDef::embedded("home", "Address"),
        ],
    });
    let meta = registry.get("Person").unwrap();
    let compiler = EntityCompiler::new(Dialect::H2);
    let person = Entity::new().with("id", 1).with("name", "p").with("age", 3);
    let no_sequences = |_: &str| -> TwoWayResult<i64> { Ok(0) };

    let columns = |options: EntityOptions| -> BTreeSet<String> {
        let (sql, _) = compiler.build_insert(&meta, &person, &options, &no_sequences).unwrap();
        let start = sql.text.find('(').unwrap() + 1;
        let end = sql.text.find(')').unwrap();
        sql.text[start..end].split(", ").map(str::to_string).collect()
    };

    let all: BTreeSet<String> = meta.columns("").into_iter().collect();
    for picked in [vec!["name"], vec!["home"], vec!["age", "home.city"]] {
        let included = columns(EntityOptions::default().include(picked.clone()));
        let excluded = columns(EntityOptions::default().exclude(picked));
        let union: BTreeSet<String> = included.union(&excluded).cloned().collect();
        assert_eq!(union, all);
        // ids appear in both; nothing else does
        let shared: Vec<String> = included.intersection(&excluded).cloned().collect();
        assert_eq!(shared, vec!["id".to_string()]);
    }
}

#[test]
fn test_registry_reports_bad_version_type() {
    let registry = MetaRegistry::new();
    registry.register_entity(EntityDef {
        name: "Broken".to_string(),
        table: None,
        properties: vec![
            PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
            PropDef::new("version", DataType::String, PropDefKind::Version),
        ],
    });
    assert!(matches!(registry.get("Broken").unwrap_err(), TwoWayError::Configuration(_)));
}

#[test]
fn test_update_include_exclude_are_complementary() {
    let registry = MetaRegistry::new();
    registry.register_embeddable(EmbeddableDef {
        name: "Address".to_string(),
        properties: vec![
            PropDef::basic("street", DataType::String),
            PropDef::basic("city", DataType::String),
        ],
    });
    registry.register_entity(EntityDef {
        name: "Person".to_string(),
        table: None,
        properties: vec![
            PropDef::new("id", DataType::Int, PropDefKind::IdAssign),
            PropDef::basic("name", DataType::String),
            PropDef::basic("age", DataType::Int),
            PropDef::embedded("home", "Address"),
        ],
    });
    let meta = registry.get("Person").unwrap();
    let compiler = EntityCompiler::new(Dialect::H2);
    let person = Entity::new().with("id", 1).with("name", "p").with("age", 3);

    let columns = |options: EntityOptions| -> BTreeSet<String> {
        let (sql, _) = compiler.build_update(&meta, &person, &options).unwrap();
        let start = sql.text.find(" set ").unwrap() + " set ".len();
        let end = sql.text.find(" where ").unwrap();
        sql.text[start..end]
            .split(", ")
            .map(|assignment| assignment.split(" = ").next().unwrap().to_string())
            .collect()
    };

    let all: BTreeSet<String> = meta.columns("").into_iter().filter(|c| c != "id").collect();
    for picked in [vec!["name"], vec!["home"], vec!["age", "home.city"]] {
        let included = columns(EntityOptions::default().include(picked.clone()));
        let excluded = columns(EntityOptions::default().exclude(picked));
        let union: BTreeSet<String> = included.union(&excluded).cloned().collect();
        assert_eq!(union, all);
        assert_eq!(included.intersection(&excluded).count(), 0);
    }
}
