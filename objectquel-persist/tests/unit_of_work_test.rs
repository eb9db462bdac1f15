use objectquel_api::{
    ColumnDefinition, ColumnType, EntityDefinition, KeyStrategy, Relation, SchemaMetadata, Value,
};
use objectquel_persist::{
    DirtyState, EntityId, LifecycleEvent, MemoryAdapter, OrmError, Record, TransactionEvent, UnitOfWork,
};

/// A -> B -> C through `parent`, and C -> A so a cycle can be closed.
fn chain_schema() -> SchemaMetadata {
    let node = |name: &str, table: &str, parent: &str| {
        EntityDefinition::new(name, table)
            .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDefinition::new("name", ColumnType::String))
            .column(
                ColumnDefinition::new("parentId", ColumnType::Integer)
                    .column("parent_id")
                    .nullable(),
            )
            .relation(
                "parent",
                Relation::many_to_one(parent).relation_column("parentId"),
            )
    };
    SchemaMetadata::new()
        .with_entity(node("A", "a", "B"))
        .with_entity(node("B", "b", "C"))
        .with_entity(node("C", "c", "A"))
}

fn link(uow: &mut UnitOfWork<'_>, child: EntityId, parent: EntityId) {
    uow.get_mut::<Record>(child)
        .unwrap()
        .set_relation("parent", Some(parent));
}

#[test]
fn test_flush_writes_parents_first() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let a = uow.persist(Box::new(Record::new("A").with("name", "a"))).unwrap();
    let b = uow.persist(Box::new(Record::new("B").with("name", "b"))).unwrap();
    let c = uow.persist(Box::new(Record::new("C").with("name", "c"))).unwrap();
    link(&mut uow, a, b);
    link(&mut uow, b, c);

    assert_eq!(uow.flush_order().unwrap(), vec![c, b, a]);

    let mut adapter = MemoryAdapter::new();
    let summary = uow.flush(&mut adapter).unwrap();
    assert_eq!(summary.inserted, 3);

    let sql: Vec<&str> = adapter.statements().iter().map(|s| s.sql.as_str()).collect();
    assert_eq!(
        sql,
        vec![
            "INSERT INTO c (name, parent_id) VALUES (:name, :parent_id)",
            "INSERT INTO b (name, parent_id) VALUES (:name, :parent_id)",
            "INSERT INTO a (name, parent_id) VALUES (:name, :parent_id)",
        ]
    );
    // Keys assigned by the backend flow into the children.
    assert_eq!(adapter.statements()[1].params.get("parent_id"), Some(&Value::Int(1)));
    assert_eq!(adapter.statements()[2].params.get("parent_id"), Some(&Value::Int(2)));
    assert_eq!(
        adapter.transaction_log(),
        &[TransactionEvent::Begin, TransactionEvent::Commit]
    );
    assert_eq!(uow.get::<Record>(a).unwrap().values().get("id"), Some(&Value::Int(3)));
}

#[test]
fn test_cycle_fails_before_any_database_call() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let a = uow.persist(Box::new(Record::new("A"))).unwrap();
    let b = uow.persist(Box::new(Record::new("B"))).unwrap();
    let c = uow.persist(Box::new(Record::new("C"))).unwrap();
    link(&mut uow, a, b);
    link(&mut uow, b, c);
    link(&mut uow, c, a);

    let mut adapter = MemoryAdapter::new();
    match uow.flush(&mut adapter).unwrap_err() {
        OrmError::RelationshipCycle { entities } => {
            assert_eq!(entities, vec!["A#1", "B#2", "C#3"]);
        }
        other => panic!("expected a cycle error, got {other}"),
    }
    assert!(adapter.statements().is_empty());
    assert!(adapter.transaction_log().is_empty());
    assert_eq!(uow.dirty_state(a), DirtyState::New);
}

#[test]
fn test_dirty_state_follows_entity_lifecycle() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();

    let id = uow.persist(Box::new(Record::new("A").with("name", "draft"))).unwrap();
    assert_eq!(uow.dirty_state(id), DirtyState::New);

    uow.flush(&mut adapter).unwrap();
    assert_eq!(uow.dirty_state(id), DirtyState::None);

    uow.entity_mut(id).unwrap().set("name", Value::from("final"));
    assert_eq!(uow.dirty_state(id), DirtyState::Dirty);
    let summary = uow.flush(&mut adapter).unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(
        adapter.statements().last().unwrap().sql,
        "UPDATE a SET name = :name WHERE id = :key_id"
    );
    assert_eq!(uow.dirty_state(id), DirtyState::None);

    uow.remove(id).unwrap();
    assert_eq!(uow.dirty_state(id), DirtyState::Deleted);
    uow.flush(&mut adapter).unwrap();
    assert_eq!(
        adapter.statements().last().unwrap().sql,
        "DELETE FROM a WHERE id = :id"
    );
    assert_eq!(uow.dirty_state(id), DirtyState::NotManaged);
    assert!(uow.is_empty());
}

#[test]
fn test_lifecycle_events_wrap_persister_calls() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();
    let id = uow.persist(Box::new(Record::new("A").with("name", "x"))).unwrap();
    uow.flush(&mut adapter).unwrap();
    uow.entity_mut(id).unwrap().set("name", Value::from("y"));
    uow.flush(&mut adapter).unwrap();

    assert_eq!(
        uow.get::<Record>(id).unwrap().events(),
        &[
            LifecycleEvent::PrePersist,
            LifecycleEvent::PostPersist,
            LifecycleEvent::PreUpdate,
            LifecycleEvent::PostUpdate,
        ]
    );
}

#[test]
fn test_clean_flush_opens_no_transaction() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();
    uow.attach(Box::new(Record::new("A").with("id", 5).with("name", "kept")))
        .unwrap();

    assert!(uow.flush(&mut adapter).unwrap().is_empty());
    assert!(adapter.transaction_log().is_empty());
}

#[test]
fn test_failed_statement_rolls_back() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let a = uow.persist(Box::new(Record::new("A").with("name", "a"))).unwrap();
    let b = uow.persist(Box::new(Record::new("B").with("name", "b"))).unwrap();
    link(&mut uow, a, b);

    let mut adapter = MemoryAdapter::new();
    adapter.fail_on("INSERT INTO a");
    let err = uow.flush(&mut adapter).unwrap_err();
    match &err {
        OrmError::Persister {
            operation, entity, ..
        } => {
            assert_eq!(*operation, "insert");
            assert_eq!(entity, "A");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(
        adapter.transaction_log(),
        &[TransactionEvent::Begin, TransactionEvent::Rollback]
    );
    assert_eq!(uow.dirty_state(a), DirtyState::New);
    assert_eq!(uow.transaction_depth(), 0);
}

#[test]
fn test_failed_commit_rolls_back() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let c = uow.persist(Box::new(Record::new("C").with("name", "c"))).unwrap();

    let mut adapter = MemoryAdapter::new();
    adapter.fail_commit();
    let err = uow.flush(&mut adapter).unwrap_err();
    assert!(matches!(err, OrmError::Transaction(_)), "{err}");
    assert_eq!(
        adapter.transaction_log(),
        &[TransactionEvent::Begin, TransactionEvent::Rollback]
    );
    assert_eq!(uow.transaction_depth(), 0);
    assert!(uow.contains(c));
}

#[test]
fn test_changed_key_updates_the_stored_row() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();
    let id = uow
        .attach(Box::new(Record::new("A").with("id", 5).with("name", "kept")))
        .unwrap();

    uow.entity_mut(id).unwrap().set("id", Value::Int(6));
    uow.flush(&mut adapter).unwrap();

    let statement = adapter.statements().last().unwrap();
    assert_eq!(statement.sql, "UPDATE a SET id = :id WHERE id = :key_id");
    assert_eq!(statement.params.get("id"), Some(&Value::Int(6)));
    assert_eq!(statement.params.get("key_id"), Some(&Value::Int(5)));
    assert_eq!(uow.find_by_key("A", &[Value::Int(6)]), Some(id));
}

#[test]
fn test_flush_joins_an_open_transaction() {
    let schema = chain_schema();
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();
    uow.begin_trans(&mut adapter).unwrap();
    uow.persist(Box::new(Record::new("C").with("name", "c"))).unwrap();
    uow.flush(&mut adapter).unwrap();
    assert_eq!(adapter.transaction_log(), &[TransactionEvent::Begin]);

    uow.commit_trans(&mut adapter).unwrap();
    assert_eq!(
        adapter.transaction_log(),
        &[TransactionEvent::Begin, TransactionEvent::Commit]
    );
}

#[test]
fn test_uuid_keys_are_generated_and_indexed() {
    let schema = SchemaMetadata::new().with_entity(
        EntityDefinition::new("Session", "sessions")
            .key_strategy(KeyStrategy::Uuid)
            .column(ColumnDefinition::new("id", ColumnType::Guid).primary_key())
            .column(ColumnDefinition::new("user", ColumnType::String)),
    );
    let mut uow = UnitOfWork::new(&schema);
    let mut adapter = MemoryAdapter::new();
    let id = uow
        .persist(Box::new(Record::new("Session").with("user", "ada")))
        .unwrap();
    uow.flush(&mut adapter).unwrap();

    let key = uow.entity(id).unwrap().get("id");
    assert!(matches!(key, Value::String(_)));
    assert_eq!(uow.find_by_key("Session", &[key]), Some(id));
    assert_eq!(
        adapter.statements()[0].sql,
        "INSERT INTO sessions (id, user) VALUES (:id, :user)"
    );
}
