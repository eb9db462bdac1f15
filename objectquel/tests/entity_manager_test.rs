use objectquel::{
    ColumnDefinition, ColumnType, Config, DirtyState, Entity, EntityDefinition, EntityManager,
    Error, MemoryAdapter, Params, Record, Row, SchemaMetadata, Value,
};
use objectquel::persist::TransactionEvent;
use std::any::Any;
use std::fs;

fn schema() -> SchemaMetadata {
    SchemaMetadata::new().with_entity(
        EntityDefinition::new("App\\Entity\\Product", "products")
            .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDefinition::new("name", ColumnType::String))
            .column(ColumnDefinition::new("price", ColumnType::Float))
            .column(ColumnDefinition::new("active", ColumnType::Boolean))
            .column(
                ColumnDefinition::new("createdAt", ColumnType::DateTime)
                    .column("created_at")
                    .nullable(),
            ),
    )
}

fn config() -> Config {
    Config::new().entity_namespace("App\\Entity")
}

fn kettle_row(alias: &str) -> Row {
    Row::default()
        .with(format!("{alias}.id"), 1)
        .with(format!("{alias}.name"), "Kettle")
        .with(format!("{alias}.price"), 20.0)
        .with(format!("{alias}.active"), 1)
        .with(format!("{alias}.createdAt"), "2024-03-01 12:30:00")
}

/// Hand-written entity type, hydrated through a registered factory.
#[derive(Debug, Default)]
struct Product {
    id: Option<i64>,
    name: String,
    price: f64,
    active: bool,
}

impl Entity for Product {
    fn entity_name(&self) -> &str {
        "App\\Entity\\Product"
    }

    fn get(&self, property: &str) -> Value {
        match property {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "price" => self.price.into(),
            "active" => self.active.into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, property: &str, value: Value) {
        match property {
            "id" => self.id = value.as_i64(),
            "name" => self.name = value.as_str().unwrap_or_default().to_string(),
            "price" => self.price = value.as_f64().unwrap_or_default(),
            "active" => self.active = value.as_bool().unwrap_or_default(),
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_query_hydrates_managed_entities() {
    let schema = schema();
    let adapter = MemoryAdapter::new()
        .with_result(vec![kettle_row("p")])
        .with_result(vec![kettle_row("p")]);
    let mut em = EntityManager::with_config(adapter, &schema, config());

    let query = "RANGE OF p IS Product; RETRIEVE (p) WHERE p.price > :min";
    let params = Params::new().with("min", 10);
    let rows = em.execute_query(query, &params).unwrap();
    assert_eq!(rows.len(), 1);
    let id = rows[0].entity("p").unwrap();

    let product = em.entity(id).unwrap();
    assert_eq!(product.get("name"), Value::from("Kettle"));
    assert_eq!(product.get("active"), Value::Bool(true));
    assert!(matches!(product.get("createdAt"), Value::DateTime(_)));
    assert_eq!(em.dirty_state(id), DirtyState::None);

    // Same key, same instance.
    let again = em.execute_query(query, &params).unwrap();
    assert_eq!(again[0].entity("p"), Some(id));
    assert_eq!(em.unit_of_work().len(), 1);

    let sql = &em.adapter().statements()[0].sql;
    assert!(sql.ends_with("FROM products p WHERE p.price > :min"), "{sql}");
}

#[test]
fn test_find_consults_identity_map_first() {
    let schema = schema();
    let adapter = MemoryAdapter::new().with_result(vec![kettle_row("e")]);
    let mut em = EntityManager::with_config(adapter, &schema, config());

    let id = em.find("Product", 1).unwrap().unwrap();
    assert_eq!(em.adapter().statements().len(), 1);
    assert!(em.adapter().statements()[0].sql.ends_with("WHERE e.id = :id"));

    assert_eq!(em.find("Product", 1).unwrap(), Some(id));
    assert_eq!(em.adapter().statements().len(), 1);

    assert_eq!(em.find("Product", 2).unwrap(), None);
    assert_eq!(em.adapter().statements().len(), 2);
}

#[test]
fn test_registered_factory_builds_typed_entities() {
    let schema = schema();
    let adapter = MemoryAdapter::new().with_result(vec![kettle_row("e")]);
    let mut em = EntityManager::with_config(adapter, &schema, config());
    em.register_factory("Product", || Box::new(Product::default()));

    let found = em
        .find_by("Product", &[("name", Value::from("Kettle"))])
        .unwrap();
    assert_eq!(found.len(), 1);

    let product = em.get::<Product>(found[0]).unwrap();
    assert_eq!(product.id, Some(1));
    assert_eq!(product.price, 20.0);
    assert!(product.active);
    assert!(em.get::<Record>(found[0]).is_none());

    em.get_mut::<Product>(found[0]).unwrap().price = 18.5;
    assert_eq!(em.dirty_state(found[0]), DirtyState::Dirty);
}

#[test]
fn test_persist_flush_and_remove() {
    let schema = schema();
    let mut em = EntityManager::with_config(MemoryAdapter::new(), &schema, config());

    let id = em
        .persist(Box::new(
            Record::new("App\\Entity\\Product")
                .with("name", "Mug")
                .with("price", 4.5)
                .with("active", false),
        ))
        .unwrap();
    assert_eq!(em.dirty_state(id), DirtyState::New);

    let summary = em.flush().unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(em.dirty_state(id), DirtyState::None);
    assert_eq!(em.entity(id).unwrap().get("id"), Value::Int(1));

    let insert = &em.adapter().statements()[0];
    assert_eq!(insert.params.get("active"), Some(&Value::Int(0)));

    em.remove(id).unwrap();
    em.flush().unwrap();
    assert_eq!(em.dirty_state(id), DirtyState::NotManaged);
    assert_eq!(
        em.adapter().transaction_log(),
        &[
            TransactionEvent::Begin,
            TransactionEvent::Commit,
            TransactionEvent::Begin,
            TransactionEvent::Commit,
        ]
    );
}

#[test]
fn test_explicit_transaction_spans_flushes() {
    let schema = schema();
    let mut em = EntityManager::with_config(MemoryAdapter::new(), &schema, config());
    em.begin_trans().unwrap();
    em.persist(Box::new(Record::new("App\\Entity\\Product").with("name", "A")))
        .unwrap();
    em.flush().unwrap();
    em.rollback_trans().unwrap();
    assert_eq!(
        em.adapter().transaction_log(),
        &[TransactionEvent::Begin, TransactionEvent::Rollback]
    );
    assert!(em.commit_trans().is_err());
}

#[test]
fn test_query_errors_surface_before_sql() {
    let schema = schema();
    let mut em = EntityManager::with_config(MemoryAdapter::new(), &schema, config());
    let err = em
        .execute_query("RANGE OF p IS Product; RETRIEVE (p.weight)", &Params::new())
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
    assert!(std::error::Error::source(&err).is_some());
    assert!(em.adapter().statements().is_empty());
}

#[test]
fn test_config_file_drives_json_sources() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("stock.json"),
        r#"[{"sku": 1, "count": 3}, {"sku": 2, "count": 0}]"#,
    )
    .unwrap();
    let config_path = dir.path().join("objectquel.json");
    fs::write(
        &config_path,
        format!(
            r#"{{"entity_namespaces": ["App\\Entity"], "json_source_dir": {}}}"#,
            serde_json::to_string(dir.path()).unwrap()
        ),
    )
    .unwrap();

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.json_source_dir.as_deref(), Some(dir.path()));

    let schema = schema();
    let adapter = MemoryAdapter::new().with_result(vec![
        Row::default().with("p.id", 1).with("p.name", "Kettle"),
        Row::default().with("p.id", 2).with("p.name", "Teapot"),
    ]);
    let mut em = EntityManager::with_config(adapter, &schema, config);
    let rows = em
        .execute_query(
            r#"RANGE OF p IS Product;
               RANGE OF s IS JSON_SOURCE("stock.json");
               RETRIEVE (p.name, s.count) WHERE p.id = s.sku AND s.count > 0"#,
            &Params::new(),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("p.name"), Some(&Value::from("Kettle")));
    assert_eq!(rows[0].value("s.count"), Some(&Value::Int(3)));
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
