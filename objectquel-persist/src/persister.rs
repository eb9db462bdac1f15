//! INSERT / UPDATE / DELETE statements for single entities.

use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::normalizer::NormalizerRegistry;
use crate::snapshot::ColumnValues;
use objectquel_api::{
    AdapterError, ColumnType, DatabaseAdapter, EntityMetadata, KeyStrategy, Params, Value,
};
use tracing::debug;

pub struct Persister<'a> {
    metadata: &'a dyn EntityMetadata,
    normalizers: &'a NormalizerRegistry,
}

struct Target {
    entity: String,
    table: String,
    key_property: Option<String>,
    key_column: Option<String>,
}

fn failed(operation: &'static str, entity: &str) -> impl FnOnce(AdapterError) -> OrmError {
    let entity = entity.to_string();
    move |source| OrmError::Persister {
        operation,
        entity,
        source,
    }
}

impl<'a> Persister<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata, normalizers: &'a NormalizerRegistry) -> Self {
        Self {
            metadata,
            normalizers,
        }
    }

    fn target(&self, entity: &dyn Entity) -> Result<Target> {
        let name = self.metadata.normalize_entity_name(entity.entity_name());
        let table = self
            .metadata
            .table_name(&name)
            .ok_or_else(|| OrmError::MissingMetadata(name.clone()))?;
        let key_property = self.metadata.primary_key(&name);
        let key_column = key_property
            .as_ref()
            .and_then(|k| self.metadata.column_map(&name).remove(k));
        Ok(Target {
            entity: name,
            table,
            key_property,
            key_column,
        })
    }

    fn column_type(&self, entity: &str, property: &str) -> ColumnType {
        self.metadata
            .column_definition(entity, property)
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::String)
    }

    fn storage_value(&self, entity: &str, property: &str, value: &Value) -> Result<Value> {
        self.normalizers
            .normalize(self.column_type(entity, property), value)
    }

    /// Inserts `entity`, assigning its key per the entity's key strategy.
    pub fn insert(&self, adapter: &mut dyn DatabaseAdapter, entity: &mut dyn Entity) -> Result<()> {
        let target = self.target(entity)?;
        let strategy = self.metadata.key_strategy(&target.entity);
        let key_missing = target
            .key_property
            .as_deref()
            .is_some_and(|k| entity.get(k).is_null());

        if let (KeyStrategy::Uuid, true, Some(key)) =
            (strategy, key_missing, target.key_property.as_deref())
        {
            entity.set(key, Value::String(uuid::Uuid::new_v4().to_string()));
        }

        let mut columns = Vec::new();
        let mut params = Params::new();
        for (property, column) in self.metadata.column_map(&target.entity) {
            let value = entity.get(&property);
            let generated = strategy == KeyStrategy::Identity
                && target.key_property.as_deref() == Some(property.as_str())
                && value.is_null();
            if generated {
                continue;
            }
            params.insert(column.clone(), self.storage_value(&target.entity, &property, &value)?);
            columns.push(column);
        }

        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        debug!(entity = %target.entity, sql = %sql, "insert");
        adapter
            .execute(&sql, &params)
            .map_err(failed("insert", &target.entity))?;

        if strategy == KeyStrategy::Identity
            && key_missing
            && let Some(key) = target.key_property.as_deref()
            && let Some(id) = adapter.last_insert_id()
        {
            entity.set(key, id);
        }
        Ok(())
    }

    /// Writes only `changed` properties. Nothing is sent when the list is
    /// empty. The row is addressed by the key in `original` when given, so
    /// a changed key still finds the stored row.
    pub fn update(
        &self,
        adapter: &mut dyn DatabaseAdapter,
        entity: &dyn Entity,
        changed: &[String],
        original: Option<&ColumnValues>,
    ) -> Result<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let target = self.target(entity)?;
        let (Some(key_property), Some(key_column)) = (&target.key_property, &target.key_column)
        else {
            return Err(OrmError::MissingMetadata(format!(
                "{} has no identifier key",
                target.entity
            )));
        };

        let columns = self.metadata.column_map(&target.entity);
        let mut assignments = Vec::new();
        let mut params = Params::new();
        for property in changed {
            let Some(column) = columns.get(property) else {
                continue;
            };
            let value = self.storage_value(&target.entity, property, &entity.get(property))?;
            params.insert(column.clone(), value);
            assignments.push(format!("{column} = :{column}"));
        }
        if assignments.is_empty() {
            return Ok(());
        }
        let key = original
            .and_then(|o| o.get(key_property))
            .cloned()
            .unwrap_or_else(|| entity.get(key_property));
        let key_value = self.storage_value(&target.entity, key_property, &key)?;
        params.insert(format!("key_{key_column}"), key_value);

        let sql = format!(
            "UPDATE {} SET {} WHERE {key_column} = :key_{key_column}",
            target.table,
            assignments.join(", ")
        );
        debug!(entity = %target.entity, sql = %sql, "update");
        adapter
            .execute(&sql, &params)
            .map_err(failed("update", &target.entity))?;
        Ok(())
    }

    pub fn delete(&self, adapter: &mut dyn DatabaseAdapter, entity: &dyn Entity) -> Result<()> {
        let target = self.target(entity)?;
        let (Some(key_property), Some(key_column)) = (&target.key_property, &target.key_column)
        else {
            return Err(OrmError::MissingMetadata(format!(
                "{} has no identifier key",
                target.entity
            )));
        };
        let key_value = self.storage_value(&target.entity, key_property, &entity.get(key_property))?;
        let params = Params::new().with(key_column.clone(), key_value);
        let sql = format!("DELETE FROM {} WHERE {key_column} = :{key_column}", target.table);
        debug!(entity = %target.entity, sql = %sql, "delete");
        adapter
            .execute(&sql, &params)
            .map_err(failed("delete", &target.entity))?;
        Ok(())
    }
}
