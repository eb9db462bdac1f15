//! Turns result rows into managed entities.

use crate::error::Result;
use objectquel_api::{ColumnType, EntityMetadata, Row, Value};
use objectquel_persist::{Entity, EntityId, Record, UnitOfWork};
use objectquel_query::Projection;
use std::collections::HashMap;

/// Builds an empty instance of one entity type.
pub type EntityFactory = Box<dyn Fn() -> Box<dyn Entity>>;

/// One projected value: a managed entity or a plain value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Entity(EntityId),
    Value(Value),
}

/// A hydrated result row, in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    fields: Vec<(String, Field)>,
}

impl ResultRow {
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn entity(&self, name: &str) -> Option<EntityId> {
        match self.get(name)? {
            Field::Entity(id) => Some(*id),
            Field::Value(_) => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            Field::Value(v) => Some(v),
            Field::Entity(_) => None,
        }
    }

    pub fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct Hydrator<'a, 'm> {
    uow: &'a mut UnitOfWork<'m>,
    factories: &'a HashMap<String, EntityFactory>,
}

impl<'a, 'm> Hydrator<'a, 'm> {
    pub fn new(uow: &'a mut UnitOfWork<'m>, factories: &'a HashMap<String, EntityFactory>) -> Self {
        Self { uow, factories }
    }

    pub fn hydrate(&mut self, rows: Vec<Row>, projections: &[Projection]) -> Result<Vec<ResultRow>> {
        let mut hydrated = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = Vec::with_capacity(projections.len());
            for projection in projections {
                let field = match &projection.entity {
                    Some(entity) => match self.entity(&row, &projection.name, entity)? {
                        Some(id) => Field::Entity(id),
                        None => Field::Value(Value::Null),
                    },
                    None => Field::Value(row.get(&projection.name).cloned().unwrap_or_default()),
                };
                fields.push((projection.name.clone(), field));
            }
            hydrated.push(ResultRow { fields });
        }
        Ok(hydrated)
    }

    /// Managed instance for the `alias.*` columns of `row`. An unmatched
    /// outer join (every column null) yields `None`.
    fn entity(&mut self, row: &Row, alias: &str, entity: &str) -> Result<Option<EntityId>> {
        let metadata = self.uow.metadata();
        let name = metadata.normalize_entity_name(entity);

        let mut values = Vec::new();
        for property in metadata.column_map(&name).into_keys() {
            let raw = row
                .get(&format!("{alias}.{property}"))
                .cloned()
                .unwrap_or_default();
            let value = self
                .uow
                .normalizers()
                .denormalize(column_type(metadata, &name, &property), &raw)?;
            values.push((property, value));
        }
        if values.iter().all(|(_, v)| v.is_null()) {
            return Ok(None);
        }

        let key: Vec<Value> = metadata
            .identifier_keys(&name)
            .iter()
            .map(|k| {
                values
                    .iter()
                    .find(|(p, _)| p == k)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect();
        if let Some(existing) = self.uow.find_by_key(&name, &key) {
            return Ok(Some(existing));
        }

        let mut instance = match self.factories.get(&name) {
            Some(factory) => factory(),
            None => Box::new(Record::new(name.clone())),
        };
        for (property, value) in values {
            instance.set(&property, value);
        }
        Ok(Some(self.uow.attach(instance)?))
    }
}

fn column_type(metadata: &dyn EntityMetadata, entity: &str, property: &str) -> ColumnType {
    metadata
        .column_definition(entity, property)
        .map(|c| c.column_type)
        .unwrap_or(ColumnType::String)
}
