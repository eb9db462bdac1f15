use crate::metadata::{
    Annotation, ColumnDefinition, EntityMetadata, KeyStrategy, Relation, RelationKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relation declared on a property, as written in a schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub property: String,
    #[serde(flatten)]
    pub relation: Relation,
}

/// Declarative description of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            key_strategy: KeyStrategy::Identity,
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, property: impl Into<String>, relation: Relation) -> Self {
        self.relations.push(RelationDefinition {
            property: property.into(),
            relation,
        });
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    fn relations_of(&self, kind: RelationKind) -> BTreeMap<String, Relation> {
        self.relations
            .iter()
            .filter(|r| r.relation.kind == kind)
            .map(|r| (r.property.clone(), r.relation.clone()))
            .collect()
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    entities: Vec<EntityDefinition>,
}

/// In-memory [`EntityMetadata`] built from entity definitions.
///
/// # Example
///
/// ```
/// use objectquel_api::{ColumnDefinition, ColumnType, EntityDefinition, EntityMetadata, SchemaMetadata};
///
/// let schema = SchemaMetadata::new().with_entity(
///     EntityDefinition::new("Product", "products")
///         .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
///         .column(ColumnDefinition::new("name", ColumnType::String).column("product_name")),
/// );
/// assert_eq!(schema.table_name("\\Product").as_deref(), Some("products"));
/// assert_eq!(schema.column_map("Product")["name"], "product_name");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    entities: BTreeMap<String, EntityDefinition>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, definition: EntityDefinition) -> Self {
        self.add_entity(definition);
        self
    }

    pub fn add_entity(&mut self, mut definition: EntityDefinition) {
        definition.name = self.normalize_entity_name(&definition.name);
        for column in &mut definition.columns {
            if column.name.is_empty() {
                column.name = column.property.clone();
            }
        }
        self.entities.insert(definition.name.clone(), definition);
    }

    /// Parses `{"entities": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: SchemaFile = serde_json::from_str(json)?;
        let mut schema = Self::new();
        for definition in file.entities {
            schema.add_entity(definition);
        }
        Ok(schema)
    }

    pub fn definition(&self, entity: &str) -> Option<&EntityDefinition> {
        self.entities.get(&self.normalize_entity_name(entity))
    }
}

impl EntityMetadata for SchemaMetadata {
    fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    fn entity_exists(&self, entity: &str) -> bool {
        self.definition(entity).is_some()
    }

    fn table_name(&self, entity: &str) -> Option<String> {
        self.definition(entity).map(|d| d.table.clone())
    }

    fn column_map(&self, entity: &str) -> BTreeMap<String, String> {
        self.definition(entity)
            .map(|d| {
                d.columns
                    .iter()
                    .map(|c| (c.property.clone(), c.column_name().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn identifier_keys(&self, entity: &str) -> Vec<String> {
        self.definition(entity)
            .map(|d| {
                d.columns
                    .iter()
                    .filter(|c| c.primary_key)
                    .map(|c| c.property.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn one_to_one_dependencies(&self, entity: &str) -> BTreeMap<String, Relation> {
        self.definition(entity)
            .map(|d| d.relations_of(RelationKind::OneToOne))
            .unwrap_or_default()
    }

    fn many_to_one_dependencies(&self, entity: &str) -> BTreeMap<String, Relation> {
        self.definition(entity)
            .map(|d| d.relations_of(RelationKind::ManyToOne))
            .unwrap_or_default()
    }

    fn one_to_many_dependencies(&self, entity: &str) -> BTreeMap<String, Relation> {
        self.definition(entity)
            .map(|d| d.relations_of(RelationKind::OneToMany))
            .unwrap_or_default()
    }

    fn annotations(&self, entity: &str) -> BTreeMap<String, Vec<Annotation>> {
        let mut out: BTreeMap<String, Vec<Annotation>> = BTreeMap::new();
        let Some(definition) = self.definition(entity) else {
            return out;
        };
        for column in &definition.columns {
            let list = out.entry(column.property.clone()).or_default();
            list.push(Annotation::Column(column.clone()));
            if column.primary_key {
                list.push(Annotation::PrimaryKeyStrategy {
                    strategy: definition.key_strategy,
                });
            }
        }
        for r in &definition.relations {
            let annotation = match r.relation.kind {
                RelationKind::OneToOne => Annotation::OneToOne(r.relation.clone()),
                RelationKind::ManyToOne => Annotation::ManyToOne(r.relation.clone()),
                RelationKind::OneToMany => Annotation::OneToMany(r.relation.clone()),
            };
            out.entry(r.property.clone()).or_default().push(annotation);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnType;

    fn schema() -> SchemaMetadata {
        SchemaMetadata::from_json_str(
            r#"{
                "entities": [
                    {
                        "name": "\\App\\Entity\\Order",
                        "table": "orders",
                        "key_strategy": "uuid",
                        "columns": [
                            {"property": "id", "type": "guid", "primary_key": true},
                            {"property": "customerId", "name": "customer_id", "type": "integer", "nullable": true}
                        ],
                        "relations": [
                            {"property": "customer", "kind": "many_to_one", "target_entity": "App\\Entity\\Customer", "relation_column": "customerId"}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn leading_backslash_is_normalized() {
        let schema = schema();
        assert!(schema.entity_exists("App\\Entity\\Order"));
        assert!(schema.entity_exists("\\App\\Entity\\Order"));
        assert_eq!(schema.entity_names(), vec!["App\\Entity\\Order".to_string()]);
    }

    #[test]
    fn column_name_defaults_to_property() {
        let schema = schema();
        let map = schema.column_map("App\\Entity\\Order");
        assert_eq!(map["id"], "id");
        assert_eq!(map["customerId"], "customer_id");
    }

    #[test]
    fn derived_helpers_read_annotations() {
        let schema = schema();
        let entity = "App\\Entity\\Order";
        assert_eq!(schema.key_strategy(entity), KeyStrategy::Uuid);
        assert_eq!(schema.primary_key(entity).as_deref(), Some("id"));
        let def = schema.column_definition(entity, "customerId").unwrap();
        assert_eq!(def.column_type, ColumnType::Integer);
        assert!(def.nullable);
        let relation = schema.relation(entity, "customer").unwrap();
        assert!(relation.is_owning_side());
        assert_eq!(relation.relation_column.as_deref(), Some("customerId"));
    }

    #[test]
    fn unknown_entity_yields_empty_metadata() {
        let schema = schema();
        assert!(schema.table_name("Nope").is_none());
        assert!(schema.column_map("Nope").is_empty());
        assert_eq!(schema.key_strategy("Nope"), KeyStrategy::None);
    }
}
