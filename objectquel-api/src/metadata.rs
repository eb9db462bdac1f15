use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    String,
    Text,
    Boolean,
    DateTime,
    Date,
    Json,
    Guid,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Float | ColumnType::Decimal | ColumnType::Boolean
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Boolean)
    }
}

/// Mapping of one entity property onto a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub property: String,
    /// Column name; defaults to the property name.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(property: impl Into<String>, column_type: ColumnType) -> Self {
        let property = property.into();
        Self {
            name: property.clone(),
            property,
            column_type,
            nullable: false,
            primary_key: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Column name with the property-name fallback applied.
    pub fn column_name(&self) -> &str {
        if self.name.is_empty() {
            &self.property
        } else {
            &self.name
        }
    }
}

/// How a primary key gets its value on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Backend assigns the key (auto increment); read back via `last_insert_id`.
    #[default]
    Identity,
    /// A v4 UUID is generated before insert.
    Uuid,
    /// The caller supplies the key.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
}

/// Relationship descriptor attached to an entity property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub target_entity: String,
    #[serde(default)]
    pub inversed_by: Option<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    /// Property on the owning entity holding the foreign key. Unset means the
    /// target's first identifier key name is used.
    #[serde(default)]
    pub relation_column: Option<String>,
}

impl Relation {
    pub fn new(kind: RelationKind, target_entity: impl Into<String>) -> Self {
        Self {
            kind,
            target_entity: target_entity.into(),
            inversed_by: None,
            mapped_by: None,
            relation_column: None,
        }
    }

    pub fn many_to_one(target_entity: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToOne, target_entity)
    }

    pub fn one_to_one(target_entity: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToOne, target_entity)
    }

    pub fn one_to_many(target_entity: impl Into<String>, mapped_by: impl Into<String>) -> Self {
        let mut relation = Self::new(RelationKind::OneToMany, target_entity);
        relation.mapped_by = Some(mapped_by.into());
        relation
    }

    pub fn inversed_by(mut self, property: impl Into<String>) -> Self {
        self.inversed_by = Some(property.into());
        self
    }

    pub fn mapped_by(mut self, property: impl Into<String>) -> Self {
        self.mapped_by = Some(property.into());
        self
    }

    pub fn relation_column(mut self, property: impl Into<String>) -> Self {
        self.relation_column = Some(property.into());
        self
    }

    /// True when this side stores the foreign key.
    pub fn is_owning_side(&self) -> bool {
        match self.kind {
            RelationKind::ManyToOne => true,
            RelationKind::OneToOne => self.mapped_by.is_none(),
            RelationKind::OneToMany => false,
        }
    }
}

/// Per-property mapping information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "annotation", rename_all = "snake_case")]
pub enum Annotation {
    Column(ColumnDefinition),
    PrimaryKeyStrategy { strategy: KeyStrategy },
    OneToOne(Relation),
    ManyToOne(Relation),
    OneToMany(Relation),
}

/// Entity mapping metadata consumed by the compiler, the visitors and the
/// unit of work.
///
/// Entity names passed in are expected to be normalized (see
/// [`normalize_entity_name`](Self::normalize_entity_name)).
pub trait EntityMetadata {
    /// Every known (normalized) entity name.
    fn entity_names(&self) -> Vec<String>;

    fn entity_exists(&self, entity: &str) -> bool;

    /// Canonical name for an entity reference (leading `\` removed).
    fn normalize_entity_name(&self, name: &str) -> String {
        name.trim_start_matches('\\').to_string()
    }

    fn table_name(&self, entity: &str) -> Option<String>;

    /// Property name → column name.
    fn column_map(&self, entity: &str) -> BTreeMap<String, String>;

    /// Primary key properties, in declaration order.
    fn identifier_keys(&self, entity: &str) -> Vec<String>;

    fn one_to_one_dependencies(&self, entity: &str) -> BTreeMap<String, Relation>;

    fn many_to_one_dependencies(&self, entity: &str) -> BTreeMap<String, Relation>;

    fn one_to_many_dependencies(&self, entity: &str) -> BTreeMap<String, Relation>;

    /// Property name → annotations declared on it.
    fn annotations(&self, entity: &str) -> BTreeMap<String, Vec<Annotation>>;

    fn column_definition(&self, entity: &str, property: &str) -> Option<ColumnDefinition> {
        self.annotations(entity)
            .remove(property)?
            .into_iter()
            .find_map(|a| match a {
                Annotation::Column(def) => Some(def),
                _ => None,
            })
    }

    /// Relation declared on `property`, of any kind.
    fn relation(&self, entity: &str, property: &str) -> Option<Relation> {
        self.many_to_one_dependencies(entity)
            .remove(property)
            .or_else(|| self.one_to_one_dependencies(entity).remove(property))
            .or_else(|| self.one_to_many_dependencies(entity).remove(property))
    }

    fn primary_key(&self, entity: &str) -> Option<String> {
        self.identifier_keys(entity).into_iter().next()
    }

    fn key_strategy(&self, entity: &str) -> KeyStrategy {
        let Some(key) = self.primary_key(entity) else {
            return KeyStrategy::None;
        };
        self.annotations(entity)
            .remove(&key)
            .unwrap_or_default()
            .into_iter()
            .find_map(|a| match a {
                Annotation::PrimaryKeyStrategy { strategy } => Some(strategy),
                _ => None,
            })
            .unwrap_or_default()
    }
}
