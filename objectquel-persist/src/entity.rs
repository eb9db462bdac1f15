use objectquel_api::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Handle issued when an entity is registered with a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Persistence state of an entity, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    None,
    Dirty,
    New,
    Deleted,
    NotManaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
}

/// An object the unit of work can track.
///
/// Properties are read and written by name; missing properties read as
/// [`Value::Null`]. To-one relations are exposed as the [`EntityId`] of the
/// related managed entity.
pub trait Entity: Any {
    fn entity_name(&self) -> &str;

    fn get(&self, property: &str) -> Value;

    fn set(&mut self, property: &str, value: Value);

    fn related(&self, _property: &str) -> Option<EntityId> {
        None
    }

    /// False for lazy proxies that were never loaded.
    fn is_initialized(&self) -> bool {
        true
    }

    fn on_lifecycle(&mut self, _event: LifecycleEvent) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Schema-driven entity: property values in a map, relations by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, EntityId>,
    events: Vec<LifecycleEvent>,
    initialized: bool,
}

impl Record {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            events: Vec::new(),
            initialized: true,
        }
    }

    /// Placeholder that only knows its key; reports a clean state until
    /// loaded.
    pub fn proxy(entity: impl Into<String>, key: &str, value: impl Into<Value>) -> Self {
        let mut record = Self::new(entity).with(key, value);
        record.initialized = false;
        record
    }

    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.values.insert(property.to_string(), value.into());
        self
    }

    pub fn with_relation(mut self, property: &str, target: EntityId) -> Self {
        self.relations.insert(property.to_string(), target);
        self
    }

    pub fn set_relation(&mut self, property: &str, target: Option<EntityId>) {
        match target {
            Some(id) => self.relations.insert(property.to_string(), id),
            None => self.relations.remove(property),
        };
    }

    pub fn mark_loaded(&mut self) {
        self.initialized = true;
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Lifecycle events received so far, oldest first.
    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }
}

impl Entity for Record {
    fn entity_name(&self) -> &str {
        &self.entity
    }

    fn get(&self, property: &str) -> Value {
        self.values.get(property).cloned().unwrap_or_default()
    }

    fn set(&mut self, property: &str, value: Value) {
        self.values.insert(property.to_string(), value);
    }

    fn related(&self, property: &str) -> Option<EntityId> {
        self.relations.get(property).copied()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn on_lifecycle(&mut self, event: LifecycleEvent) {
        self.events.push(event);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
