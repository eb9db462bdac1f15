//! Session-scoped change tracking.
//!
//! Entities live in an arena keyed by [`EntityId`]. The identity map records
//! which ids are managed (and under which primary key), the snapshot map the
//! column values last seen in the database. Dirty state is derived from the
//! two on demand.
//!
//! `flush` orders managed entities so parents are written before the
//! children that reference them, then dispatches inserts, updates and
//! deletes inside a single transaction.

use crate::entity::{DirtyState, Entity, EntityId, LifecycleEvent};
use crate::error::{OrmError, Result};
use crate::identity_map::{IdentityMap, identity_key};
use crate::normalizer::NormalizerRegistry;
use crate::persister::Persister;
use crate::snapshot::{ColumnValues, SnapshotMap};
use crate::topology::topological_order;
use crate::transaction::TransactionCounter;
use objectquel_api::{DatabaseAdapter, EntityMetadata, Relation, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// What a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl FlushSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted == 0
    }
}

pub struct UnitOfWork<'m> {
    metadata: &'m dyn EntityMetadata,
    normalizers: NormalizerRegistry,
    entities: BTreeMap<EntityId, Box<dyn Entity>>,
    identity_map: IdentityMap,
    snapshots: SnapshotMap,
    removed: BTreeSet<EntityId>,
    transaction: TransactionCounter,
    next_id: u64,
}

impl<'m> UnitOfWork<'m> {
    pub fn new(metadata: &'m dyn EntityMetadata) -> Self {
        Self {
            metadata,
            normalizers: NormalizerRegistry::default(),
            entities: BTreeMap::new(),
            identity_map: IdentityMap::new(),
            snapshots: SnapshotMap::new(),
            removed: BTreeSet::new(),
            transaction: TransactionCounter::default(),
            next_id: 0,
        }
    }

    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn metadata(&self) -> &'m dyn EntityMetadata {
        self.metadata
    }

    pub fn normalizers(&self) -> &NormalizerRegistry {
        &self.normalizers
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    fn managed_name(&self, entity: &dyn Entity) -> Result<String> {
        let name = self.metadata.normalize_entity_name(entity.entity_name());
        if !self.metadata.entity_exists(&name) {
            return Err(OrmError::MissingMetadata(name));
        }
        Ok(name)
    }

    fn issue_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    fn key_of(&self, name: &str, entity: &dyn Entity) -> Option<String> {
        let values: Vec<Value> = self
            .metadata
            .identifier_keys(name)
            .iter()
            .map(|k| entity.get(k))
            .collect();
        identity_key(&values)
    }

    fn column_values(&self, name: &str, entity: &dyn Entity) -> ColumnValues {
        self.metadata
            .column_map(name)
            .into_keys()
            .map(|property| {
                let value = entity.get(&property);
                (property, value)
            })
            .collect()
    }

    /// Starts tracking a new entity. It reports [`DirtyState::New`] until
    /// flushed.
    pub fn persist(&mut self, entity: Box<dyn Entity>) -> Result<EntityId> {
        let name = self.managed_name(entity.as_ref())?;
        let id = self.issue_id();
        self.identity_map.insert(&name, id);
        if let Some(key) = self.key_of(&name, entity.as_ref()) {
            self.identity_map.index_key(&name, key, id);
        }
        self.entities.insert(id, entity);
        debug!(entity = %name, id = %id, "persist");
        Ok(id)
    }

    /// Registers an entity read from the database as clean. When an instance
    /// with the same primary key is already managed, that id is returned and
    /// `entity` is dropped.
    pub fn attach(&mut self, entity: Box<dyn Entity>) -> Result<EntityId> {
        let name = self.managed_name(entity.as_ref())?;
        let key = self.key_of(&name, entity.as_ref());
        if let Some(key) = &key
            && let Some(existing) = self.identity_map.lookup(&name, key)
        {
            return Ok(existing);
        }
        let id = self.issue_id();
        self.identity_map.insert(&name, id);
        if let Some(key) = key {
            self.identity_map.index_key(&name, key, id);
        }
        if entity.is_initialized() {
            let values = self.column_values(&name, entity.as_ref());
            self.snapshots.take(id, values);
        }
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Marks a managed entity for deletion on the next flush.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        if !self.identity_map.contains(id) {
            return Err(OrmError::NotManaged(id));
        }
        self.removed.insert(id);
        Ok(())
    }

    /// Stops tracking `id` and hands the entity back.
    pub fn detach(&mut self, id: EntityId) -> Option<Box<dyn Entity>> {
        self.identity_map.remove(id);
        self.snapshots.remove(id);
        self.removed.remove(&id);
        self.entities.remove(&id)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.identity_map.clear();
        self.snapshots.clear();
        self.removed.clear();
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.identity_map.contains(id)
    }

    pub fn len(&self) -> usize {
        self.identity_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity_map.is_empty()
    }

    pub fn entity(&self, id: EntityId) -> Option<&dyn Entity> {
        self.entities.get(&id).map(|e| e.as_ref())
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn Entity> {
        match self.entities.get_mut(&id) {
            Some(e) => Some(e.as_mut()),
            None => None,
        }
    }

    /// Typed access to a managed entity.
    pub fn get<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)?.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Managed instance of `entity` whose primary key equals `key`.
    pub fn find_by_key(&self, entity: &str, key: &[Value]) -> Option<EntityId> {
        let name = self.metadata.normalize_entity_name(entity);
        let key = identity_key(key)?;
        self.identity_map.lookup(&name, &key)
    }

    pub fn dirty_state(&self, id: EntityId) -> DirtyState {
        let Some(entity) = self.entities.get(&id) else {
            return DirtyState::NotManaged;
        };
        if !entity.is_initialized() {
            return DirtyState::None;
        }
        if self.removed.contains(&id) {
            return DirtyState::Deleted;
        }
        let Some(name) = self.identity_map.entity_name(id) else {
            return DirtyState::NotManaged;
        };
        if self.key_of(name, entity.as_ref()).is_none() {
            return DirtyState::New;
        }
        let current = self.column_values(name, entity.as_ref());
        match self.snapshots.changed(id, &current) {
            None => DirtyState::New,
            Some(changed) if changed.is_empty() => DirtyState::None,
            Some(_) => DirtyState::Dirty,
        }
    }

    pub fn transaction_depth(&self) -> usize {
        self.transaction.depth()
    }

    pub fn begin_trans(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        self.transaction.begin(adapter)
    }

    pub fn commit_trans(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        self.transaction.commit(adapter)
    }

    pub fn rollback_trans(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        self.transaction.rollback(adapter)
    }

    /// Owning to-one relations of `name`: property -> relation.
    fn owning_relations(&self, name: &str) -> Vec<(String, Relation)> {
        let mut relations: Vec<(String, Relation)> =
            self.metadata.many_to_one_dependencies(name).into_iter().collect();
        relations.extend(
            self.metadata
                .one_to_one_dependencies(name)
                .into_iter()
                .filter(|(_, r)| r.is_owning_side()),
        );
        relations
    }

    /// Managed ids, parents before children.
    pub fn flush_order(&self) -> Result<Vec<EntityId>> {
        let nodes: Vec<EntityId> = self.identity_map.ids().collect();
        let mut edges = Vec::new();
        for id in &nodes {
            let (Some(entity), Some(name)) =
                (self.entities.get(id), self.identity_map.entity_name(*id))
            else {
                continue;
            };
            for (property, _) in self.owning_relations(name) {
                if let Some(parent) = entity.related(&property)
                    && self.identity_map.contains(parent)
                {
                    edges.push((*id, parent));
                }
            }
        }
        topological_order(&nodes, &edges).map_err(|residual| OrmError::RelationshipCycle {
            entities: residual
                .into_iter()
                .map(|id| {
                    let name = self.identity_map.entity_name(id).unwrap_or("?");
                    format!("{name}{id}")
                })
                .collect(),
        })
    }

    /// Copies each referenced parent's key into the child's relation column.
    fn copy_parent_keys(&mut self, id: EntityId) {
        let Some(name) = self.identity_map.entity_name(id).map(str::to_string) else {
            return;
        };
        let mut assignments = Vec::new();
        if let Some(entity) = self.entities.get(&id) {
            for (property, relation) in self.owning_relations(&name) {
                let Some(parent) = entity.related(&property).and_then(|p| self.entities.get(&p))
                else {
                    continue;
                };
                let target = self.metadata.normalize_entity_name(&relation.target_entity);
                let Some(parent_key) = self.metadata.primary_key(&target) else {
                    continue;
                };
                let value = parent.get(&parent_key);
                if value.is_null() {
                    continue;
                }
                let column = relation.relation_column.clone().unwrap_or(parent_key);
                assignments.push((column, value));
            }
        }
        if let Some(entity) = self.entities.get_mut(&id) {
            for (column, value) in assignments {
                entity.set(&column, value);
            }
        }
    }

    fn has_pending_changes(&self) -> bool {
        self.identity_map.ids().any(|id| {
            matches!(
                self.dirty_state(id),
                DirtyState::New | DirtyState::Dirty | DirtyState::Deleted
            )
        })
    }

    /// Writes every pending change.
    ///
    /// Nothing reaches the adapter when the relationship graph has a cycle
    /// or when there is nothing to write. A failing statement or commit
    /// rolls the transaction back; tracked state is left as it was before
    /// the flush.
    pub fn flush(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<FlushSummary> {
        let order = self.flush_order()?;
        for id in &order {
            self.copy_parent_keys(*id);
        }
        if !self.has_pending_changes() {
            debug!("flush: nothing to write");
            return Ok(FlushSummary::default());
        }

        self.transaction.begin(adapter)?;
        let summary = match self.write_all(adapter, &order) {
            Ok(summary) => summary,
            Err(err) => return Err(self.abort(adapter, err)),
        };
        if let Err(err) = self.transaction.commit(adapter) {
            return Err(self.abort(adapter, err));
        }

        let removed: Vec<EntityId> = self.removed.iter().copied().collect();
        for id in removed {
            self.detach(id);
        }
        self.refresh_snapshots();
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "flush complete"
        );
        Ok(summary)
    }

    /// Rolls back after a failed flush and hands the original error back.
    fn abort(&mut self, adapter: &mut dyn DatabaseAdapter, err: OrmError) -> OrmError {
        warn!(error = %err, "flush failed, rolling back");
        if let Err(rollback) = self.transaction.rollback(adapter) {
            warn!(error = %rollback, "rollback failed");
        }
        err
    }

    fn write_all(
        &mut self,
        adapter: &mut dyn DatabaseAdapter,
        order: &[EntityId],
    ) -> Result<FlushSummary> {
        let mut summary = FlushSummary::default();
        for id in order {
            self.copy_parent_keys(*id);
            let state = self.dirty_state(*id);
            let changed = match state {
                DirtyState::Dirty => {
                    let name = self.identity_map.entity_name(*id).unwrap_or_default();
                    match self.entities.get(id) {
                        Some(entity) => {
                            let current = self.column_values(name, entity.as_ref());
                            self.snapshots.changed(*id, &current).unwrap_or_default()
                        }
                        None => Vec::new(),
                    }
                }
                _ => Vec::new(),
            };
            let has_key = match (self.identity_map.entity_name(*id), self.entities.get(id)) {
                (Some(name), Some(entity)) => self.key_of(name, entity.as_ref()).is_some(),
                _ => false,
            };

            let persister = Persister::new(self.metadata, &self.normalizers);
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            match state {
                DirtyState::New => {
                    entity.on_lifecycle(LifecycleEvent::PrePersist);
                    persister.insert(adapter, entity.as_mut())?;
                    entity.on_lifecycle(LifecycleEvent::PostPersist);
                    summary.inserted += 1;
                }
                DirtyState::Dirty => {
                    entity.on_lifecycle(LifecycleEvent::PreUpdate);
                    let original = self.snapshots.get(*id);
                    persister.update(adapter, entity.as_ref(), &changed, original)?;
                    entity.on_lifecycle(LifecycleEvent::PostUpdate);
                    summary.updated += 1;
                }
                DirtyState::Deleted if has_key => {
                    entity.on_lifecycle(LifecycleEvent::PreRemove);
                    persister.delete(adapter, entity.as_ref())?;
                    entity.on_lifecycle(LifecycleEvent::PostRemove);
                    summary.deleted += 1;
                }
                DirtyState::Deleted | DirtyState::None | DirtyState::NotManaged => {}
            }
        }
        Ok(summary)
    }

    fn refresh_snapshots(&mut self) {
        self.snapshots.clear();
        let ids: Vec<EntityId> = self.identity_map.ids().collect();
        for id in ids {
            let Some(name) = self.identity_map.entity_name(id).map(str::to_string) else {
                continue;
            };
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            if !entity.is_initialized() {
                continue;
            }
            let values = self.column_values(&name, entity.as_ref());
            let key = self.key_of(&name, entity.as_ref());
            self.snapshots.take(id, values);
            if let Some(key) = key {
                self.identity_map.index_key(&name, key, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Record;
    use crate::memory::MemoryAdapter;
    use objectquel_api::{ColumnDefinition, ColumnType, EntityDefinition, SchemaMetadata};

    fn schema() -> SchemaMetadata {
        SchemaMetadata::new().with_entity(
            EntityDefinition::new("Note", "notes")
                .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDefinition::new("text", ColumnType::String)),
        )
    }

    #[test]
    fn attach_reuses_instance_with_same_key() {
        let schema = schema();
        let mut uow = UnitOfWork::new(&schema);
        let first = uow
            .attach(Box::new(Record::new("Note").with("id", 1).with("text", "a")))
            .unwrap();
        let second = uow
            .attach(Box::new(Record::new("Note").with("id", 1).with("text", "b")))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(uow.len(), 1);
        assert_eq!(uow.dirty_state(first), DirtyState::None);
        assert_eq!(uow.find_by_key("Note", &[Value::Int(1)]), Some(first));
    }

    #[test]
    fn unknown_entities_are_rejected() {
        let schema = schema();
        let mut uow = UnitOfWork::new(&schema);
        assert!(matches!(
            uow.persist(Box::new(Record::new("Ghost"))),
            Err(OrmError::MissingMetadata(_))
        ));
    }

    #[test]
    fn proxies_stay_clean() {
        let schema = schema();
        let mut uow = UnitOfWork::new(&schema);
        let id = uow.attach(Box::new(Record::proxy("Note", "id", 9))).unwrap();
        assert_eq!(uow.dirty_state(id), DirtyState::None);

        let mut adapter = MemoryAdapter::new();
        assert!(uow.flush(&mut adapter).unwrap().is_empty());
        assert!(adapter.transaction_log().is_empty());
    }

    #[test]
    fn detach_forgets_entity() {
        let schema = schema();
        let mut uow = UnitOfWork::new(&schema);
        let id = uow.persist(Box::new(Record::new("Note"))).unwrap();
        assert!(uow.detach(id).is_some());
        assert_eq!(uow.dirty_state(id), DirtyState::NotManaged);
        assert!(matches!(uow.remove(id), Err(OrmError::NotManaged(_))));
    }
}
