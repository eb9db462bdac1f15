use crate::config::Config;
use crate::error::Result;
use crate::hydrator::{EntityFactory, Hydrator, ResultRow};
use objectquel_api::{DatabaseAdapter, EntityMetadata, Params, Value};
use objectquel_persist::{DirtyState, Entity, EntityId, FlushSummary, UnitOfWork};
use objectquel_query::visitor::namespace::qualify;
use objectquel_query::{PreparedQuery, prepare};
use std::collections::HashMap;
use tracing::debug;

/// Alias used by statements built from criteria.
const FIND_ALIAS: &str = "e";

/// Session facade: queries, change tracking and flushing over one adapter.
///
/// The manager owns the adapter and its [`UnitOfWork`]; entities are
/// addressed by the [`EntityId`] issued when they become managed.
pub struct EntityManager<'m, A: DatabaseAdapter> {
    adapter: A,
    metadata: &'m dyn EntityMetadata,
    config: Config,
    uow: UnitOfWork<'m>,
    factories: HashMap<String, EntityFactory>,
}

impl<'m, A: DatabaseAdapter> EntityManager<'m, A> {
    pub fn new(adapter: A, metadata: &'m dyn EntityMetadata) -> Self {
        Self::with_config(adapter, metadata, Config::default())
    }

    pub fn with_config(adapter: A, metadata: &'m dyn EntityMetadata, config: Config) -> Self {
        Self {
            adapter,
            metadata,
            config,
            uow: UnitOfWork::new(metadata),
            factories: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn unit_of_work(&self) -> &UnitOfWork<'m> {
        &self.uow
    }

    /// Hydrated instances of `entity` are built by `factory` instead of as
    /// generic records.
    pub fn register_factory(
        &mut self,
        entity: &str,
        factory: impl Fn() -> Box<dyn Entity> + 'static,
    ) {
        let name = self.resolve_entity(entity);
        self.factories.insert(name, Box::new(factory));
    }

    /// Expands a short entity name through the configured namespaces.
    fn resolve_entity(&self, entity: &str) -> String {
        qualify(entity, self.metadata, &self.config.entity_namespaces)
    }

    pub fn persist(&mut self, entity: Box<dyn Entity>) -> Result<EntityId> {
        Ok(self.uow.persist(entity)?)
    }

    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        Ok(self.uow.remove(id)?)
    }

    pub fn detach(&mut self, id: EntityId) -> Option<Box<dyn Entity>> {
        self.uow.detach(id)
    }

    pub fn clear(&mut self) {
        self.uow.clear();
    }

    pub fn flush(&mut self) -> Result<FlushSummary> {
        Ok(self.uow.flush(&mut self.adapter)?)
    }

    pub fn entity(&self, id: EntityId) -> Option<&dyn Entity> {
        self.uow.entity(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn Entity> {
        self.uow.entity_mut(id)
    }

    pub fn get<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.uow.get::<T>(id)
    }

    pub fn get_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.uow.get_mut::<T>(id)
    }

    pub fn dirty_state(&self, id: EntityId) -> DirtyState {
        self.uow.dirty_state(id)
    }

    pub fn begin_trans(&mut self) -> Result<()> {
        Ok(self.uow.begin_trans(&mut self.adapter)?)
    }

    pub fn commit_trans(&mut self) -> Result<()> {
        Ok(self.uow.commit_trans(&mut self.adapter)?)
    }

    pub fn rollback_trans(&mut self) -> Result<()> {
        Ok(self.uow.rollback_trans(&mut self.adapter)?)
    }

    pub fn prepare(&self, source: &str) -> Result<PreparedQuery<'m>> {
        Ok(prepare(source, self.metadata, &self.config.query_options())?)
    }

    /// Runs an ObjectQuel statement. Entity projections come back as
    /// managed entities; an instance already managed under the same key is
    /// reused as is.
    pub fn execute_query(&mut self, source: &str, params: &Params) -> Result<Vec<ResultRow>> {
        let query = self.prepare(source)?;
        let rows = query.execute(&mut self.adapter, params)?;
        let projections = query.projections();
        Hydrator::new(&mut self.uow, &self.factories).hydrate(rows, &projections)
    }

    /// Entity with primary key `key`, from the identity map when managed.
    pub fn find(&mut self, entity: &str, key: impl Into<Value>) -> Result<Option<EntityId>> {
        let name = self.resolve_entity(entity);
        let key = key.into();
        if let Some(id) = self.uow.find_by_key(&name, std::slice::from_ref(&key)) {
            debug!(entity = %name, key = %key, "identity map hit");
            return Ok(Some(id));
        }
        let Some(property) = self.metadata.primary_key(&name) else {
            return Ok(None);
        };
        Ok(self.find_by(&name, &[(property.as_str(), key)])?.into_iter().next())
    }

    /// Every entity whose properties equal the given values.
    pub fn find_by(&mut self, entity: &str, criteria: &[(&str, Value)]) -> Result<Vec<EntityId>> {
        let name = self.resolve_entity(entity);
        let (source, params) = criteria_query(&name, criteria);
        let rows = self.execute_query(&source, &params)?;
        Ok(rows.iter().filter_map(|r| r.entity(FIND_ALIAS)).collect())
    }
}

/// `RANGE OF e IS <entity>; RETRIEVE (e) WHERE e.<p> = :<p> AND ...`.
/// A null criterion becomes `IS NULL`.
fn criteria_query(entity: &str, criteria: &[(&str, Value)]) -> (String, Params) {
    let mut params = Params::new();
    let mut conditions = Vec::new();
    for (property, value) in criteria {
        if value.is_null() {
            conditions.push(format!("{FIND_ALIAS}.{property} IS NULL"));
        } else {
            conditions.push(format!("{FIND_ALIAS}.{property} = :{property}"));
            params.insert(*property, value.clone());
        }
    }
    let mut source = format!("RANGE OF {FIND_ALIAS} IS {entity}; RETRIEVE ({FIND_ALIAS})");
    if !conditions.is_empty() {
        source.push_str(" WHERE ");
        source.push_str(&conditions.join(" AND "));
    }
    (source, params)
}
