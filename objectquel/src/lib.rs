//! # ObjectQuel
//!
//! An entity query language that compiles to SQL, paired with a Unit of
//! Work that tracks entity changes and writes them back in dependency
//! order.
//!
//! ```rust,no_run
//! use objectquel::{Config, EntityManager, MemoryAdapter, Params, Record, SchemaMetadata};
//!
//! fn main() -> objectquel::Result<()> {
//!     let schema = SchemaMetadata::from_json_str(&std::fs::read_to_string("schema.json")?)
//!         .map_err(objectquel::Error::Config)?;
//!     let config = Config::new().entity_namespace("App\\Entity");
//!     let mut em = EntityManager::with_config(MemoryAdapter::new(), &schema, config);
//!
//!     // Query: entity projections come back as managed entities.
//!     let rows = em.execute_query(
//!         "RANGE OF p IS Product; RETRIEVE (p) WHERE p.price > :min",
//!         &Params::new().with("min", 10),
//!     )?;
//!
//!     // Change tracking: mutate, then flush.
//!     if let Some(product) = rows
//!         .first()
//!         .and_then(|r| r.entity("p"))
//!         .and_then(|id| em.entity_mut(id))
//!     {
//!         product.set("price", 12.5.into());
//!     }
//!     em.persist(Box::new(Record::new("App\\Entity\\Product").with("name", "Kettle")))?;
//!     em.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! - **[`EntityManager`]**: the session facade. Owns the adapter and the
//!   Unit of Work.
//! - **[`query`]**: lexer, parser, semantic passes, SQL compiler and the
//!   staged executor for statements mixing database and JSON ranges.
//! - **[`persist`]**: identity map, dirty-state detection and ordered flush.
//! - **[`DatabaseAdapter`] / [`EntityMetadata`]**: the traits a backend and
//!   a mapping source implement.

mod config;
mod entity_manager;
mod error;
mod hydrator;

pub use config::{Config, JSON_DIR_ENV};
pub use entity_manager::EntityManager;
pub use error::{Error, Result};
pub use hydrator::{EntityFactory, Field, ResultRow};
pub use objectquel_api::{
    AdapterError, ColumnDefinition, ColumnType, DatabaseAdapter, EntityDefinition,
    EntityMetadata, KeyStrategy, Params, Relation, Row, SchemaMetadata, Value,
};
pub use objectquel_persist::{
    DirtyState, Entity, EntityId, FlushSummary, LifecycleEvent, MemoryAdapter, Record,
};
pub use objectquel_persist as persist;
pub use objectquel_query as query;
