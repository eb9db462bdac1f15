//! Unit of Work for ObjectQuel entities: identity map, dirty tracking and a
//! dependency-ordered flush through a [`DatabaseAdapter`].
//!
//! [`DatabaseAdapter`]: objectquel_api::DatabaseAdapter

pub mod entity;
mod error;
pub mod identity_map;
pub mod memory;
pub mod normalizer;
pub mod persister;
pub mod snapshot;
pub mod topology;
pub mod transaction;
pub mod unit_of_work;

pub use crate::entity::{DirtyState, Entity, EntityId, LifecycleEvent, Record};
pub use crate::error::{OrmError, Result};
pub use crate::identity_map::IdentityMap;
pub use crate::memory::{ExecutedStatement, MemoryAdapter, TransactionEvent};
pub use crate::normalizer::{NormalizerRegistry, ValueNormalizer};
pub use crate::unit_of_work::{FlushSummary, UnitOfWork};
