use crate::entity::EntityId;
use objectquel_api::AdapterError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrmError>;

#[derive(Debug, Error)]
pub enum OrmError {
    /// Managed entities reference each other in a loop; nothing was written.
    #[error("relationship cycle between entities: {}", entities.join(", "))]
    RelationshipCycle { entities: Vec<String> },

    #[error("{operation} of '{entity}' failed: {source}")]
    Persister {
        operation: &'static str,
        entity: String,
        #[source]
        source: AdapterError,
    },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("entity {0} is not managed")]
    NotManaged(EntityId),

    #[error("no metadata for entity '{0}'")]
    MissingMetadata(String),

    #[error("cannot normalize {column_type} value: {message}")]
    Normalize {
        column_type: String,
        message: String,
    },
}
