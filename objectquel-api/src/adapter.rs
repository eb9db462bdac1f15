use crate::{Params, Row, Value};
use thiserror::Error;

/// Failure reported by a [`DatabaseAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Synchronous access to the relational backend.
///
/// The core never opens connections itself; callers hand an adapter to the
/// entity manager (or to a prepared query) and keep ownership of it for the
/// lifetime of one session.
pub trait DatabaseAdapter {
    /// Executes one statement with named parameters (`:name` placeholders).
    ///
    /// Statements that produce no result set return an empty vector.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, AdapterError>;

    /// Key generated by the most recent `INSERT`, if the backend assigned one.
    fn last_insert_id(&self) -> Option<Value>;

    fn begin_trans(&mut self) -> Result<(), AdapterError>;

    fn commit_trans(&mut self) -> Result<(), AdapterError>;

    fn rollback_trans(&mut self) -> Result<(), AdapterError>;

    /// Message of the last failed call, if any.
    fn last_error_message(&self) -> Option<String> {
        None
    }
}

impl<A: DatabaseAdapter + ?Sized> DatabaseAdapter for Box<A> {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, AdapterError> {
        (**self).execute(sql, params)
    }

    fn last_insert_id(&self) -> Option<Value> {
        (**self).last_insert_id()
    }

    fn begin_trans(&mut self) -> Result<(), AdapterError> {
        (**self).begin_trans()
    }

    fn commit_trans(&mut self) -> Result<(), AdapterError> {
        (**self).commit_trans()
    }

    fn rollback_trans(&mut self) -> Result<(), AdapterError> {
        (**self).rollback_trans()
    }

    fn last_error_message(&self) -> Option<String> {
        (**self).last_error_message()
    }
}
