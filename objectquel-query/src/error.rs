//! Error and result types for the query crate.

use objectquel_api::AdapterError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed token.
    #[error("lexer error at {line}:{column}: {message}")]
    Lexer {
        message: String,
        line: usize,
        column: usize,
    },

    /// Grammar violation, duplicate alias or a regex in an illegal position.
    #[error("parse error at {line}:{column} near '{token}': {message}")]
    Parser {
        message: String,
        token: String,
        line: usize,
        column: usize,
    },

    /// Semantic error: unknown entity/property/method, arithmetic on an
    /// entity, invalid VIA path, unresolved stage dependency, unbound parameter.
    #[error("{0}")]
    Quel(String),

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("database error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("JSON source '{path}': {message}")]
    JsonSource { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn quel(message: impl Into<String>) -> Self {
        Error::Quel(message.into())
    }

    pub(crate) fn in_stage(self, stage: &str) -> Self {
        Error::Stage {
            stage: stage.to_string(),
            source: Box::new(self),
        }
    }
}
