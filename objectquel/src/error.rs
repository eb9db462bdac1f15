use std::fmt;

/// The error type for ObjectQuel operations.
#[derive(Debug)]
pub enum Error {
    /// Parsing, analysis, compilation or execution of a query failed.
    Query(objectquel_query::Error),
    /// Change tracking or flushing failed.
    Orm(objectquel_persist::OrmError),
    /// A configuration file could not be parsed.
    Config(serde_json::Error),
    /// IO error interacting with the filesystem.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => write!(f, "query error: {e}"),
            Error::Orm(e) => write!(f, "orm error: {e}"),
            Error::Config(e) => write!(f, "invalid configuration: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => Some(e),
            Error::Orm(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<objectquel_query::Error> for Error {
    fn from(e: objectquel_query::Error) -> Self {
        Error::Query(e)
    }
}

impl From<objectquel_persist::OrmError> for Error {
    fn from(e: objectquel_persist::OrmError) -> Self {
        Error::Orm(e)
    }
}

/// A specialized Result type for ObjectQuel operations.
pub type Result<T> = std::result::Result<T, Error>;
