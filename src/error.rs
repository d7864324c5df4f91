//! Error types for the data access layer.
//!
//! Two layers are defined here using `thiserror`:
//! - [`SqlError`] is the low-level failure reported by a driver (connection,
//!   statement, cursor or column access).
//! - [`DataAccessError`] is the only error the template surfaces. It always
//!   wraps the [`SqlError`] that triggered it, together with the
//!   [`Operation`] that was running at the time.
//!
//! Absence of data is never an error: queries return `None` or an empty
//! `Vec` instead.

use std::fmt;
use thiserror::Error;

/// Low-level failure reported by a driver.
#[derive(Error, Debug)]
pub enum SqlError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Driver error: {message}")]
    Driver { message: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column index {index} out of bounds (len: {len})")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// Parameter slots start at 1.
    #[error("Invalid parameter index: {0}")]
    InvalidParameterIndex(usize),

    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unsupported column type '{type_name}' at index {index}")]
    UnsupportedType { index: usize, type_name: String },

    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),
}

impl SqlError {
    /// Create a generic driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }
}

/// Step of a data access call during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetConnection,
    PrepareStatement,
    BindParameter,
    ExecuteUpdate,
    ExecuteQuery,
    AdvanceCursor,
    MapRow,
    Close,
    BeginTransaction,
    Commit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetConnection => "get connection",
            Self::PrepareStatement => "prepare statement",
            Self::BindParameter => "bind parameter",
            Self::ExecuteUpdate => "execute update",
            Self::ExecuteQuery => "execute query",
            Self::AdvanceCursor => "advance cursor",
            Self::MapRow => "map row",
            Self::Close => "close",
            Self::BeginTransaction => "begin transaction",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error kind surfaced by the template.
///
/// Callers that need to tell causes apart inspect [`DataAccessError::cause`]
/// (or walk `source()`).
#[derive(Error, Debug)]
#[error("Data access failed during {operation}: {source}")]
pub struct DataAccessError {
    operation: Operation,
    #[source]
    source: SqlError,
}

impl DataAccessError {
    /// Wrap a driver failure that happened during `operation`.
    pub fn new(operation: Operation, source: impl Into<SqlError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Translator for `map_err`: `.map_err(DataAccessError::at(Operation::Commit))`.
    pub fn at(operation: Operation) -> impl FnOnce(SqlError) -> Self {
        move |err| Self::new(operation, err)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The wrapped driver failure.
    pub fn cause(&self) -> &SqlError {
        &self.source
    }

    pub fn into_cause(self) -> SqlError {
        self.source
    }
}

/// Result type alias for data access operations.
pub type DataAccessResult<T> = Result<T, DataAccessError>;

/// Errors raised while reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unknown database type for: {0}")]
    UnknownDatabaseType(String),

    #[error("Invalid value '{value}' for option '{option}'")]
    InvalidOption { option: String, value: String },
}
