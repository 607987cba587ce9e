//! Error types for qail-twoway.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Where in a source text (template or expression) something went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// The full text being processed.
    pub text: String,
    /// Character offset into `text`.
    pub position: usize,
}

impl Location {
    pub fn new(text: impl Into<String>, position: usize) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>:{}", self.text, self.position)
    }
}

/// Error reported by the execution boundary (driver, connection, statement).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    /// Five-character SQLSTATE, when the driver reports one.
    pub sql_state: Option<String>,
    /// Vendor error code, when the driver reports one.
    pub vendor_code: Option<i32>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: None,
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }
}

/// The main error type for qail-twoway operations.
#[derive(Debug, Error)]
pub enum TwoWayError {
    /// A template or expression could not be split into tokens.
    #[error("Tokenize error at {location}: {message}")]
    Tokenize { location: Location, message: String },

    /// A template or expression has an invalid structure.
    #[error("Parse error at {location}: {message}")]
    Parse { location: Location, message: String },

    /// An expression failed while being evaluated.
    #[error("Evaluation error at {location}: {message}")]
    Evaluation {
        location: Location,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A version-guarded statement did not affect the expected row.
    #[error("Optimistic lock failure on '{table}': expected 1 row, {count} affected{}", batch_suffix(.index))]
    OptimisticLock {
        table: String,
        count: u64,
        index: Option<usize>,
    },

    /// The database rejected a duplicate key.
    #[error("Unique constraint violation on '{table}': {source}")]
    UniqueConstraint {
        table: String,
        #[source]
        source: ExecutionError,
    },

    /// Metadata is invalid; raised once, when the metadata is built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The dialect cannot express the requested statement.
    #[error("Dialect '{dialect}' does not support {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: &'static str,
    },

    /// Execution boundary failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Invalid configuration file.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn batch_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (batch element {})", i),
        None => String::new(),
    }
}

impl TwoWayError {
    /// Create a tokenize error.
    pub fn tokenize(text: &str, position: usize, message: impl Into<String>) -> Self {
        Self::Tokenize {
            location: Location::new(text, position),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(text: &str, position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            location: Location::new(text, position),
            message: message.into(),
        }
    }

    /// Create an evaluation error without an underlying cause.
    pub fn eval(location: &Location, message: impl Into<String>) -> Self {
        Self::Evaluation {
            location: location.clone(),
            message: message.into(),
            cause: None,
        }
    }

    /// Create an evaluation error wrapping the failure that caused it.
    pub fn eval_caused(
        location: &Location,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Evaluation {
            location: location.clone(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type alias for qail-twoway operations.
pub type TwoWayResult<T> = Result<T, TwoWayError>;
