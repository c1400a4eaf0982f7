//! Error handling for the warehouse loader.
//!
//! Failures fall into two families:
//!
//! - [`ParseError`] is row-level. The cleaner recovers from it by dropping
//!   the offending record and counting it; it never aborts a run on its own.
//! - [`WarehouseError`] is run-level. Store failures, consistency violations
//!   and bad input abort the current run and surface as a printed diagnostic.
//!
//! ```
//! use games_warehouse::error::{ResultExt as _, WarehouseError};
//!
//! fn connect() -> games_warehouse::error::Result<()> {
//!     Err(WarehouseError::Store("connection refused".to_owned()))
//! }
//!
//! let err = connect().context("Opening warehouse").unwrap_err();
//! assert!(matches!(err, WarehouseError::Store(_)));
//! assert_eq!(err.to_string(), "Store error: Opening warehouse: connection refused");
//! ```

use std::fmt;

/// A field value that could not be coerced into its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A numeric field held something that is not a number.
    InvalidValue { field: &'static str, value: String },
    /// A release date matched none of the accepted formats.
    InvalidDate { value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value {value:?} for field '{field}'")
            }
            Self::InvalidDate { value } => write!(f, "unrecognized date {value:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Main error type for warehouse operations.
#[derive(Debug)]
pub enum WarehouseError {
    /// I/O errors (reading the extract, config files, log directories)
    Io(std::io::Error),

    /// The extract could not be read or lacks an expected column
    Input(String),

    /// A value failed to parse where the caller could not recover locally
    Parse(ParseError),

    /// A record label missing from the global vocabulary, or an illegal
    /// loader state transition
    Consistency(String),

    /// A table, column or index name outside the safe character class
    InvalidIdentifier(String),

    /// Connection, DDL, DML or query failure
    Store(String),

    /// Configuration errors
    Config(String),

    /// Reconciliation findings escalated under strict validation
    ReconciliationMismatch { findings: usize },

    /// Generic error with context
    Other(String),
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Input(msg) => write!(f, "Input error: {msg}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Consistency(msg) => write!(f, "Consistency error: {msg}"),
            Self::InvalidIdentifier(msg) => write!(f, "Invalid identifier: {msg}"),
            Self::Store(msg) => write!(f, "Store error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::ReconciliationMismatch { findings } => {
                write!(f, "Reconciliation found {findings} problem(s) in the warehouse")
            }
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for WarehouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl WarehouseError {
    /// Prefix the message while keeping the error category intact.
    fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::Input(msg) => Self::Input(format!("{prefix}: {msg}")),
            Self::Consistency(msg) => Self::Consistency(format!("{prefix}: {msg}")),
            Self::InvalidIdentifier(msg) => Self::InvalidIdentifier(format!("{prefix}: {msg}")),
            Self::Store(msg) => Self::Store(format!("{prefix}: {msg}")),
            Self::Config(msg) => Self::Config(format!("{prefix}: {msg}")),
            other => Self::Other(format!("{prefix}: {other}")),
        }
    }
}

impl From<std::io::Error> for WarehouseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ParseError> for WarehouseError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<anyhow::Error> for WarehouseError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for WarehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::prelude::PolarsError> for WarehouseError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::Input(err.to_string())
    }
}

impl From<sqlx::Error> for WarehouseError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type alias for warehouse operations.
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WarehouseError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_prefix(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_prefix(&f()))
    }
}
