//! Typed failures for merge calls and for the store handles they drive.
//!
//! Every merge call either yields a [`crate::report::LoadReport`] or exactly one
//! [`SyncError`]. Callers branch on [`SyncError::kind`] instead of matching
//! message text; the variants carry the table, artifact path, and underlying
//! source error when there is one.

use std::{error::Error as StdError, fmt, io, path::PathBuf};

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Schema,
    Staging,
    StoreConnectivity,
    Apply,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Schema => "schema",
            ErrorKind::Staging => "staging",
            ErrorKind::StoreConnectivity => "store-connectivity",
            ErrorKind::Apply => "apply",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation failed for table '{table}': {message}")]
    Validation { table: String, message: String },

    #[error("schema error for table '{table}': {message}")]
    Schema { table: String, message: String },

    #[error("staging artifact {path:?}: {message}")]
    Staging {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("store unreachable while {action} table '{table}'")]
    StoreConnectivity {
        table: String,
        action: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("applying changes to table '{table}' failed during {step}")]
    Apply {
        table: String,
        step: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation { .. } => ErrorKind::Validation,
            SyncError::Schema { .. } => ErrorKind::Schema,
            SyncError::Staging { .. } => ErrorKind::Staging,
            SyncError::StoreConnectivity { .. } => ErrorKind::StoreConnectivity,
            SyncError::Apply { .. } => ErrorKind::Apply,
        }
    }

    pub fn validation(table: &str, message: impl Into<String>) -> Self {
        SyncError::Validation {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn schema(table: &str, message: impl Into<String>) -> Self {
        SyncError::Schema {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn staging<E>(path: impl Into<PathBuf>, message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        SyncError::Staging {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classifies a store failure raised while reading (existence check, diff).
    ///
    /// Broken table metadata is a schema problem; anything else means the store
    /// could not answer.
    pub fn from_read(table: &str, action: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::Metadata { message, .. } => SyncError::schema(table, message),
            other => SyncError::StoreConnectivity {
                table: table.to_string(),
                action,
                source: other,
            },
        }
    }

    /// Classifies a store failure raised while mutating the persisted table.
    pub fn from_apply(table: &str, step: &'static str, source: StoreError) -> Self {
        SyncError::Apply {
            table: table.to_string(),
            step,
            source,
        }
    }
}

/// Failures reported by a [`crate::store::TableStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store location {path:?} is unavailable")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("table '{0}' does not exist")]
    MissingTable(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("duplicate primary key {key} in table '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("row with key {key} does not fit table '{table}': {message}")]
    RowMismatch {
        table: String,
        key: String,
        message: String,
    },

    #[error("table metadata {path:?} is invalid: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
