//! Error taxonomy for memsee.
//!
//! Every fallible library operation returns [`MemseeError`]. Conditions that
//! are recorded rather than thrown (malformed records, conflicting duplicates,
//! lost batches) live in [`crate::diagnostics`] and only become errors when the
//! caller asks for strict ingestion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::diagnostics::DataQualityWarning;
use crate::error_codes::*;

/// Result alias used throughout the library.
pub type Result<T, E = MemseeError> = std::result::Result<T, E>;

/// A dump record that could not be decoded.
///
/// `record` is the 0-based index among non-blank lines, `offset` the byte
/// offset of the line start within the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("malformed dump record #{record} at byte {offset}: {message}")]
pub struct ParseError {
    pub record: u64,
    pub offset: u64,
    pub message: String,
}

/// Rejected query expression.
///
/// Each variant carries the identifier (or fragment) that caused the rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown collection or alias: {0}")]
    UnknownRelation(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("ambiguous column: {0} (qualify it with an alias)")]
    AmbiguousColumn(String),

    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),

    #[error("duplicate output column: {0} (give one of them an alias)")]
    DuplicateColumn(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("aggregate not allowed here: {0}")]
    MisplacedAggregate(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("subquery must project exactly one column, found {0}")]
    SubqueryArity(usize),

    #[error("query rejected by store: {0}")]
    Rejected(String),
}

impl QueryError {
    /// The offending identifier or fragment.
    pub fn identifier(&self) -> String {
        match self {
            QueryError::UnknownRelation(s)
            | QueryError::UnknownColumn(s)
            | QueryError::AmbiguousColumn(s)
            | QueryError::DuplicateAlias(s)
            | QueryError::DuplicateColumn(s)
            | QueryError::InvalidIdentifier(s)
            | QueryError::MisplacedAggregate(s)
            | QueryError::OutOfRange(s)
            | QueryError::Rejected(s) => s.clone(),
            QueryError::SubqueryArity(n) => n.to_string(),
        }
    }
}

/// Top-level library error.
#[derive(Debug, thiserror::Error)]
pub enum MemseeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("data quality: {0}")]
    DataQuality(DataQualityWarning),

    #[error("batch {batch} failed to commit: {reason}")]
    CommitFailure { batch: usize, reason: String },

    #[error("session busy: another writer is active on {}", path.display())]
    SessionBusy { path: PathBuf },

    #[error("store already exists: {}", path.display())]
    SessionExists { path: PathBuf },

    #[error("incompatible store {}: {reason}", path.display())]
    IncompatibleStore { path: PathBuf, reason: String },

    #[error("store already backed up: {}", path.display())]
    BackupExists { path: PathBuf },

    #[error("no backup to restore: {}", path.display())]
    NoBackup { path: PathBuf },

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("query cancelled")]
    QueryCancelled,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl MemseeError {
    /// Stable error code for this condition.
    pub fn code(&self) -> &'static str {
        match self {
            MemseeError::Parse(_) => MSE_DMP_001_MALFORMED_RECORD,
            MemseeError::DataQuality(_) => MSE_DMP_002_CONFLICTING_DUPLICATE,
            MemseeError::CommitFailure { .. } => MSE_ING_001_COMMIT_FAILURE,
            MemseeError::SessionBusy { .. } => MSE_ING_002_SESSION_BUSY,
            MemseeError::SessionExists { .. } => MSE_SES_001_SESSION_EXISTS,
            MemseeError::IncompatibleStore { .. } => MSE_SES_002_INCOMPATIBLE_STORE,
            MemseeError::BackupExists { .. } => MSE_SES_003_BACKUP_EXISTS,
            MemseeError::NoBackup { .. } => MSE_SES_004_NO_BACKUP,
            MemseeError::Query(_) => MSE_QRY_001_INVALID_QUERY,
            MemseeError::QueryCancelled => MSE_QRY_002_CANCELLED,
            MemseeError::Io(_) => MSE_IO_001_IO_FAILURE,
            MemseeError::Storage(_) => MSE_IO_002_STORAGE_FAILURE,
        }
    }

    /// True when the error came from SQLite interrupting a statement.
    pub(crate) fn is_interrupt(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted
        )
    }
}
