//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the collaborator contracts the movement engine consumes: carrier
//!   store, movement ledger, document repository.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Write paths validate model records before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - `WorkflowStore::atomically` commits every write of its closure or none.

use crate::db::DbError;
use crate::model::ModelValidationError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod carrier_repo;
pub mod document_repo;
pub mod movement_repo;
pub mod page;
mod sqlite;

pub use sqlite::SqliteWorkflowStore;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for workflow persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    Db(DbError),
    /// Another writer held the database for longer than the busy timeout.
    Busy,
    /// A carrier with this code already exists.
    CarrierCodeTaken(String),
    /// Update target does not exist.
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Busy => write!(f, "database is busy"),
            Self::CarrierCodeTaken(code) => write!(f, "carrier code already exists: {code}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted workflow data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy,
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Carrier store plus movement ledger with a shared atomic write scope.
pub trait WorkflowStore: carrier_repo::CarrierStore + movement_repo::MovementLedger {
    /// Runs `op` so that all store writes it performs commit together.
    ///
    /// When `op` fails nothing it wrote is kept. Calls made while a scope is
    /// already open join the outer scope.
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>;
}
