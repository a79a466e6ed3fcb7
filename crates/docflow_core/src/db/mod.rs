//! SQLite bootstrap for the workflow store.
//!
//! # Responsibility
//! - Open connections with the pragmas every workflow write relies on.
//! - Bring the schema to the version this build expects, or refuse it.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - A connection handed to a store is at exactly `migrations::latest_version()`
//!   with every workflow table present.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_timeout, DEFAULT_BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

/// Storage bootstrap failures.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Recorded schema version differs from the one this build works with.
    ///
    /// `found > expected` means the file was written by a newer build;
    /// `found < expected` means migrations were never applied to it.
    SchemaMismatch { found: u32, expected: u32 },
    /// Schema version matches but a workflow table is absent.
    MissingTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaMismatch { found, expected } if found > expected => write!(
                f,
                "workflow schema version {found} is newer than supported {expected}"
            ),
            Self::SchemaMismatch { found, expected } => write!(
                f,
                "workflow schema version {found} is not migrated (expected {expected})"
            ),
            Self::MissingTable(table) => write!(f, "workflow table `{table}` is missing"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaMismatch { .. } | Self::MissingTable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
