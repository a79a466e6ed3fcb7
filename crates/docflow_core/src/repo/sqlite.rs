//! SQLite-backed workflow store.
//!
//! One connection-bound value implements the carrier store, the movement
//! ledger and the document repository; their trait impls live next to the
//! contracts in the sibling modules.

use super::{RepoError, RepoResult, WorkflowStore};
use crate::db::migrations::ensure_schema_current;
use log::warn;
use rusqlite::Connection;

/// SQLite workflow store bound to one migrated connection.
pub struct SqliteWorkflowStore<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> SqliteWorkflowStore<'conn> {
    /// Constructs a store from a migrated connection.
    ///
    /// # Errors
    /// - `Db(SchemaMismatch)` when migrations were not applied.
    /// - `Db(MissingTable)` when the schema is incomplete.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn })
    }
}

impl WorkflowStore for SqliteWorkflowStore<'_> {
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        if !self.conn.is_autocommit() {
            return op();
        }

        // IMMEDIATE takes the write lock up front, so competing writers wait on
        // the busy timeout here instead of failing halfway through `op`.
        self.conn
            .execute_batch("BEGIN IMMEDIATE;")
            .map_err(|err| E::from(RepoError::from(err)))?;

        match op() {
            Ok(value) => match self.conn.execute_batch("COMMIT;") {
                Ok(()) => Ok(value),
                Err(err) => {
                    rollback(self.conn);
                    Err(E::from(RepoError::from(err)))
                }
            },
            Err(err) => {
                rollback(self.conn);
                Err(err)
            }
        }
    }
}

fn rollback(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(err) = conn.execute_batch("ROLLBACK;") {
        warn!("event=store_rollback module=repo status=error error={}", err);
    }
}

pub(super) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(super) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
