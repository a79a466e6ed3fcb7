//! Ordered schema steps for the workflow database.
//!
//! Each step runs inside the upgrade transaction and bumps
//! `PRAGMA user_version` to its own number, so a failed upgrade leaves the
//! file at the last fully applied step.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema step: target version plus the SQL that reaches it.
#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        sql: include_str!("0002_carrier_marks.sql"),
    },
    SchemaStep {
        version: 3,
        sql: include_str!("0003_event_outbox.sql"),
    },
];

/// Tables the workflow store reads and writes.
pub const WORKFLOW_TABLES: [&str; 5] = [
    "carriers",
    "carrier_marks",
    "movements",
    "documents",
    "event_outbox",
];

/// Schema version produced by the last step.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Runs every step above the recorded version.
///
/// # Errors
/// - `SchemaMismatch` when the file is ahead of this build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = current_user_version(conn)?;
    let expected = latest_version();
    if found > expected {
        return Err(DbError::SchemaMismatch { found, expected });
    }
    if found == expected {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > found) {
        tx.execute_batch(step.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))?;
    }
    tx.commit()?;
    Ok(())
}

/// Checks that `conn` is fully migrated without changing it.
///
/// # Errors
/// - `SchemaMismatch` when the recorded version is not `latest_version()`.
/// - `MissingTable` when a workflow table was dropped behind our back.
pub fn ensure_schema_current(conn: &Connection) -> DbResult<()> {
    let found = current_user_version(conn)?;
    let expected = latest_version();
    if found != expected {
        return Err(DbError::SchemaMismatch { found, expected });
    }

    for table in WORKFLOW_TABLES {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}

/// Schema version recorded on the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
