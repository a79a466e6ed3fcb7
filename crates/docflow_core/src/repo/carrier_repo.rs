//! Carrier store contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve carriers by code or status code with full history.
//! - Persist the carrier projection (`status_code`, marks).
//!
//! # Invariants
//! - Loaded carriers carry every movement, cancelled ones included, in
//!   insertion order.
//! - `save` replaces the mark set and status code together.

use super::movement_repo::load_carrier_movements;
use super::sqlite::SqliteWorkflowStore;
use super::{RepoError, RepoResult, WorkflowStore};
use crate::model::carrier::{
    base_carrier_code, derive_status_code, normalize_carrier_code, Carrier, CarrierId, MarkKind,
    NewCarrier,
};
use log::warn;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeSet;

/// Current state of document carriers.
pub trait CarrierStore {
    /// Finds a carrier by its stable code or a status code, current or stale.
    fn find_by_code(&self, code: &str) -> RepoResult<Option<Carrier>>;
    fn get_carrier(&self, id: CarrierId) -> RepoResult<Option<Carrier>>;
    /// Creates an untouched carrier.
    fn create(&self, carrier: &NewCarrier) -> RepoResult<Carrier>;
    /// Persists the carrier projection and returns the stored carrier.
    fn save(&self, carrier: &Carrier) -> RepoResult<Carrier>;
    /// Number suggested for the next generated carrier code.
    fn next_carrier_number(&self) -> RepoResult<i64>;
}

impl CarrierStore for SqliteWorkflowStore<'_> {
    fn find_by_code(&self, code: &str) -> RepoResult<Option<Carrier>> {
        let normalized = normalize_carrier_code(code);
        let base_code = base_carrier_code(&normalized);
        // Exact code, then current status code, then the code behind a stale
        // status code such as `M-100/NEW` after the carrier moved on.
        let header = self
            .conn
            .query_row(
                "SELECT id, code, status_code
                 FROM carriers
                 WHERE code = ?1 OR status_code = ?1 OR code = ?2
                 ORDER BY (code = ?1) DESC, (status_code = ?1) DESC, id ASC
                 LIMIT 1;",
                params![normalized.as_str(), base_code],
                |row| {
                    Ok((
                        row.get::<_, CarrierId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match header {
            Some((id, code, status_code)) => {
                Ok(Some(load_carrier(self.conn, id, code, status_code)?))
            }
            None => Ok(None),
        }
    }

    fn get_carrier(&self, id: CarrierId) -> RepoResult<Option<Carrier>> {
        let header = self
            .conn
            .query_row(
                "SELECT code, status_code FROM carriers WHERE id = ?1;",
                [id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match header {
            Some((code, status_code)) => {
                Ok(Some(load_carrier(self.conn, id, code, status_code)?))
            }
            None => Ok(None),
        }
    }

    fn create(&self, carrier: &NewCarrier) -> RepoResult<Carrier> {
        let status_code = derive_status_code(&carrier.code, &[]);
        let inserted = self.conn.execute(
            "INSERT INTO carriers (code, status_code) VALUES (?1, ?2);",
            params![carrier.code.as_str(), status_code.as_str()],
        );
        if let Err(err) = inserted {
            if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                return Err(RepoError::CarrierCodeTaken(carrier.code.clone()));
            }
            return Err(err.into());
        }

        Ok(Carrier::new(
            self.conn.last_insert_rowid(),
            carrier.code.clone(),
            Vec::new(),
        ))
    }

    fn save(&self, carrier: &Carrier) -> RepoResult<Carrier> {
        self.atomically(|| -> RepoResult<()> {
            let changed = self.conn.execute(
                "UPDATE carriers
                 SET
                    status_code = ?1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?2;",
                params![carrier.status_code.as_str(), carrier.id],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(format!("carrier {}", carrier.id)));
            }

            self.conn
                .execute("DELETE FROM carrier_marks WHERE carrier_id = ?1;", [carrier.id])?;
            for mark in &carrier.marks {
                self.conn.execute(
                    "INSERT INTO carrier_marks (carrier_id, mark) VALUES (?1, ?2);",
                    params![carrier.id, mark.as_str()],
                )?;
            }
            Ok(())
        })?;

        self.get_carrier(carrier.id)?
            .ok_or_else(|| RepoError::NotFound(format!("carrier {}", carrier.id)))
    }

    fn next_carrier_number(&self) -> RepoResult<i64> {
        let next = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM carriers;", [], |row| {
                row.get(0)
            })?;
        Ok(next)
    }
}

fn load_carrier(
    conn: &Connection,
    id: CarrierId,
    code: String,
    status_code: String,
) -> RepoResult<Carrier> {
    let movements = load_carrier_movements(conn, id)?;
    let marks = load_marks(conn, id)?;
    let mut carrier = Carrier {
        id,
        code,
        status_code,
        marks,
        movements,
    };

    if !carrier.is_projection_current() {
        warn!(
            "event=carrier_load module=repo status=stale_projection carrier_id={} stored_status={}",
            carrier.id, carrier.status_code
        );
        carrier.refresh_projection();
    }

    Ok(carrier)
}

fn load_marks(conn: &Connection, carrier_id: CarrierId) -> RepoResult<BTreeSet<MarkKind>> {
    let mut stmt = conn.prepare(
        "SELECT mark FROM carrier_marks WHERE carrier_id = ?1 ORDER BY mark ASC;",
    )?;
    let mut rows = stmt.query([carrier_id])?;
    let mut marks = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        let mark = MarkKind::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid mark `{value}` in carrier_marks.mark"))
        })?;
        marks.insert(mark);
    }
    Ok(marks)
}
