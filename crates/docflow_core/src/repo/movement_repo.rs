//! Movement ledger contract and SQLite implementation.
//!
//! # Responsibility
//! - Append movements and assign their ids.
//! - Serve id lookups and filtered, paginated queries.
//!
//! # Invariants
//! - Movements are never updated except for the cancellation flag.
//! - Default ordering is carrier-scoped insertion order
//!   (`carrier_id ASC, id ASC`).

use super::page::{Page, PageLimits, PageRequest};
use super::sqlite::{bool_to_int, int_to_bool, SqliteWorkflowStore};
use super::{RepoError, RepoResult};
use crate::model::carrier::CarrierId;
use crate::model::movement::{Movement, MovementId, MovementKind, NewMovement};
use crate::model::{PersonId, SubscriberId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};

const MOVEMENT_SELECT_SQL: &str = "SELECT
    id,
    carrier_id,
    kind,
    subscriber_id,
    recipient_id,
    timestamp_ms,
    is_cancelled
FROM movements";

/// Result ordering for ledger queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementOrder {
    /// `carrier_id ASC, id ASC`.
    #[default]
    CarrierInsertion,
    /// `timestamp_ms ASC, id ASC`.
    Chronological,
    /// `timestamp_ms DESC, id DESC`.
    NewestFirst,
}

impl MovementOrder {
    fn order_by_sql(self) -> &'static str {
        match self {
            Self::CarrierInsertion => " ORDER BY carrier_id ASC, id ASC",
            Self::Chronological => " ORDER BY timestamp_ms ASC, id ASC",
            Self::NewestFirst => " ORDER BY timestamp_ms DESC, id DESC",
        }
    }
}

/// Filter options for ledger queries. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub carrier_id: Option<CarrierId>,
    pub kind: Option<MovementKind>,
    pub subscriber_id: Option<SubscriberId>,
    pub recipient_id: Option<PersonId>,
    #[serde(default)]
    pub include_cancelled: bool,
    /// Inclusive lower bound, epoch milliseconds.
    pub from_ms: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds.
    pub to_ms: Option<i64>,
    #[serde(default)]
    pub order: MovementOrder,
}

impl MovementFilter {
    /// Filter matching every movement of one carrier, cancelled ones included.
    pub fn for_carrier(carrier_id: CarrierId) -> Self {
        Self {
            carrier_id: Some(carrier_id),
            include_cancelled: true,
            ..Self::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE 1 = 1");
        let mut bind_values = Vec::new();

        if let Some(carrier_id) = self.carrier_id {
            sql.push_str(" AND carrier_id = ?");
            bind_values.push(Value::Integer(carrier_id));
        }
        if let Some(kind) = self.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(subscriber_id) = self.subscriber_id {
            sql.push_str(" AND subscriber_id = ?");
            bind_values.push(Value::Integer(subscriber_id));
        }
        if let Some(recipient_id) = self.recipient_id {
            sql.push_str(" AND recipient_id = ?");
            bind_values.push(Value::Integer(recipient_id));
        }
        if !self.include_cancelled {
            sql.push_str(" AND is_cancelled = 0");
        }
        if let Some(from_ms) = self.from_ms {
            sql.push_str(" AND timestamp_ms >= ?");
            bind_values.push(Value::Integer(from_ms));
        }
        if let Some(to_ms) = self.to_ms {
            sql.push_str(" AND timestamp_ms < ?");
            bind_values.push(Value::Integer(to_ms));
        }

        (sql, bind_values)
    }
}

/// Append-only movement persistence.
pub trait MovementLedger {
    /// Persists a movement and returns it with its assigned id.
    fn insert(&self, movement: &NewMovement) -> RepoResult<Movement>;
    fn find_by_id(&self, id: MovementId) -> RepoResult<Option<Movement>>;
    fn query(&self, filter: &MovementFilter, page: &PageRequest) -> RepoResult<Page<Movement>>;
    /// All movements of one carrier in insertion order.
    fn query_by_carrier(
        &self,
        carrier_id: CarrierId,
        page: &PageRequest,
    ) -> RepoResult<Page<Movement>>;
    /// Flips the cancellation flag; the only mutation a movement allows.
    fn set_cancelled(&self, id: MovementId, cancelled: bool) -> RepoResult<()>;
}

impl MovementLedger for SqliteWorkflowStore<'_> {
    fn insert(&self, movement: &NewMovement) -> RepoResult<Movement> {
        movement.validate()?;

        self.conn.execute(
            "INSERT INTO movements (
                carrier_id,
                kind,
                subscriber_id,
                recipient_id,
                timestamp_ms,
                is_cancelled
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0);",
            params![
                movement.carrier_id,
                movement.kind.as_str(),
                movement.subscriber_id,
                movement.recipient_id,
                movement.timestamp_ms,
            ],
        )?;

        Ok(movement.clone().into_movement(self.conn.last_insert_rowid()))
    }

    fn find_by_id(&self, id: MovementId) -> RepoResult<Option<Movement>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MOVEMENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_movement_row(row)?));
        }
        Ok(None)
    }

    fn query(&self, filter: &MovementFilter, page: &PageRequest) -> RepoResult<Page<Movement>> {
        let limits = PageLimits::default();
        let size = page.limit(limits);
        let (where_sql, mut bind_values) = filter.where_clause();

        let total_items: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM movements{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("{MOVEMENT_SELECT_SQL}{where_sql}");
        sql.push_str(filter.order.order_by_sql());
        sql.push_str(" LIMIT ? OFFSET ?");
        bind_values.push(Value::Integer(i64::from(size)));
        bind_values.push(Value::Integer(
            i64::try_from(page.offset(limits)).unwrap_or(i64::MAX),
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_movement_row(row)?);
        }

        Ok(Page {
            items,
            page: page.page,
            size,
            total_items: u64::try_from(total_items).unwrap_or(0),
        })
    }

    fn query_by_carrier(
        &self,
        carrier_id: CarrierId,
        page: &PageRequest,
    ) -> RepoResult<Page<Movement>> {
        self.query(&MovementFilter::for_carrier(carrier_id), page)
    }

    fn set_cancelled(&self, id: MovementId, cancelled: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE movements SET is_cancelled = ?1 WHERE id = ?2;",
            params![bool_to_int(cancelled), id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("movement {id}")));
        }
        Ok(())
    }
}

/// Loads the full history of one carrier in insertion order.
pub(super) fn load_carrier_movements(
    conn: &Connection,
    carrier_id: CarrierId,
) -> RepoResult<Vec<Movement>> {
    let mut stmt = conn.prepare(&format!(
        "{MOVEMENT_SELECT_SQL} WHERE carrier_id = ?1 ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([carrier_id])?;
    let mut movements = Vec::new();
    while let Some(row) = rows.next()? {
        movements.push(parse_movement_row(row)?);
    }
    Ok(movements)
}

fn parse_movement_row(row: &Row<'_>) -> RepoResult<Movement> {
    let kind_text: String = row.get("kind")?;
    let kind = MovementKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid movement kind `{kind_text}` in movements.kind"))
    })?;

    let movement = Movement {
        id: row.get("id")?,
        kind,
        subscriber_id: row.get("subscriber_id")?,
        recipient_id: row.get("recipient_id")?,
        carrier_id: row.get("carrier_id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        cancelled: int_to_bool(row.get("is_cancelled")?, "movements.is_cancelled")?,
    };
    movement.validate()?;
    Ok(movement)
}
