//! Event publisher contract and implementations.

use crate::model::document::DocumentRepresentation;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Topic carrying newly registered documents.
pub const DOCUMENT_CREATED_TOPIC: &str = "document-created";

/// Publishing failures.
#[derive(Debug)]
pub enum PublishError {
    Serialize(serde_json::Error),
    Sqlite(rusqlite::Error),
    /// The publisher is not accepting events.
    Unavailable(String),
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(err) => write!(f, "failed to encode event payload: {err}"),
            Self::Sqlite(err) => write!(f, "failed to store event: {err}"),
            Self::Unavailable(reason) => write!(f, "publisher unavailable: {reason}"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialize(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::Unavailable(_) => None,
        }
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

impl From<rusqlite::Error> for PublishError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Sink for document notifications.
pub trait EventPublisher {
    fn publish(&self, topic: &str, payload: &DocumentRepresentation) -> Result<(), PublishError>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for &P {
    fn publish(&self, topic: &str, payload: &DocumentRepresentation) -> Result<(), PublishError> {
        (**self).publish(topic, payload)
    }
}

/// Stored outbox row awaiting delivery by a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub id: i64,
    pub topic: String,
    /// JSON-encoded payload.
    pub payload: String,
    pub created_at_ms: i64,
}

/// Publisher that appends JSON payloads to the `event_outbox` table.
///
/// A relay process reads `pending` rows, forwards them to the broker and
/// calls `mark_delivered`.
pub struct SqliteOutboxPublisher<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOutboxPublisher<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Oldest undelivered events first.
    pub fn pending(&self, limit: u32) -> Result<Vec<OutboxEvent>, PublishError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic, payload, created_at
             FROM event_outbox
             WHERE delivered_at IS NULL
             ORDER BY id ASC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(OutboxEvent {
                id: row.get(0)?,
                topic: row.get(1)?,
                payload: row.get(2)?,
                created_at_ms: row.get(3)?,
            });
        }
        Ok(events)
    }

    /// Marks one event delivered. Returns `false` when it was already
    /// delivered or does not exist.
    pub fn mark_delivered(&self, id: i64) -> Result<bool, PublishError> {
        let changed = self.conn.execute(
            "UPDATE event_outbox
             SET delivered_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1 AND delivered_at IS NULL;",
            [id],
        )?;
        Ok(changed == 1)
    }
}

impl EventPublisher for SqliteOutboxPublisher<'_> {
    fn publish(&self, topic: &str, payload: &DocumentRepresentation) -> Result<(), PublishError> {
        let encoded = serde_json::to_string(payload)?;
        self.conn.execute(
            "INSERT INTO event_outbox (topic, payload) VALUES (?1, ?2);",
            params![topic, encoded],
        )?;
        debug!(
            "event=outbox_append module=events status=ok topic={} outbox_id={}",
            topic,
            self.conn.last_insert_rowid()
        );
        Ok(())
    }
}

/// Event captured by `MemoryEventPublisher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: DocumentRepresentation,
}

/// In-process publisher that records events; can be switched to fail.
#[derive(Debug, Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    unavailable: Option<String>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher whose every publish fails with `Unavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            unavailable: Some(reason.into()),
        }
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }
}

impl EventPublisher for MemoryEventPublisher {
    fn publish(&self, topic: &str, payload: &DocumentRepresentation) -> Result<(), PublishError> {
        if let Some(reason) = &self.unavailable {
            return Err(PublishError::Unavailable(reason.clone()));
        }
        self.events.lock().push(PublishedEvent {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
