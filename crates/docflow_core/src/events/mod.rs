//! Outbound notifications about registered documents.
//!
//! # Responsibility
//! - Define the publisher contract used by document registration.
//! - Provide an SQLite outbox and an in-process publisher.
//!
//! # Invariants
//! - Publishing is fire-and-forget for callers: a failed publish never undoes
//!   a committed registration.

mod publisher;

pub use publisher::{
    EventPublisher, MemoryEventPublisher, OutboxEvent, PublishError, PublishedEvent,
    SqliteOutboxPublisher, DOCUMENT_CREATED_TOPIC,
};
