//! Core domain logic for the document movement workflow.
//! This crate is the single source of truth for carrier transition rules.

pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod workflow;

pub use config::{ConfigError, DocflowConfig, EngineConfig, LoggingConfig};
pub use events::{
    EventPublisher, MemoryEventPublisher, OutboxEvent, PublishError, PublishedEvent,
    SqliteOutboxPublisher, DOCUMENT_CREATED_TOPIC,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::carrier::{Carrier, CarrierId, MarkKind, NewCarrier};
pub use model::document::{Document, DocumentId, DocumentRepresentation, DocumentSubmission};
pub use model::movement::{Movement, MovementId, MovementKind, NewMovement};
pub use model::{ModelValidationError, PersonId, SubscriberId};
pub use repo::carrier_repo::CarrierStore;
pub use repo::document_repo::DocumentRepository;
pub use repo::movement_repo::{MovementFilter, MovementLedger, MovementOrder};
pub use repo::page::{Page, PageLimits, PageRequest};
pub use repo::{RepoError, RepoResult, SqliteWorkflowStore, WorkflowStore};
pub use service::carrier_locks::{CarrierLease, CarrierLocks, LockTimeout};
pub use service::document_service::{
    CreationStatus, DocumentService, DocumentServiceError, Registration,
};
pub use service::movement_engine::{EngineError, EngineResult, MovementEngine};
pub use workflow::{
    check_transition, derive_state, FinalizedReason, Rejection, Transition, WorkflowSnapshot,
    WorkflowState,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
