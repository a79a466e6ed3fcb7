use docflow_core::db::open_db_in_memory;
use docflow_core::{
    CarrierLocks, CreationStatus, DocumentRepresentation, DocumentService, DocumentServiceError,
    DocumentSubmission, EngineConfig, MemoryEventPublisher, ModelValidationError, MovementEngine,
    SqliteOutboxPublisher, SqliteWorkflowStore, DOCUMENT_CREATED_TOPIC,
};
use rusqlite::Connection;
use std::sync::Arc;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn submission(title: &str, carrier_code: Option<&str>) -> DocumentSubmission {
    DocumentSubmission {
        title: title.to_string(),
        content: "Quarterly budget".to_string(),
        carrier_code: carrier_code.map(str::to_string),
    }
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn registration_stores_document_and_publishes_it() {
    let conn = setup();
    let publisher = MemoryEventPublisher::new();
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    let registration = service
        .register(&submission("  Budget 2026  ", Some("m-100")), 42)
        .unwrap();
    assert_eq!(registration.status, CreationStatus::Created);
    assert!(registration.published);

    let document = &registration.document;
    assert_eq!(document.title, "Budget 2026");
    assert_eq!(document.subscriber_id, 42);
    assert_eq!(document.carrier_code, "M-100");
    assert_eq!(document.status_code, "M-100/NEW");

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, DOCUMENT_CREATED_TOPIC);
    assert_eq!(&events[0].payload, document);

    let loaded = service.get(document.id).unwrap();
    assert_eq!(loaded.as_ref(), Some(document));
}

#[test]
fn missing_carrier_code_is_generated() {
    let conn = setup();
    let publisher = MemoryEventPublisher::new();
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    let first = service.register(&submission("First", None), 1).unwrap();
    let second = service.register(&submission("Second", None), 1).unwrap();

    assert_eq!(first.document.carrier_code, "DOC-1");
    assert_eq!(second.document.carrier_code, "DOC-2");
    assert_ne!(first.document.id, second.document.id);
}

#[test]
fn generated_code_skips_numbers_taken_by_explicit_codes() {
    let conn = setup();
    let publisher = MemoryEventPublisher::new();
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    let first = service.register(&submission("First", None), 1).unwrap();
    assert_eq!(first.document.carrier_code, "DOC-1");
    service
        .register(&submission("Explicit", Some("DOC-3")), 1)
        .unwrap();

    let third = service.register(&submission("Third", None), 1).unwrap();
    assert_eq!(third.document.carrier_code, "DOC-4");
    let fourth = service.register(&submission("Fourth", None), 1).unwrap();
    assert_eq!(fourth.document.carrier_code, "DOC-5");

    assert_eq!(count(&conn, "carriers"), 4);
    assert_eq!(publisher.events().len(), 4);
}

#[test]
fn taken_carrier_code_rolls_back_registration() {
    let conn = setup();
    let publisher = MemoryEventPublisher::new();
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    service.register(&submission("First", Some("M-100")), 1).unwrap();
    let err = service
        .register(&submission("Second", Some("M-100")), 2)
        .unwrap_err();

    assert!(matches!(err, DocumentServiceError::CarrierCodeTaken(ref code) if code == "M-100"));
    assert_eq!(count(&conn, "carriers"), 1);
    assert_eq!(count(&conn, "documents"), 1);
    assert_eq!(publisher.events().len(), 1);
}

#[test]
fn blank_title_is_rejected_before_storage() {
    let conn = setup();
    let publisher = MemoryEventPublisher::new();
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    let err = service
        .register(&submission("   ", Some("M-100")), 1)
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentServiceError::Validation(ModelValidationError::BlankTitle)
    ));

    let err = service
        .register(&submission("Report", Some("not a code")), 1)
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentServiceError::Validation(ModelValidationError::InvalidCarrierCode(_))
    ));

    assert_eq!(count(&conn, "carriers"), 0);
    assert!(publisher.events().is_empty());
}

#[test]
fn publisher_failure_keeps_registration() {
    let conn = setup();
    let publisher = MemoryEventPublisher::unavailable("broker offline");
    let service = DocumentService::new(SqliteWorkflowStore::try_new(&conn).unwrap(), &publisher);

    let registration = service
        .register(&submission("Report", Some("M-100")), 1)
        .unwrap();
    assert!(!registration.published);
    assert!(service.get(registration.document.id).unwrap().is_some());
}

#[test]
fn unknown_document_id_returns_none() {
    let conn = setup();
    let service = DocumentService::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        MemoryEventPublisher::new(),
    );

    assert_eq!(service.get(Uuid::new_v4()).unwrap(), None);
}

#[test]
fn outbox_publisher_queues_json_payload_until_delivered() {
    let conn = setup();
    let service = DocumentService::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        SqliteOutboxPublisher::new(&conn),
    );
    let registration = service
        .register(&submission("Report", Some("M-100")), 5)
        .unwrap();
    assert!(registration.published);

    let outbox = SqliteOutboxPublisher::new(&conn);
    let pending = outbox.pending(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].topic, DOCUMENT_CREATED_TOPIC);

    let payload: DocumentRepresentation = serde_json::from_str(&pending[0].payload).unwrap();
    assert_eq!(payload, registration.document);

    assert!(outbox.mark_delivered(pending[0].id).unwrap());
    assert!(!outbox.mark_delivered(pending[0].id).unwrap());
    assert!(outbox.pending(10).unwrap().is_empty());
}

#[test]
fn registered_carrier_accepts_movements() {
    let conn = setup();
    let service = DocumentService::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        MemoryEventPublisher::new(),
    );
    let registration = service.register(&submission("Contract", None), 5).unwrap();

    let engine = MovementEngine::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        Arc::new(CarrierLocks::new()),
        EngineConfig::default(),
    );
    engine
        .sign_with_password(&registration.document.carrier_code, 5)
        .unwrap();
    engine
        .finalize(&registration.document.status_code.replace("NEW", "SIG"), 6)
        .unwrap();

    let current = service.get(registration.document.id).unwrap().unwrap();
    assert_eq!(current.status_code, "DOC-1/FIN");
}
