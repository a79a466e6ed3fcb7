use docflow_core::db::open_db_in_memory;
use docflow_core::{
    Carrier, CarrierLocks, CarrierStore, EngineConfig, EngineError, Movement, MovementEngine,
    MovementFilter, MovementId, MovementKind, MovementOrder, NewCarrier, Page, PageRequest,
    SqliteWorkflowStore,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

static TICKING_CLOCK: AtomicI64 = AtomicI64::new(1_700_000_000_000);

fn ticking_clock() -> i64 {
    TICKING_CLOCK.fetch_add(1_000, Ordering::SeqCst)
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn engine(conn: &Connection) -> MovementEngine<SqliteWorkflowStore<'_>> {
    MovementEngine::new(
        SqliteWorkflowStore::try_new(conn).unwrap(),
        Arc::new(CarrierLocks::new()),
        EngineConfig::default(),
    )
    .with_clock(ticking_clock)
}

fn create_carrier(engine: &MovementEngine<SqliteWorkflowStore<'_>>, code: &str) -> Carrier {
    engine
        .store()
        .create(&NewCarrier::new(code).unwrap())
        .unwrap()
}

fn ids(page: &Page<Movement>) -> Vec<MovementId> {
    page.items.iter().map(|movement| movement.id).collect()
}

#[test]
fn lookup_by_id_returns_stored_movement() {
    let conn = setup();
    let engine = engine(&conn);
    create_carrier(&engine, "M-100");

    let created = engine.add_cosignatory("M-100", 3, 9).unwrap();
    let loaded = engine.lookup_by_id(created.id).unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.recipient_id, Some(9));
}

#[test]
fn lookup_of_unknown_id_is_not_found() {
    let conn = setup();
    let engine = engine(&conn);

    let err = engine.lookup_by_id(42).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(42)));
}

#[test]
fn list_by_carrier_pages_in_insertion_order() {
    let conn = setup();
    let engine = engine(&conn);
    let carrier = create_carrier(&engine, "M-100");
    let other = create_carrier(&engine, "M-200");

    let mut expected = Vec::new();
    expected.push(engine.sign_with_password("M-100", 1).unwrap().id);
    engine.sign_with_password("M-200", 1).unwrap();
    expected.push(engine.sign_with_password("M-100", 2).unwrap().id);
    expected.push(engine.add_cosignatory("M-100", 1, 9).unwrap().id);
    expected.push(engine.finalize("M-100", 3).unwrap().id);
    expected.push(engine.route("M-100", 3, 10).unwrap().id);

    let first = engine
        .list_by_carrier(carrier.id, PageRequest::new(0, 2))
        .unwrap();
    assert_eq!(first.total_items, 5);
    assert_eq!(first.size, 2);
    assert_eq!(first.total_pages(), 3);
    assert!(first.has_next());
    assert_eq!(ids(&first), expected[..2].to_vec());

    let last = engine
        .list_by_carrier(carrier.id, PageRequest::new(2, 2))
        .unwrap();
    assert_eq!(ids(&last), expected[4..].to_vec());
    assert!(!last.has_next());

    let other_page = engine
        .list_by_carrier(other.id, PageRequest::default())
        .unwrap();
    assert_eq!(other_page.total_items, 1);
    assert_eq!(other_page.size, 20);
}

#[test]
fn list_applies_filters_and_ordering() {
    let conn = setup();
    let engine = engine(&conn);
    create_carrier(&engine, "M-100");
    create_carrier(&engine, "M-200");

    let a1 = engine.sign_with_password("M-100", 1).unwrap();
    let b1 = engine.sign_with_password("M-200", 1).unwrap();
    let a2 = engine.sign_with_password("M-100", 2).unwrap();
    engine.add_cosignatory("M-100", 1, 9).unwrap();

    let signatures = MovementFilter {
        kind: Some(MovementKind::SignWithPassword),
        ..MovementFilter::default()
    };
    let page = engine.list(&signatures, PageRequest::default()).unwrap();
    assert_eq!(page.total_items, 3);
    assert_eq!(ids(&page), vec![a1.id, a2.id, b1.id]);

    let chronological = MovementFilter {
        order: MovementOrder::Chronological,
        ..signatures.clone()
    };
    let page = engine.list(&chronological, PageRequest::default()).unwrap();
    assert_eq!(ids(&page), vec![a1.id, b1.id, a2.id]);

    let newest_first = MovementFilter {
        order: MovementOrder::NewestFirst,
        ..signatures.clone()
    };
    let page = engine.list(&newest_first, PageRequest::default()).unwrap();
    assert_eq!(ids(&page), vec![a2.id, b1.id, a1.id]);

    let by_subscriber = MovementFilter {
        subscriber_id: Some(2),
        ..MovementFilter::default()
    };
    let page = engine.list(&by_subscriber, PageRequest::default()).unwrap();
    assert_eq!(ids(&page), vec![a2.id]);

    let by_recipient = MovementFilter {
        recipient_id: Some(9),
        ..MovementFilter::default()
    };
    let page = engine.list(&by_recipient, PageRequest::default()).unwrap();
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].kind, MovementKind::AddCosignatory);

    let window = MovementFilter {
        from_ms: Some(b1.timestamp_ms),
        to_ms: Some(a2.timestamp_ms),
        ..MovementFilter::default()
    };
    let page = engine.list(&window, PageRequest::default()).unwrap();
    assert_eq!(ids(&page), vec![b1.id]);
}

#[test]
fn oversized_page_request_is_clamped() {
    let conn = setup();
    let engine = engine(&conn);
    create_carrier(&engine, "M-100");
    engine.sign_with_password("M-100", 1).unwrap();

    let page = engine
        .list(&MovementFilter::default(), PageRequest::new(0, 5_000))
        .unwrap();
    assert_eq!(page.size, 100);
    assert_eq!(page.items.len(), 1);
}

#[test]
fn cancelling_signature_allows_signing_again() {
    let conn = setup();
    let engine = engine(&conn);
    let carrier = create_carrier(&engine, "M-100");

    let signature = engine.sign_with_password("M-100", 7).unwrap();
    assert_eq!(engine.find_carrier("M-100").unwrap().status_code, "M-100/SIG");

    let cancelled = engine.cancel_movement(signature.id).unwrap();
    assert!(cancelled.cancelled);
    assert_eq!(cancelled.id, signature.id);

    let reloaded = engine.find_carrier("M-100").unwrap();
    assert_eq!(reloaded.status_code, "M-100/NEW");
    assert!(reloaded.marks.is_empty());

    let again = engine.sign_with_password("M-100", 7).unwrap();
    assert_ne!(again.id, signature.id);

    let active = engine
        .list(
            &MovementFilter {
                carrier_id: Some(carrier.id),
                ..MovementFilter::default()
            },
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(ids(&active), vec![again.id]);

    let history = engine
        .list_by_carrier(carrier.id, PageRequest::default())
        .unwrap();
    assert_eq!(ids(&history), vec![signature.id, again.id]);
}

#[test]
fn cancelling_finalization_reopens_carrier() {
    let conn = setup();
    let engine = engine(&conn);
    create_carrier(&engine, "M-200");
    let finalization = engine.finalize("M-200", 1).unwrap();
    engine.add_cosignatory("M-200", 3, 9).unwrap_err();

    engine.cancel_movement(finalization.id).unwrap();
    engine.add_cosignatory("M-200", 3, 9).unwrap();
    assert_eq!(engine.find_carrier("M-200").unwrap().status_code, "M-200/COS");
}

#[test]
fn cancelling_twice_is_idempotent() {
    let conn = setup();
    let engine = engine(&conn);
    create_carrier(&engine, "M-100");
    let signature = engine.sign_with_password("M-100", 7).unwrap();

    let first = engine.cancel_movement(signature.id).unwrap();
    let second = engine.cancel_movement(signature.id).unwrap();
    assert_eq!(first, second);
}

#[test]
fn cancelling_unknown_movement_is_not_found() {
    let conn = setup();
    let engine = engine(&conn);

    let err = engine.cancel_movement(99).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(99)));
}
