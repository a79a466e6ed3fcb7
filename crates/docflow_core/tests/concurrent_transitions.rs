use docflow_core::db::{open_db, open_db_in_memory};
use docflow_core::{
    CarrierLocks, CarrierStore, EngineConfig, EngineError, EngineResult, Movement, MovementEngine,
    NewCarrier, SqliteWorkflowStore,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

fn seed_carriers(path: &Path, codes: &[&str]) {
    let conn = open_db(path).unwrap();
    let store = SqliteWorkflowStore::try_new(&conn).unwrap();
    for code in codes {
        store.create(&NewCarrier::new(code).unwrap()).unwrap();
    }
}

type Engine<'conn> = MovementEngine<SqliteWorkflowStore<'conn>>;
type Job = fn(&Engine<'_>) -> EngineResult<Movement>;

fn run_in_parallel(
    path: &Path,
    locks: Arc<CarrierLocks>,
    jobs: Vec<Job>,
) -> Vec<EngineResult<Movement>> {
    let barrier = Arc::new(Barrier::new(jobs.len()));
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let path = path.to_path_buf();
            let locks = Arc::clone(&locks);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let engine = MovementEngine::new(
                    SqliteWorkflowStore::try_new(&conn).unwrap(),
                    locks,
                    EngineConfig::default(),
                );
                barrier.wait();
                job(&engine)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

fn sign_by_code(engine: &Engine<'_>) -> EngineResult<Movement> {
    engine.sign_with_password("M-100", 7)
}

fn sign_by_status_code(engine: &Engine<'_>) -> EngineResult<Movement> {
    engine.sign_with_password("M-100/NEW", 7)
}

fn cosign_m200(engine: &Engine<'_>) -> EngineResult<Movement> {
    engine.add_cosignatory("M-200", 3, 9)
}

fn finalize_m200(engine: &Engine<'_>) -> EngineResult<Movement> {
    engine.finalize("M-200", 1)
}

fn finalize_m100(engine: &Engine<'_>) -> EngineResult<Movement> {
    engine.finalize("M-100", 7)
}

#[test]
fn racing_signatures_by_one_signer_commit_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docflow.sqlite3");
    seed_carriers(&path, &["M-100"]);

    let jobs: Vec<Job> = vec![sign_by_code, sign_by_status_code];
    let results = run_in_parallel(&path, Arc::new(CarrierLocks::new()), jobs);

    let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(committed.len(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, EngineError::DuplicateMovement(id) if *id == committed[0].id)
                    || err.is_retryable(),
                "unexpected error: {err}"
            );
        }
    }

    let conn = open_db(&path).unwrap();
    let stored: i64 = conn
        .query_row("SELECT COUNT(*) FROM movements;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 1);
}

#[test]
fn racing_cosignatory_and_finalize_never_leave_cosign_after_finalize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docflow.sqlite3");
    seed_carriers(&path, &["M-200"]);

    let jobs: Vec<Job> = vec![cosign_m200, finalize_m200];
    let results = run_in_parallel(&path, Arc::new(CarrierLocks::new()), jobs);
    assert!(results[1].is_ok());

    let conn = open_db(&path).unwrap();
    let kinds: Vec<String> = conn
        .prepare("SELECT kind FROM movements ORDER BY id ASC;")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    match &results[0] {
        Ok(_) => assert_eq!(kinds, vec!["add_cosignatory", "finalize"]),
        Err(err) => {
            assert!(matches!(err, EngineError::DocumentFinalized { .. }));
            assert_eq!(kinds, vec!["finalize"]);
        }
    }
}

#[test]
fn different_carriers_progress_independently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docflow.sqlite3");
    seed_carriers(&path, &["M-100", "M-200"]);

    let jobs: Vec<Job> = vec![finalize_m100, finalize_m200];
    let results = run_in_parallel(&path, Arc::new(CarrierLocks::new()), jobs);
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn engines_sharing_a_connection_see_each_others_movements() {
    let conn = open_db_in_memory().unwrap();
    let locks = Arc::new(CarrierLocks::new());
    let first = MovementEngine::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        Arc::clone(&locks),
        EngineConfig::default(),
    );
    let second = MovementEngine::new(
        SqliteWorkflowStore::try_new(&conn).unwrap(),
        locks,
        EngineConfig::default(),
    );
    first
        .store()
        .create(&NewCarrier::new("M-100").unwrap())
        .unwrap();

    let signature = first.sign_with_password("M-100", 7).unwrap();
    let err = second.sign_with_password("M-100", 7).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateMovement(id) if id == signature.id));
}
