//! Movement engine: validates and commits carrier transitions.
//!
//! # Responsibility
//! - Gate every transition against the carrier's current history.
//! - Commit the movement and the refreshed carrier projection as one unit.
//! - Serve movement lookups and paginated listings.
//!
//! # Invariants
//! - Every transition starts by resolving the carrier; a missing carrier
//!   fails with `CarrierNotFound` before anything else happens.
//! - At most one transition per carrier is in flight: the carrier lease is
//!   held for the whole read-validate-write sequence.
//! - A rejected or failed transition writes nothing.

use crate::config::EngineConfig;
use crate::model::carrier::{base_carrier_code, normalize_carrier_code, Carrier, CarrierId};
use crate::model::movement::{Movement, MovementId, NewMovement};
use crate::model::{now_epoch_ms, PersonId, SubscriberId};
use crate::repo::movement_repo::MovementFilter;
use crate::repo::page::{Page, PageRequest};
use crate::repo::{RepoError, WorkflowStore};
use crate::service::carrier_locks::CarrierLocks;
use crate::workflow::{check_transition, FinalizedReason, Rejection, Transition, WorkflowSnapshot};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type EngineResult<T> = Result<T, EngineError>;

/// Movement engine failures.
#[derive(Debug)]
pub enum EngineError {
    /// No carrier matches the requested code.
    CarrierNotFound(String),
    /// An equivalent movement already exists; carries its id.
    DuplicateMovement(MovementId),
    /// The carrier's finalization state forbids the transition.
    DocumentFinalized {
        code: String,
        reason: FinalizedReason,
    },
    /// No movement with this id.
    NotFound(MovementId),
    /// The carrier stayed busy past the configured wait. Retryable.
    Contention(String),
    Repo(RepoError),
}

impl EngineError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_))
    }

    fn from_rejection(rejection: Rejection, code: &str) -> Self {
        match rejection {
            Rejection::Duplicate(id) => Self::DuplicateMovement(id),
            Rejection::Finalized(reason) => Self::DocumentFinalized {
                code: code.to_string(),
                reason,
            },
        }
    }

    fn reason_code(&self) -> &'static str {
        match self {
            Self::CarrierNotFound(_) => "carrier_not_found",
            Self::DuplicateMovement(_) => "duplicate_movement",
            Self::DocumentFinalized { .. } => "document_finalized",
            Self::NotFound(_) => "movement_not_found",
            Self::Contention(_) => "contention",
            Self::Repo(_) => "repo_error",
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CarrierNotFound(code) => write!(f, "carrier not found: {code}"),
            Self::DuplicateMovement(id) => write!(f, "movement already exists: {id}"),
            Self::DocumentFinalized { code, reason } => write!(f, "carrier {code}: {reason}"),
            Self::NotFound(id) => write!(f, "movement not found: {id}"),
            Self::Contention(code) => {
                write!(f, "carrier {code} is busy with another transition; retry later")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Transition engine over an injected workflow store.
pub struct MovementEngine<S: WorkflowStore> {
    store: S,
    locks: Arc<CarrierLocks>,
    config: EngineConfig,
    clock: fn() -> i64,
}

impl<S: WorkflowStore> MovementEngine<S> {
    /// Creates an engine. Engines writing to the same database must share
    /// `locks`.
    pub fn new(store: S, locks: Arc<CarrierLocks>, config: EngineConfig) -> Self {
        Self {
            store,
            locks,
            config,
            clock: now_epoch_ms,
        }
    }

    /// Replaces the wall clock used for movement timestamps.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Signs the document on behalf of `signer`.
    ///
    /// # Errors
    /// - `DuplicateMovement` when `signer` already signed this carrier.
    /// - `DocumentFinalized` when the carrier is finalized.
    pub fn sign_with_password(
        &self,
        carrier_code: &str,
        signer: SubscriberId,
    ) -> EngineResult<Movement> {
        self.apply(carrier_code, Transition::SignWithPassword { signer })
    }

    /// Adds `recipient` as co-signatory.
    ///
    /// # Errors
    /// - `DuplicateMovement` when `recipient` is already a co-signatory.
    /// - `DocumentFinalized` when the carrier is finalized.
    pub fn add_cosignatory(
        &self,
        carrier_code: &str,
        signer: SubscriberId,
        recipient: PersonId,
    ) -> EngineResult<Movement> {
        self.apply(carrier_code, Transition::AddCosignatory { signer, recipient })
    }

    /// Transmits a finalized document to `recipient`.
    ///
    /// # Errors
    /// - `DuplicateMovement` when `recipient` is a co-signatory or was
    ///   already routed to.
    /// - `DocumentFinalized` when the carrier is not finalized yet.
    pub fn route(
        &self,
        carrier_code: &str,
        signer: SubscriberId,
        recipient: PersonId,
    ) -> EngineResult<Movement> {
        self.apply(carrier_code, Transition::Route { signer, recipient })
    }

    /// Closes the document to further co-signature.
    ///
    /// # Errors
    /// - `DuplicateMovement` when `signer` already signed this carrier, or the
    ///   carrier is already finalized.
    pub fn finalize(&self, carrier_code: &str, signer: SubscriberId) -> EngineResult<Movement> {
        self.apply(carrier_code, Transition::Finalize { signer })
    }

    /// Validates and commits one transition.
    pub fn apply(&self, carrier_code: &str, transition: Transition) -> EngineResult<Movement> {
        let started_at = Instant::now();
        let lock_key = carrier_lock_key(carrier_code);
        let result =
            self.with_carrier_lease(&lock_key, || self.apply_locked(carrier_code, transition));

        match &result {
            Ok(movement) => info!(
                "event=movement_create module=engine status=ok carrier={} kind={} movement_id={} duration_ms={}",
                lock_key,
                movement.kind.as_str(),
                movement.id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=movement_create module=engine status=rejected carrier={} kind={} reason={} duration_ms={}",
                lock_key,
                transition.kind().as_str(),
                err.reason_code(),
                started_at.elapsed().as_millis()
            ),
        }

        result
    }

    /// Resolves a carrier by code or status code.
    pub fn find_carrier(&self, carrier_code: &str) -> EngineResult<Carrier> {
        self.store
            .find_by_code(carrier_code)?
            .ok_or_else(|| EngineError::CarrierNotFound(normalize_carrier_code(carrier_code)))
    }

    pub fn lookup_by_id(&self, id: MovementId) -> EngineResult<Movement> {
        self.store.find_by_id(id)?.ok_or(EngineError::NotFound(id))
    }

    /// Lists movements matching `filter`.
    pub fn list(&self, filter: &MovementFilter, page: PageRequest) -> EngineResult<Page<Movement>> {
        let page = page.normalized(self.config.page_limits());
        Ok(self.store.query(filter, &page)?)
    }

    /// Lists one carrier's movements in insertion order.
    pub fn list_by_carrier(
        &self,
        carrier_id: CarrierId,
        page: PageRequest,
    ) -> EngineResult<Page<Movement>> {
        let page = page.normalized(self.config.page_limits());
        Ok(self.store.query_by_carrier(carrier_id, &page)?)
    }

    /// Marks a movement cancelled and refreshes its carrier's projection.
    ///
    /// Cancelling an already cancelled movement returns it unchanged.
    pub fn cancel_movement(&self, id: MovementId) -> EngineResult<Movement> {
        let movement = self.lookup_by_id(id)?;
        if movement.cancelled {
            return Ok(movement);
        }

        let carrier = self.store.get_carrier(movement.carrier_id)?.ok_or_else(|| {
            EngineError::Repo(RepoError::InvalidData(format!(
                "movement {id} references missing carrier {}",
                movement.carrier_id
            )))
        })?;
        let lock_key = carrier.code.clone();

        let cancelled = self.with_carrier_lease(&lock_key, || {
            self.store.atomically(|| {
                self.store.set_cancelled(id, true)?;
                let mut carrier = self.find_carrier(&lock_key)?;
                carrier.refresh_projection();
                self.store.save(&carrier)?;
                self.lookup_by_id(id)
            })
        })?;

        info!(
            "event=movement_cancel module=engine status=ok carrier={} movement_id={}",
            lock_key, id
        );
        Ok(cancelled)
    }

    fn apply_locked(&self, carrier_code: &str, transition: Transition) -> EngineResult<Movement> {
        self.store.atomically(|| {
            let mut carrier = self.find_carrier(carrier_code)?;
            let snapshot = WorkflowSnapshot::from_movements(&carrier.movements);
            check_transition(&snapshot, transition)
                .map_err(|rejection| EngineError::from_rejection(rejection, &carrier.code))?;

            let movement = self.store.insert(&NewMovement {
                kind: transition.kind(),
                subscriber_id: transition.signer(),
                recipient_id: transition.recipient(),
                carrier_id: carrier.id,
                timestamp_ms: carrier.next_timestamp((self.clock)()),
            })?;

            carrier.record(movement.clone());
            self.store.save(&carrier)?;
            Ok(movement)
        })
    }

    fn with_carrier_lease<T>(
        &self,
        lock_key: &str,
        op: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let _lease = self
            .locks
            .acquire(lock_key, self.config.lock_timeout())
            .map_err(|timeout| EngineError::Contention(timeout.key))?;

        op().map_err(|err| match err {
            EngineError::Repo(RepoError::Busy) => EngineError::Contention(lock_key.to_string()),
            other => other,
        })
    }
}

/// Lease key for a carrier reference: the stable code, so `M-100` and
/// `M-100/FIN` share one lease.
fn carrier_lock_key(carrier_code: &str) -> String {
    base_carrier_code(&normalize_carrier_code(carrier_code)).to_string()
}

#[cfg(test)]
mod tests {
    use super::{carrier_lock_key, EngineError};
    use crate::repo::RepoError;

    #[test]
    fn lock_key_strips_status_suffix() {
        assert_eq!(carrier_lock_key(" m-100 "), "M-100");
        assert_eq!(carrier_lock_key("M-100/FIN"), "M-100");
        assert_eq!(carrier_lock_key("m-100/new"), "M-100");
        assert_eq!(carrier_lock_key("M-100/XYZ"), "M-100/XYZ");
    }

    #[test]
    fn only_contention_is_retryable() {
        assert!(EngineError::Contention("M-100".into()).is_retryable());
        assert!(!EngineError::DuplicateMovement(1).is_retryable());
        assert!(!EngineError::Repo(RepoError::Busy).is_retryable());
    }
}
