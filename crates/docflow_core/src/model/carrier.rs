//! Carrier ("mobil") domain model.
//!
//! # Responsibility
//! - Hold one carrier's ordered movement history.
//! - Derive the cached `status_code` and marks from that history.
//!
//! # Invariants
//! - `movements` is in insertion (chronological) order.
//! - `status_code` and `marks` always equal `derive_status_code` and
//!   `derive_marks` over `movements`; `record` and `refresh_projection` are the
//!   only places that rewrite them.
//! - `code` is stable for the carrier lifetime and is the primary lookup key.

use super::movement::{Movement, MovementKind};
use super::ModelValidationError;
use crate::workflow::{derive_state, WorkflowState};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Storage-assigned carrier identifier.
pub type CarrierId = i64;

static CARRIER_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]{0,9}-[0-9]{1,12}$").expect("valid code regex"));

/// Pending-work tag assigned to a carrier by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    PendingSignature,
    PendingCosignatory,
    PendingTransmission,
    PendingFinalization,
}

impl MarkKind {
    /// Mark assigned by a transition of the given kind.
    pub fn for_movement(kind: MovementKind) -> Self {
        match kind {
            MovementKind::SignWithPassword => Self::PendingSignature,
            MovementKind::AddCosignatory => Self::PendingCosignatory,
            MovementKind::Route => Self::PendingTransmission,
            MovementKind::Finalize => Self::PendingFinalization,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingSignature => "pending_signature",
            Self::PendingCosignatory => "pending_cosignatory",
            Self::PendingTransmission => "pending_transmission",
            Self::PendingFinalization => "pending_finalization",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_signature" => Some(Self::PendingSignature),
            "pending_cosignatory" => Some(Self::PendingCosignatory),
            "pending_transmission" => Some(Self::PendingTransmission),
            "pending_finalization" => Some(Self::PendingFinalization),
            _ => None,
        }
    }
}

/// Workflow unit a document travels through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: CarrierId,
    /// Stable human-readable code, e.g. `M-100`.
    pub code: String,
    /// Cached projection of `movements`, e.g. `M-100/FIN`.
    pub status_code: String,
    /// Cached projection of `movements`.
    pub marks: BTreeSet<MarkKind>,
    pub movements: Vec<Movement>,
}

impl Carrier {
    /// Creates a carrier with the given history and a fresh projection.
    pub fn new(id: CarrierId, code: impl Into<String>, movements: Vec<Movement>) -> Self {
        let mut carrier = Self {
            id,
            code: code.into(),
            status_code: String::new(),
            marks: BTreeSet::new(),
            movements,
        };
        carrier.refresh_projection();
        carrier
    }

    /// Appends one committed movement and recomputes the projection.
    pub fn record(&mut self, movement: Movement) {
        self.movements.push(movement);
        self.refresh_projection();
    }

    /// Recomputes `status_code` and `marks` from the movement history.
    pub fn refresh_projection(&mut self) {
        self.status_code = derive_status_code(&self.code, &self.movements);
        self.marks = derive_marks(&self.movements);
    }

    /// Whether the cached projection matches the movement history.
    pub fn is_projection_current(&self) -> bool {
        self.status_code == derive_status_code(&self.code, &self.movements)
            && self.marks == derive_marks(&self.movements)
    }

    pub fn active_movements(&self) -> impl Iterator<Item = &Movement> {
        self.movements.iter().filter(|movement| movement.is_active())
    }

    pub fn state(&self) -> WorkflowState {
        derive_state(&self.movements)
    }

    /// Timestamp for the next movement: `now_ms`, clamped so it never falls
    /// behind the latest recorded movement.
    pub fn next_timestamp(&self, now_ms: i64) -> i64 {
        self.movements
            .iter()
            .map(|movement| movement.timestamp_ms)
            .max()
            .map_or(now_ms, |latest| latest.max(now_ms))
    }
}

/// Carrier creation input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCarrier {
    pub code: String,
}

impl NewCarrier {
    /// Normalizes and validates a carrier code.
    pub fn new(code: &str) -> Result<Self, ModelValidationError> {
        let normalized = normalize_carrier_code(code);
        if !CARRIER_CODE_RE.is_match(&normalized) {
            return Err(ModelValidationError::InvalidCarrierCode(code.to_string()));
        }
        Ok(Self { code: normalized })
    }
}

/// Normalizes lookup input: trimmed, upper-case.
pub fn normalize_carrier_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Stable code behind a normalized carrier reference.
///
/// `M-100/FIN` and `M-100/SIG` both yield `M-100`; references without a
/// known state suffix come back unchanged.
pub fn base_carrier_code(reference: &str) -> &str {
    match reference.rsplit_once('/') {
        Some((code, suffix)) if WorkflowState::from_abbreviation(suffix).is_some() => code,
        _ => reference,
    }
}

/// Status code for a carrier: `{code}/{state abbreviation}`.
pub fn derive_status_code(code: &str, movements: &[Movement]) -> String {
    format!("{code}/{}", derive_state(movements).abbreviation())
}

/// Marks assigned by the active movements of a carrier.
pub fn derive_marks(movements: &[Movement]) -> BTreeSet<MarkKind> {
    movements
        .iter()
        .filter(|movement| movement.is_active())
        .map(|movement| MarkKind::for_movement(movement.kind))
        .collect()
}
