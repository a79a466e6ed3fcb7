//! Workflow state derivation.

use crate::model::movement::{Movement, MovementId, MovementKind};
use crate::model::{PersonId, SubscriberId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse workflow position of a carrier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Untouched,
    Signed,
    Cosigned,
    Finalized,
    Routed,
}

impl WorkflowState {
    /// Short tag used in carrier status codes.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::Untouched => "NEW",
            Self::Signed => "SIG",
            Self::Cosigned => "COS",
            Self::Finalized => "FIN",
            Self::Routed => "RTD",
        }
    }

    /// Inverse of `abbreviation`.
    pub fn from_abbreviation(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(Self::Untouched),
            "SIG" => Some(Self::Signed),
            "COS" => Some(Self::Cosigned),
            "FIN" => Some(Self::Finalized),
            "RTD" => Some(Self::Routed),
            _ => None,
        }
    }

    pub fn is_finalized(self) -> bool {
        matches!(self, Self::Finalized | Self::Routed)
    }
}

/// Derives the workflow state from active movements.
///
/// Precedence: `Routed > Finalized > Cosigned > Signed > Untouched`.
pub fn derive_state(movements: &[Movement]) -> WorkflowState {
    let mut state = WorkflowState::Untouched;
    for movement in movements.iter().filter(|movement| movement.is_active()) {
        let candidate = match movement.kind {
            MovementKind::SignWithPassword => WorkflowState::Signed,
            MovementKind::AddCosignatory => WorkflowState::Cosigned,
            MovementKind::Finalize => WorkflowState::Finalized,
            MovementKind::Route => WorkflowState::Routed,
        };
        state = state.max(candidate);
    }
    state
}

/// Indexed view over a carrier's active movements.
///
/// Each index keeps the first movement that matched, which is the one a
/// duplicate check reports back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    state: WorkflowState,
    signatures: BTreeMap<SubscriberId, MovementId>,
    cosignatories: BTreeMap<PersonId, MovementId>,
    routings: BTreeMap<PersonId, MovementId>,
    finalization: Option<MovementId>,
}

impl WorkflowSnapshot {
    pub fn from_movements(movements: &[Movement]) -> Self {
        let mut snapshot = Self {
            state: derive_state(movements),
            ..Self::default()
        };

        for movement in movements.iter().filter(|movement| movement.is_active()) {
            match (movement.kind, movement.recipient_id) {
                (MovementKind::SignWithPassword, _) => {
                    snapshot
                        .signatures
                        .entry(movement.subscriber_id)
                        .or_insert(movement.id);
                }
                (MovementKind::AddCosignatory, Some(recipient)) => {
                    snapshot.cosignatories.entry(recipient).or_insert(movement.id);
                }
                (MovementKind::Route, Some(recipient)) => {
                    snapshot.routings.entry(recipient).or_insert(movement.id);
                }
                (MovementKind::Finalize, _) => {
                    snapshot.finalization.get_or_insert(movement.id);
                }
                // Rows without a recipient are rejected by validation on read.
                (MovementKind::AddCosignatory | MovementKind::Route, None) => {}
            }
        }

        snapshot
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Signature movement made by `signer`, if any.
    pub fn signature_by(&self, signer: SubscriberId) -> Option<MovementId> {
        self.signatures.get(&signer).copied()
    }

    /// Co-signatory inclusion naming `recipient`, if any.
    pub fn cosignatory(&self, recipient: PersonId) -> Option<MovementId> {
        self.cosignatories.get(&recipient).copied()
    }

    /// Routing to `recipient`, if any.
    pub fn routing_to(&self, recipient: PersonId) -> Option<MovementId> {
        self.routings.get(&recipient).copied()
    }

    /// First finalization movement, if any.
    pub fn finalization(&self) -> Option<MovementId> {
        self.finalization
    }
}
