//! Transition gating rules.
//!
//! # Invariants
//! - SIGN: a signer signs once; nothing but ROUTE follows a finalization.
//! - ADD_COSIGNATORY: one inclusion per recipient; closed after finalization.
//! - ROUTE: the recipient must not already be a co-signatory, the carrier must
//!   be finalized, and one routing per recipient.
//! - FINALIZE: the finalizer must not have signed; one finalization per
//!   carrier.
//! - Checks run in the order listed above and the first failure wins.

use super::state::WorkflowSnapshot;
use crate::model::movement::{MovementId, MovementKind};
use crate::model::{PersonId, SubscriberId};
use std::fmt::{Display, Formatter};

/// Requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SignWithPassword {
        signer: SubscriberId,
    },
    AddCosignatory {
        signer: SubscriberId,
        recipient: PersonId,
    },
    Route {
        signer: SubscriberId,
        recipient: PersonId,
    },
    Finalize {
        signer: SubscriberId,
    },
}

impl Transition {
    pub fn kind(self) -> MovementKind {
        match self {
            Self::SignWithPassword { .. } => MovementKind::SignWithPassword,
            Self::AddCosignatory { .. } => MovementKind::AddCosignatory,
            Self::Route { .. } => MovementKind::Route,
            Self::Finalize { .. } => MovementKind::Finalize,
        }
    }

    pub fn signer(self) -> SubscriberId {
        match self {
            Self::SignWithPassword { signer }
            | Self::AddCosignatory { signer, .. }
            | Self::Route { signer, .. }
            | Self::Finalize { signer } => signer,
        }
    }

    pub fn recipient(self) -> Option<PersonId> {
        match self {
            Self::AddCosignatory { recipient, .. } | Self::Route { recipient, .. } => {
                Some(recipient)
            }
            Self::SignWithPassword { .. } | Self::Finalize { .. } => None,
        }
    }
}

/// Why a finalize-gated transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizedReason {
    /// The carrier is finalized and the transition needs it open.
    AlreadyFinalized,
    /// The transition needs a finalized carrier.
    NotFinalized,
}

impl Display for FinalizedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyFinalized => write!(f, "document is already finalized"),
            Self::NotFinalized => write!(f, "document must be finalized first"),
        }
    }
}

/// Reason a transition is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// An equivalent movement already exists.
    Duplicate(MovementId),
    Finalized(FinalizedReason),
}

/// Decides whether `transition` may be applied on top of `snapshot`.
pub fn check_transition(
    snapshot: &WorkflowSnapshot,
    transition: Transition,
) -> Result<(), Rejection> {
    let finalized = snapshot.finalization().is_some();
    match transition {
        Transition::SignWithPassword { signer } => {
            reject_existing(snapshot.signature_by(signer))?;
            if finalized {
                return Err(Rejection::Finalized(FinalizedReason::AlreadyFinalized));
            }
        }
        Transition::AddCosignatory { recipient, .. } => {
            reject_existing(snapshot.cosignatory(recipient))?;
            if finalized {
                return Err(Rejection::Finalized(FinalizedReason::AlreadyFinalized));
            }
        }
        Transition::Route { recipient, .. } => {
            reject_existing(snapshot.cosignatory(recipient))?;
            if !finalized {
                return Err(Rejection::Finalized(FinalizedReason::NotFinalized));
            }
            reject_existing(snapshot.routing_to(recipient))?;
        }
        Transition::Finalize { signer } => {
            reject_existing(snapshot.signature_by(signer))?;
            reject_existing(snapshot.finalization())?;
        }
    }
    Ok(())
}

fn reject_existing(existing: Option<MovementId>) -> Result<(), Rejection> {
    match existing {
        Some(id) => Err(Rejection::Duplicate(id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_transition, FinalizedReason, Rejection, Transition};
    use crate::model::movement::{Movement, MovementKind};
    use crate::workflow::WorkflowSnapshot;

    fn movement(
        id: i64,
        kind: MovementKind,
        subscriber_id: i64,
        recipient_id: Option<i64>,
    ) -> Movement {
        Movement {
            id,
            kind,
            subscriber_id,
            recipient_id,
            carrier_id: 1,
            timestamp_ms: id,
            cancelled: false,
        }
    }

    fn snapshot(history: &[Movement]) -> WorkflowSnapshot {
        WorkflowSnapshot::from_movements(history)
    }

    #[test]
    fn untouched_carrier_accepts_sign_cosign_and_finalize() {
        let empty = snapshot(&[]);
        assert!(check_transition(&empty, Transition::SignWithPassword { signer: 7 }).is_ok());
        assert!(check_transition(
            &empty,
            Transition::AddCosignatory {
                signer: 7,
                recipient: 9
            }
        )
        .is_ok());
        assert!(check_transition(&empty, Transition::Finalize { signer: 7 }).is_ok());
    }

    #[test]
    fn second_signature_by_same_signer_is_duplicate() {
        let history = [
            movement(4, MovementKind::SignWithPassword, 7, None),
            movement(5, MovementKind::AddCosignatory, 3, Some(9)),
        ];
        assert_eq!(
            check_transition(&snapshot(&history), Transition::SignWithPassword { signer: 7 }),
            Err(Rejection::Duplicate(4))
        );
        assert!(
            check_transition(&snapshot(&history), Transition::SignWithPassword { signer: 8 })
                .is_ok()
        );
    }

    #[test]
    fn signing_after_finalization_is_refused() {
        let history = [movement(1, MovementKind::Finalize, 3, None)];
        assert_eq!(
            check_transition(&snapshot(&history), Transition::SignWithPassword { signer: 7 }),
            Err(Rejection::Finalized(FinalizedReason::AlreadyFinalized))
        );
    }

    #[test]
    fn cosignatory_checks_duplicate_before_finalization() {
        let history = [
            movement(1, MovementKind::AddCosignatory, 3, Some(9)),
            movement(2, MovementKind::Finalize, 3, None),
        ];
        let request = Transition::AddCosignatory {
            signer: 3,
            recipient: 9,
        };
        assert_eq!(
            check_transition(&snapshot(&history), request),
            Err(Rejection::Duplicate(1))
        );

        let other = Transition::AddCosignatory {
            signer: 3,
            recipient: 10,
        };
        assert_eq!(
            check_transition(&snapshot(&history), other),
            Err(Rejection::Finalized(FinalizedReason::AlreadyFinalized))
        );
    }

    #[test]
    fn routing_requires_finalization() {
        let request = Transition::Route {
            signer: 3,
            recipient: 9,
        };
        assert_eq!(
            check_transition(&snapshot(&[]), request),
            Err(Rejection::Finalized(FinalizedReason::NotFinalized))
        );

        let finalized = [movement(1, MovementKind::Finalize, 3, None)];
        assert!(check_transition(&snapshot(&finalized), request).is_ok());
    }

    #[test]
    fn routing_to_existing_cosignatory_or_twice_is_duplicate() {
        let history = [
            movement(1, MovementKind::AddCosignatory, 3, Some(9)),
            movement(2, MovementKind::Finalize, 3, None),
            movement(3, MovementKind::Route, 3, Some(11)),
        ];
        let to_cosignatory = Transition::Route {
            signer: 3,
            recipient: 9,
        };
        assert_eq!(
            check_transition(&snapshot(&history), to_cosignatory),
            Err(Rejection::Duplicate(1))
        );

        let again = Transition::Route {
            signer: 3,
            recipient: 11,
        };
        assert_eq!(
            check_transition(&snapshot(&history), again),
            Err(Rejection::Duplicate(3))
        );
    }

    #[test]
    fn finalize_rejects_prior_signature_by_finalizer() {
        let history = [movement(6, MovementKind::SignWithPassword, 7, None)];
        assert_eq!(
            check_transition(&snapshot(&history), Transition::Finalize { signer: 7 }),
            Err(Rejection::Duplicate(6))
        );
        assert!(check_transition(&snapshot(&history), Transition::Finalize { signer: 8 }).is_ok());
    }

    #[test]
    fn finalize_twice_reports_existing_finalization() {
        let history = [movement(2, MovementKind::Finalize, 7, None)];
        assert_eq!(
            check_transition(&snapshot(&history), Transition::Finalize { signer: 3 }),
            Err(Rejection::Duplicate(2))
        );
    }

    #[test]
    fn transition_accessors_match_kind() {
        let route = Transition::Route {
            signer: 3,
            recipient: 9,
        };
        assert_eq!(route.kind(), MovementKind::Route);
        assert_eq!(route.signer(), 3);
        assert_eq!(route.recipient(), Some(9));
        assert_eq!(Transition::Finalize { signer: 3 }.recipient(), None);
    }
}
