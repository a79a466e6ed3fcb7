//! Movement domain model.
//!
//! # Responsibility
//! - Define the immutable record of one lifecycle transition on a carrier.
//! - Enforce the recipient shape required by each movement kind.
//!
//! # Invariants
//! - `ADD_COSIGNATORY` and `ROUTE` always carry a recipient.
//! - `SIGN_WITH_PASSWORD` and `FINALIZE` never carry a recipient.
//! - `timestamp_ms` is non-decreasing within one carrier.

use super::carrier::CarrierId;
use super::{ModelValidationError, PersonId, SubscriberId};
use serde::{Deserialize, Serialize};

/// Ledger-assigned movement identifier.
pub type MovementId = i64;

/// Lifecycle transition recorded by a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Signer approved the document with their password.
    SignWithPassword,
    /// A co-signatory was added to the document.
    AddCosignatory,
    /// A finalized document was transmitted to a recipient.
    Route,
    /// Document content was closed to further co-signature.
    Finalize,
}

impl MovementKind {
    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignWithPassword => "sign_with_password",
            Self::AddCosignatory => "add_cosignatory",
            Self::Route => "route",
            Self::Finalize => "finalize",
        }
    }

    /// Parses a stable storage/wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sign_with_password" => Some(Self::SignWithPassword),
            "add_cosignatory" => Some(Self::AddCosignatory),
            "route" => Some(Self::Route),
            "finalize" => Some(Self::Finalize),
            _ => None,
        }
    }

    pub fn requires_recipient(self) -> bool {
        matches!(self, Self::AddCosignatory | Self::Route)
    }
}

/// Persisted movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub kind: MovementKind,
    /// Acting party.
    pub subscriber_id: SubscriberId,
    /// Receiving party for co-signature and routing.
    pub recipient_id: Option<PersonId>,
    /// Non-owning reference to the carrier this movement belongs to.
    pub carrier_id: CarrierId,
    /// Unix epoch milliseconds.
    pub timestamp_ms: i64,
    pub cancelled: bool,
}

impl Movement {
    /// Whether this movement still counts for workflow checks.
    pub fn is_active(&self) -> bool {
        !self.cancelled
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_recipient(self.kind, self.recipient_id)
    }
}

/// Movement fields known before the ledger assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub subscriber_id: SubscriberId,
    pub recipient_id: Option<PersonId>,
    pub carrier_id: CarrierId,
    pub timestamp_ms: i64,
}

impl NewMovement {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_recipient(self.kind, self.recipient_id)
    }

    /// Builds the persisted record once the ledger has assigned `id`.
    pub fn into_movement(self, id: MovementId) -> Movement {
        Movement {
            id,
            kind: self.kind,
            subscriber_id: self.subscriber_id,
            recipient_id: self.recipient_id,
            carrier_id: self.carrier_id,
            timestamp_ms: self.timestamp_ms,
            cancelled: false,
        }
    }
}

fn validate_recipient(
    kind: MovementKind,
    recipient_id: Option<PersonId>,
) -> Result<(), ModelValidationError> {
    match (kind.requires_recipient(), recipient_id) {
        (true, None) => Err(ModelValidationError::MissingRecipient(kind)),
        (false, Some(_)) => Err(ModelValidationError::UnexpectedRecipient(kind)),
        _ => Ok(()),
    }
}
