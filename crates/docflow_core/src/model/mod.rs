//! Domain model for documents, carriers and their movement history.
//!
//! # Responsibility
//! - Define canonical data structures used by the movement engine.
//! - Keep the carrier projection (`status_code`, marks) recomputable from
//!   its movement history alone.
//!
//! # Invariants
//! - Movements are append-only facts; only `cancelled` may change later.
//! - A carrier owns its movements; a movement only references its carrier id.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod carrier;
pub mod document;
pub mod movement;

/// Identifier of a party that signs or acts on a document.
pub type SubscriberId = i64;

/// Identifier of a party that receives a document or a co-signature request.
pub type PersonId = i64;

/// Validation failures for domain records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Movement kind requires a recipient that was not provided.
    MissingRecipient(movement::MovementKind),
    /// Movement kind does not accept a recipient.
    UnexpectedRecipient(movement::MovementKind),
    /// Carrier code does not match the accepted format.
    InvalidCarrierCode(String),
    /// Document title is blank after trim.
    BlankTitle,
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRecipient(kind) => {
                write!(f, "movement `{}` requires a recipient", kind.as_str())
            }
            Self::UnexpectedRecipient(kind) => {
                write!(f, "movement `{}` does not accept a recipient", kind.as_str())
            }
            Self::InvalidCarrierCode(code) => write!(f, "invalid carrier code `{code}`"),
            Self::BlankTitle => write!(f, "document title must not be blank"),
        }
    }
}

impl Error for ModelValidationError {}

/// Current wall clock in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
