//! Document domain model.
//!
//! Documents are registered once and are immutable afterwards; the workflow
//! runs on the carrier created alongside them.

use super::carrier::{Carrier, CarrierId};
use super::{ModelValidationError, SubscriberId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable document identifier.
pub type DocumentId = Uuid;

/// Persisted document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owning subscriber who registered the document.
    pub subscriber_id: SubscriberId,
    pub title: String,
    /// Opaque to the workflow core.
    pub content: String,
    pub carrier_id: CarrierId,
    /// Unix epoch milliseconds.
    pub created_at_ms: i64,
}

/// Inbound registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    pub title: String,
    pub content: String,
    /// Carrier code to register under; generated when absent.
    #[serde(default)]
    pub carrier_code: Option<String>,
}

impl DocumentSubmission {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.title.trim().is_empty() {
            return Err(ModelValidationError::BlankTitle);
        }
        Ok(())
    }
}

/// Outbound representation returned to callers and published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRepresentation {
    pub id: DocumentId,
    pub subscriber_id: SubscriberId,
    pub title: String,
    pub content: String,
    pub carrier_code: String,
    pub status_code: String,
    pub created_at_ms: i64,
}

impl DocumentRepresentation {
    pub fn from_parts(document: &Document, carrier: &Carrier) -> Self {
        Self {
            id: document.id,
            subscriber_id: document.subscriber_id,
            title: document.title.clone(),
            content: document.content.clone(),
            carrier_code: carrier.code.clone(),
            status_code: carrier.status_code.clone(),
            created_at_ms: document.created_at_ms,
        }
    }
}
