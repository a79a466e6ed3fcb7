//! Document registration use-case service.
//!
//! # Responsibility
//! - Persist a submitted document together with its carrier.
//! - Announce the stored document on the `document-created` topic.
//!
//! # Invariants
//! - Document and carrier rows commit together or not at all.
//! - Publishing happens after commit; its failure is logged and never undoes
//!   the registration.

use crate::events::{EventPublisher, DOCUMENT_CREATED_TOPIC};
use crate::model::carrier::NewCarrier;
use crate::model::document::{Document, DocumentId, DocumentRepresentation, DocumentSubmission};
use crate::model::{now_epoch_ms, ModelValidationError, SubscriberId};
use crate::repo::document_repo::DocumentRepository;
use crate::repo::{RepoError, WorkflowStore};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const GENERATED_CODE_PREFIX: &str = "DOC";

/// Errors from document registration.
#[derive(Debug)]
pub enum DocumentServiceError {
    Validation(ModelValidationError),
    /// Requested carrier code is already registered.
    CarrierCodeTaken(String),
    Repo(RepoError),
}

impl Display for DocumentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::CarrierCodeTaken(code) => write!(f, "carrier code already registered: {code}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocumentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::CarrierCodeTaken(_) => None,
        }
    }
}

impl From<RepoError> for DocumentServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::CarrierCodeTaken(code) => Self::CarrierCodeTaken(code),
            other => Self::Repo(other),
        }
    }
}

impl From<ModelValidationError> for DocumentServiceError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Outcome status of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    Created,
}

/// Stored representation plus creation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub document: DocumentRepresentation,
    pub status: CreationStatus,
    /// Whether the `document-created` event was accepted by the publisher.
    pub published: bool,
}

/// Registration facade over a workflow store and an event publisher.
pub struct DocumentService<S, P>
where
    S: WorkflowStore + DocumentRepository,
    P: EventPublisher,
{
    store: S,
    publisher: P,
}

impl<S, P> DocumentService<S, P>
where
    S: WorkflowStore + DocumentRepository,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Registers one document for `subscriber_id`.
    ///
    /// Generates a `DOC-<n>` carrier code when the submission has none.
    pub fn register(
        &self,
        submission: &DocumentSubmission,
        subscriber_id: SubscriberId,
    ) -> Result<Registration, DocumentServiceError> {
        submission.validate()?;

        let (document, carrier) = self.store.atomically(|| {
            let code = match submission.carrier_code.as_deref() {
                Some(code) => code.to_string(),
                None => self.generated_carrier_code()?,
            };
            let carrier = self.store.create(&NewCarrier::new(&code)?)?;
            let document = Document {
                id: Uuid::new_v4(),
                subscriber_id,
                title: submission.title.trim().to_string(),
                content: submission.content.clone(),
                carrier_id: carrier.id,
                created_at_ms: now_epoch_ms(),
            };
            self.store.insert_document(&document)?;
            Ok::<_, DocumentServiceError>((document, carrier))
        })?;

        let representation = DocumentRepresentation::from_parts(&document, &carrier);
        info!(
            "event=document_register module=document status=ok document_id={} carrier={}",
            representation.id, representation.carrier_code
        );

        let published = match self.publisher.publish(DOCUMENT_CREATED_TOPIC, &representation) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=document_publish module=document status=error document_id={} topic={} error={}",
                    representation.id, DOCUMENT_CREATED_TOPIC, err
                );
                false
            }
        };

        Ok(Registration {
            document: representation,
            status: CreationStatus::Created,
            published,
        })
    }

    /// First free `DOC-<n>` code at or after the store's suggestion; explicit
    /// registrations may already hold some of those numbers.
    fn generated_carrier_code(&self) -> Result<String, RepoError> {
        let mut number = self.store.next_carrier_number()?;
        loop {
            let code = format!("{GENERATED_CODE_PREFIX}-{number}");
            if self.store.find_by_code(&code)?.is_none() {
                return Ok(code);
            }
            number += 1;
        }
    }

    /// Loads a registered document with its carrier's current status.
    pub fn get(
        &self,
        id: DocumentId,
    ) -> Result<Option<DocumentRepresentation>, DocumentServiceError> {
        let Some(document) = self.store.get_document(id)? else {
            return Ok(None);
        };
        let carrier = self.store.get_carrier(document.carrier_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "document {id} references missing carrier {}",
                document.carrier_id
            ))
        })?;
        Ok(Some(DocumentRepresentation::from_parts(&document, &carrier)))
    }
}
