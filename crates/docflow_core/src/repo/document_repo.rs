//! Document repository contract and SQLite implementation.

use super::sqlite::SqliteWorkflowStore;
use super::{RepoError, RepoResult};
use crate::model::document::{Document, DocumentId};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

/// Registered document persistence.
pub trait DocumentRepository {
    fn insert_document(&self, document: &Document) -> RepoResult<DocumentId>;
    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>>;
}

impl DocumentRepository for SqliteWorkflowStore<'_> {
    fn insert_document(&self, document: &Document) -> RepoResult<DocumentId> {
        self.conn.execute(
            "INSERT INTO documents (
                uuid,
                subscriber_id,
                title,
                content,
                carrier_id,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                document.id.to_string(),
                document.subscriber_id,
                document.title.as_str(),
                document.content.as_str(),
                document.carrier_id,
                document.created_at_ms,
            ],
        )?;
        Ok(document.id)
    }

    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        let row = self
            .conn
            .query_row(
                "SELECT uuid, subscriber_id, title, content, carrier_id, created_at
                 FROM documents
                 WHERE uuid = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((uuid_text, subscriber_id, title, content, carrier_id, created_at_ms)) = row else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&uuid_text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in documents.uuid"))
        })?;

        Ok(Some(Document {
            id,
            subscriber_id,
            title,
            content,
            carrier_id,
            created_at_ms,
        }))
    }
}
