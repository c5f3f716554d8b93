use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Maximum accepted upload size.
pub const MAX_DOCUMENT_BYTES: usize = 15 * 1024 * 1024;
/// Persisted extracted text is truncated to this many characters; the full
/// text is still chunked and embedded.
pub const MAX_PERSISTED_TEXT_CHARS: usize = 65_000;

/// Document processing pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Extracting,
    Extracted,
    Chunking,
    Chunked,
    Embedding,
    Embedded,
    Error,
}

impl DocumentStatus {
    pub fn order(&self) -> Option<u8> {
        match self {
            DocumentStatus::Uploaded => Some(0),
            DocumentStatus::Extracting => Some(1),
            DocumentStatus::Extracted => Some(2),
            DocumentStatus::Chunking => Some(3),
            DocumentStatus::Chunked => Some(4),
            DocumentStatus::Embedding => Some(5),
            DocumentStatus::Embedded => Some(6),
            DocumentStatus::Error => None,
        }
    }
}

stored_object!(Document, "document", {
    user_id: String,
    filename: String,
    mime_type: String,
    size: i64,
    status: DocumentStatus,
    text_content: Option<String>,
    chunk_count: Option<i64>,
    collection_name: Option<String>,
    error_message: Option<String>
});

impl Document {
    pub fn new(user_id: String, filename: String, mime_type: String, size: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            filename,
            mime_type,
            size,
            status: DocumentStatus::Uploaded,
            text_content: None,
            chunk_count: None,
            collection_name: None,
            error_message: None,
        }
    }

    /// Object-store location of the uploaded bytes.
    pub fn storage_location(&self) -> String {
        format!("documents/{}/{}", self.id, self.filename)
    }

    pub async fn set_status(
        id: &str,
        status: DocumentStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('document', $id) SET
                     status = $status,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("status", status))
            .await?
            .check()?;

        Ok(())
    }

    /// Persist the extracted text, truncated to the storage cap.
    pub async fn set_extracted_text(
        id: &str,
        text: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let truncated: String = text.chars().take(MAX_PERSISTED_TEXT_CHARS).collect();

        db.client
            .query(
                "UPDATE type::thing('document', $id) SET
                     text_content = $text,
                     status = $status,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("text", truncated))
            .bind(("status", DocumentStatus::Extracted))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn set_chunked(
        id: &str,
        chunk_count: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('document', $id) SET
                     chunk_count = $chunk_count,
                     status = $status,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("chunk_count", chunk_count))
            .bind(("status", DocumentStatus::Chunked))
            .await?
            .check()?;

        Ok(())
    }

    /// Terminal success: embeddings persisted to the named collection.
    pub async fn mark_embedded(
        id: &str,
        collection_name: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('document', $id) SET
                     collection_name = $collection_name,
                     status = $status,
                     error_message = NONE,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("collection_name", collection_name.to_owned()))
            .bind(("status", DocumentStatus::Embedded))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn mark_error(
        id: &str,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('document', $id) SET
                     status = $status,
                     error_message = $message,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("status", DocumentStatus::Error))
            .bind(("message", message.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Document, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Document>, AppError> {
        let rows: Vec<Document> = db
            .client
            .query(
                "SELECT * FROM document WHERE user_id = $user_id ORDER BY created_at DESC",
            )
            .bind(("user_id", user_id.to_owned()))
            .await?
            .take(0)?;

        Ok(rows)
    }
}
