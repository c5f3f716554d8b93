use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::info;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            audit_log::{AuditAction, AuditLog},
            document::{Document, DocumentStatus},
        },
        vector::{ChunkUpsert, VectorStore},
    },
    utils::embedding::EmbeddingClient,
};

use crate::{
    chunking::{chunk_text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP},
    resource::ProgressFn,
    text_extraction::extract_text,
};

/// Vector collection for one document's chunks.
pub fn document_collection_name(document_id: &str) -> String {
    format!("doc_{}", document_id.replace('-', "_"))
}

/// Drives an uploaded document through text extraction, chunking and
/// embedding.
pub struct DocumentProcessor {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    embedder: EmbeddingClient,
}

impl DocumentProcessor {
    pub fn new(db: Arc<SurrealDbClient>, storage: StorageManager, embedder: EmbeddingClient) -> Self {
        Self {
            db,
            storage,
            embedder,
        }
    }

    pub async fn process(&self, document_id: &str, progress: ProgressFn) -> Result<(), AppError> {
        AuditLog::record_started(AuditAction::ProcessDocument, &self.db).await?;
        let started = Instant::now();

        match self.run(document_id, &progress).await {
            Ok(chunk_count) => {
                AuditLog::record_completed(
                    AuditAction::ProcessDocument,
                    serde_json::json!({ "chunks": chunk_count }),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Ok(())
            }
            Err(err) => {
                Document::mark_error(document_id, &err.to_string(), &self.db).await?;
                AuditLog::record_failed(
                    AuditAction::ProcessDocument,
                    &err.to_string(),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run(&self, document_id: &str, progress: &ProgressFn) -> Result<usize, AppError> {
        let document = Document::get(document_id, &self.db).await?;

        Document::set_status(document_id, DocumentStatus::Extracting, &self.db).await?;
        progress(10);

        let bytes = self.storage.get(&document.storage_location()).await?;
        let text = extract_text(&bytes, &document.mime_type, &document.filename)?;
        Document::set_extracted_text(document_id, &text, &self.db).await?;
        progress(30);

        Document::set_status(document_id, DocumentStatus::Chunking, &self.db).await?;
        let mut metadata = serde_json::Map::new();
        metadata.insert("document_id".into(), Value::from(document_id));
        metadata.insert("filename".into(), Value::from(document.filename.clone()));

        let chunks = chunk_text(&text, &metadata, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)?;
        Document::set_chunked(document_id, chunks.len() as i64, &self.db).await?;
        progress(50);

        Document::set_status(document_id, DocumentStatus::Embedding, &self.db).await?;
        progress(80);

        let collection = document_collection_name(document_id);
        let upserts: Vec<ChunkUpsert> = chunks
            .iter()
            .map(|chunk| ChunkUpsert {
                text: chunk.text.clone(),
                payload: serde_json::json!({
                    "text": chunk.text,
                    "document_id": document_id,
                    "metadata": chunk.metadata,
                }),
            })
            .collect();

        let outcome = VectorStore::store_chunks(
            &collection,
            upserts,
            &self.embedder,
            &self.db,
            |batch, total| {
                tracing::debug!(%document_id, batch, total, "Embedding batch stored");
            },
        )
        .await?;

        Document::mark_embedded(document_id, &collection, &self.db).await?;
        progress(100);

        info!(%document_id, chunks = outcome.stored, "Document processed");
        Ok(outcome.stored)
    }
}
