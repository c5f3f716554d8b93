use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            audit_log::{AuditAction, AuditLog},
            graph_edge::GraphEdge,
            graph_node::GraphNode,
            resource::{Resource, ResourceStatus},
        },
        vector::{ChunkUpsert, VectorStore},
    },
    utils::{config::AppConfig, embedding::EmbeddingClient, slug::slug},
};

use crate::{
    chunking::{chunk_text, Chunk, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP},
    extractor::{EntityExtractor, ExtractionResult},
    stj_record::{from_stj_record, StjRecord},
};

/// Resource downloads get a generous timeout; the dumps are large.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Callback publishing handler progress percentages.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Vector collection for a dataset's chunks.
pub fn resource_collection_name(dataset_slug: &str) -> String {
    format!("stj_{}", slug(dataset_slug))
}

/// Drives one STJ resource through download, chunking, entity extraction,
/// graph upsert and embedding.
pub struct ResourceProcessor {
    db: Arc<SurrealDbClient>,
    embedder: EmbeddingClient,
    extractor: EntityExtractor,
    entity_chunk_cap: usize,
    http: reqwest::Client,
}

impl ResourceProcessor {
    pub fn new(
        db: Arc<SurrealDbClient>,
        extractor: EntityExtractor,
        embedder: EmbeddingClient,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            db,
            embedder,
            extractor,
            entity_chunk_cap: config.entity_chunk_cap,
            http,
        })
    }

    /// Process a resource end to end. On any failure the resource is marked
    /// `error` and the error re-raised so the job layer applies its retry
    /// policy.
    pub async fn process(&self, resource_id: &str, progress: ProgressFn) -> Result<(), AppError> {
        AuditLog::record_started(AuditAction::ProcessJson, &self.db).await?;
        let started = Instant::now();

        match self.run(resource_id, &progress).await {
            Ok((chunk_count, entity_count, relationship_count)) => {
                AuditLog::record_completed(
                    AuditAction::ProcessJson,
                    serde_json::json!({
                        "chunks": chunk_count,
                        "entities": entity_count,
                        "relationships": relationship_count,
                    }),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Ok(())
            }
            Err(err) => {
                Resource::mark_error(resource_id, &err.to_string(), &self.db).await?;
                AuditLog::record_failed(
                    AuditAction::ProcessJson,
                    &err.to_string(),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        resource_id: &str,
        progress: &ProgressFn,
    ) -> Result<(usize, usize, usize), AppError> {
        let resource = Resource::get(resource_id, &self.db).await?;

        Resource::set_status(resource_id, ResourceStatus::Downloading, &self.db).await?;
        progress(10);

        let body = self
            .http
            .get(&resource.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Resource::set_status(resource_id, ResourceStatus::Downloaded, &self.db).await?;
        progress(30);

        Resource::set_status(resource_id, ResourceStatus::Processing, &self.db).await?;
        let records = parse_records(&body)?;
        let chunks = chunk_records(&records, resource_id)?;
        info!(
            %resource_id,
            records = records.len(),
            chunks = chunks.len(),
            "Resource chunked"
        );

        Resource::set_status(resource_id, ResourceStatus::ExtractingEntities, &self.db).await?;
        progress(50);

        AuditLog::record_started(AuditAction::ExtractEntities, &self.db).await?;
        let extraction_started = Instant::now();
        let capped = &chunks[..chunks.len().min(self.entity_chunk_cap)];
        let extraction = self
            .extractor
            .extract_many(capped, |done, total| {
                tracing::debug!(%resource_id, done, total, "Entity extraction progress");
            })
            .await;
        let extraction = match extraction {
            Ok(extraction) => {
                AuditLog::record_completed(
                    AuditAction::ExtractEntities,
                    serde_json::json!({
                        "chunks": capped.len(),
                        "entities": extraction.entities.len(),
                        "relationships": extraction.relationships.len(),
                    }),
                    extraction_started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                extraction
            }
            Err(err) => {
                AuditLog::record_failed(
                    AuditAction::ExtractEntities,
                    &err.to_string(),
                    extraction_started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                return Err(err);
            }
        };

        self.store_graph(&extraction).await?;
        Resource::set_status(resource_id, ResourceStatus::EntitiesExtracted, &self.db).await?;

        Resource::set_status(resource_id, ResourceStatus::Embedding, &self.db).await?;
        progress(80);
        AuditLog::record_started(AuditAction::GenerateEmbeddings, &self.db).await?;
        let embedding_started = Instant::now();

        let collection = resource_collection_name(&resource.dataset_id);
        let upserts: Vec<ChunkUpsert> = chunks
            .iter()
            .map(|chunk| ChunkUpsert {
                text: chunk.text.clone(),
                payload: serde_json::json!({
                    "text": chunk.text,
                    "resource_id": resource_id,
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
                tracing::debug!(%resource_id, batch, total, "Embedding batch stored");
            },
        )
        .await;
        let outcome = match outcome {
            Ok(outcome) => {
                AuditLog::record_completed(
                    AuditAction::GenerateEmbeddings,
                    serde_json::json!({ "stored": outcome.stored, "errors": outcome.errors }),
                    embedding_started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                outcome
            }
            Err(err) => {
                AuditLog::record_failed(
                    AuditAction::GenerateEmbeddings,
                    &err.to_string(),
                    embedding_started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                return Err(err);
            }
        };

        Resource::mark_embedded(
            resource_id,
            outcome.stored as i64,
            extraction.entities.len() as i64,
            &self.db,
        )
        .await?;
        progress(100);

        Ok((
            outcome.stored,
            extraction.entities.len(),
            extraction.relationships.len(),
        ))
    }

    /// Nodes first, then edges: edges reference ids that must already exist.
    async fn store_graph(&self, extraction: &ExtractionResult) -> Result<(), AppError> {
        let nodes: Vec<GraphNode> = extraction
            .entities
            .iter()
            .map(|entity| {
                let mut node = GraphNode::new(
                    entity.id.clone(),
                    entity.name.clone(),
                    entity.entity_type,
                    entity.description.clone(),
                );
                node.mention_count = entity.mentions;
                node
            })
            .collect();

        let edges: Vec<GraphEdge> = extraction
            .relationships
            .iter()
            .map(|rel| {
                GraphEdge::new(
                    rel.source_id.clone(),
                    rel.target_id.clone(),
                    rel.relationship_type,
                    rel.description.clone(),
                    rel.weight,
                )
            })
            .collect();

        GraphNode::upsert_many(nodes, &self.db).await?;
        GraphEdge::insert_many(edges, &self.db).await?;

        Ok(())
    }
}

/// The dumps come as a bare array, an object with a `records` array, or a
/// single record.
pub fn parse_records(body: &str) -> Result<Vec<StjRecord>, AppError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AppError::Validation(format!("Resource is not valid JSON: {e}")))?;

    let raw_records: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(map)],
        },
        other => {
            return Err(AppError::Validation(format!(
                "Unexpected JSON shape for resource: {other}"
            )))
        }
    };

    let mut records = Vec::with_capacity(raw_records.len());
    for raw in raw_records {
        match serde_json::from_value::<StjRecord>(raw) {
            Ok(record) => records.push(record),
            Err(err) => warn!(error = %err, "Skipping malformed record"),
        }
    }

    if records.is_empty() {
        return Err(AppError::Validation(
            "Resource contained no parseable records".into(),
        ));
    }

    Ok(records)
}

fn chunk_records(records: &[StjRecord], resource_id: &str) -> Result<Vec<Chunk>, AppError> {
    let mut chunks = Vec::new();
    for record in records {
        let (text, mut metadata) = from_stj_record(record);
        if text.trim().is_empty() {
            continue;
        }
        metadata.insert("resource_id".into(), Value::from(resource_id));
        chunks.extend(chunk_text(
            &text,
            &metadata,
            DEFAULT_CHUNK_SIZE,
            DEFAULT_OVERLAP,
        )?);
    }

    if chunks.is_empty() {
        return Err(AppError::Validation(
            "Resource records projected no text".into(),
        ));
    }

    Ok(chunks)
}
