use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::AppError, storage::db::SurrealDbClient, utils::embedding::EmbeddingClient,
};

/// Registry row describing one vector collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorCollection {
    pub name: String,
    pub dimension: u32,
}

/// A point stored in a collection: UUID id, embedding vector and a free
/// payload carried back on search hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: serde_json::Value,
}

impl VectorPoint {
    pub fn new(embedding: Vec<f32>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            embedding,
            payload,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Input to the chunk storage flow: text plus the payload persisted with it.
#[derive(Debug, Clone)]
pub struct ChunkUpsert {
    pub text: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    pub stored: usize,
    pub errors: usize,
}

/// Vector store adapter over SurrealDB HNSW indexes. One table per
/// collection, cosine distance, idempotent collection creation.
#[derive(Clone)]
pub struct VectorStore;

impl VectorStore {
    /// Collection names become table names, so only a conservative charset is
    /// accepted.
    fn validate_name(name: &str) -> Result<(), AppError> {
        let valid = !name.is_empty()
            && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Invalid collection name: {name}"
            )))
        }
    }

    /// Ensure the collection exists with the given dimension and cosine
    /// metric. Safe to call concurrently.
    pub async fn ensure_collection(
        name: &str,
        dimension: u32,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        Self::validate_name(name)?;

        db.client
            .query(format!("DEFINE TABLE IF NOT EXISTS {name} SCHEMALESS"))
            .await?
            .check()?;
        db.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_{name} ON TABLE {name} \
                 FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE TYPE F32 EFC 100 M 8"
            ))
            .await?
            .check()?;
        db.client
            .query(
                "UPSERT type::thing('vector_collection', $name) SET
                     name = $name,
                     dimension = $dimension",
            )
            .bind(("name", name.to_owned()))
            .bind(("dimension", dimension))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn upsert(
        name: &str,
        points: Vec<VectorPoint>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        Self::validate_name(name)?;
        if points.is_empty() {
            return Ok(());
        }

        db.client
            .query(format!(
                "BEGIN TRANSACTION;
                 FOR $point IN $points {{
                     UPSERT type::thing('{name}', $point.id) SET
                         embedding = $point.embedding,
                         payload = $point.payload;
                 }};
                 COMMIT TRANSACTION;"
            ))
            .bind(("points", points))
            .await?
            .check()?;

        Ok(())
    }

    /// K-nearest search; score is cosine similarity (1 − distance).
    pub async fn search(
        name: &str,
        vector: Vec<f32>,
        k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<VectorHit>, AppError> {
        Self::validate_name(name)?;

        let hits: Vec<VectorHit> = db
            .client
            .query(format!(
                "SELECT
                     record::id(id) AS id,
                     payload,
                     vector::similarity::cosine(embedding, $vector) AS score
                 FROM {name}
                 WHERE embedding <|{k},100|> $vector
                 ORDER BY score DESC
                 LIMIT {k}"
            ))
            .bind(("vector", vector))
            .await?
            .take(0)?;

        Ok(hits)
    }

    pub async fn list_collections(db: &SurrealDbClient) -> Result<Vec<VectorCollection>, AppError> {
        let rows: Vec<VectorCollection> = db
            .client
            .query("SELECT name, dimension FROM vector_collection ORDER BY name ASC")
            .await?
            .take(0)?;

        Ok(rows)
    }

    /// Run the same query across every collection and merge the hits by
    /// descending similarity.
    pub async fn search_all(
        vector: Vec<f32>,
        k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<(String, VectorHit)>, AppError> {
        let mut merged = Vec::new();
        for collection in Self::list_collections(db).await? {
            match Self::search(&collection.name, vector.clone(), k, db).await {
                Ok(hits) => {
                    merged.extend(hits.into_iter().map(|hit| (collection.name.clone(), hit)));
                }
                Err(err) => {
                    warn!(
                        collection = %collection.name,
                        error = %err,
                        "Vector search failed for collection, skipping"
                    );
                }
            }
        }

        merged.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(k);

        Ok(merged)
    }

    /// Chunk storage flow: ensure the collection, deduplicate chunks by
    /// trimmed text, embed in batches and upsert. The progress callback fires
    /// once per completed batch.
    pub async fn store_chunks(
        name: &str,
        chunks: Vec<ChunkUpsert>,
        embedder: &EmbeddingClient,
        db: &SurrealDbClient,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<StoreOutcome, AppError> {
        Self::ensure_collection(name, embedder.dimension(), db).await?;

        let mut seen = HashSet::new();
        let unique: Vec<ChunkUpsert> = chunks
            .into_iter()
            .filter(|chunk| {
                let trimmed = chunk.text.trim().to_string();
                !trimmed.is_empty() && seen.insert(trimmed)
            })
            .collect();

        if unique.is_empty() {
            return Ok(StoreOutcome {
                stored: 0,
                errors: 0,
            });
        }

        let total_batches = unique.len().div_ceil(embedder.batch_size());
        let mut stored = 0;
        let mut errors = 0;

        for (batch_index, batch) in unique.chunks(embedder.batch_size()).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    let points: Vec<VectorPoint> = vectors
                        .into_iter()
                        .zip(batch.iter())
                        .map(|(embedding, chunk)| {
                            VectorPoint::new(embedding, chunk.payload.clone())
                        })
                        .collect();
                    let count = points.len();
                    Self::upsert(name, points, db).await?;
                    stored += count;
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Embedding batch failed permanently, skipping batch");
                    errors += batch.len();
                }
            }

            debug!(
                collection = %name,
                batch = batch_index + 1,
                total_batches,
                "Stored chunk batch"
            );
            on_progress(batch_index + 1, total_batches);
        }

        Ok(StoreOutcome { stored, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_and_registered() {
        let db = setup_test_db().await;

        VectorStore::ensure_collection("stj_acordaos", 3, &db)
            .await
            .expect("first ensure");
        VectorStore::ensure_collection("stj_acordaos", 3, &db)
            .await
            .expect("second ensure");

        let collections = VectorStore::list_collections(&db).await.expect("list");
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "stj_acordaos");
        assert_eq!(collections[0].dimension, 3);
    }

    #[tokio::test]
    async fn invalid_collection_names_are_rejected() {
        let db = setup_test_db().await;

        for name in ["", "Maiusculo", "has-dash", "1starts_with_digit", "a; DROP"] {
            let result = VectorStore::ensure_collection(name, 3, &db).await;
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn upsert_and_search_order_by_similarity() {
        let db = setup_test_db().await;
        VectorStore::ensure_collection("col", 3, &db)
            .await
            .expect("ensure");

        let near = VectorPoint::new(vec![1.0, 0.0, 0.0], serde_json::json!({"text": "near"}));
        let far = VectorPoint::new(vec![0.0, 1.0, 0.0], serde_json::json!({"text": "far"}));
        let near_id = near.id.clone();

        VectorStore::upsert("col", vec![near, far], &db)
            .await
            .expect("upsert");

        let hits = VectorStore::search("col", vec![1.0, 0.0, 0.0], 2, &db)
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, near_id);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].payload["text"], "near");
    }

    #[tokio::test]
    async fn search_all_merges_collections() {
        let db = setup_test_db().await;
        VectorStore::ensure_collection("col_a", 3, &db)
            .await
            .expect("ensure a");
        VectorStore::ensure_collection("col_b", 3, &db)
            .await
            .expect("ensure b");

        VectorStore::upsert(
            "col_a",
            vec![VectorPoint::new(
                vec![1.0, 0.0, 0.0],
                serde_json::json!({"text": "alpha"}),
            )],
            &db,
        )
        .await
        .expect("upsert a");
        VectorStore::upsert(
            "col_b",
            vec![VectorPoint::new(
                vec![0.9, 0.1, 0.0],
                serde_json::json!({"text": "beta"}),
            )],
            &db,
        )
        .await
        .expect("upsert b");

        let merged = VectorStore::search_all(vec![1.0, 0.0, 0.0], 5, &db)
            .await
            .expect("search all");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].0, "col_a", "closest hit should come first");
    }
}
