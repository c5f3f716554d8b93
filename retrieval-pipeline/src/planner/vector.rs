use std::fmt::Write as _;

use serde::Serialize;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, vector::VectorStore},
    utils::embedding::EmbeddingClient,
};

/// Hits kept after merging all collections.
const VECTOR_TOP_K: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VectorResult {
    pub text: String,
    pub score: f32,
    pub source: String,
}

#[derive(Debug, Default)]
pub struct VectorSearchResult {
    pub results: Vec<VectorResult>,
    pub context: String,
    pub reasoning: Vec<String>,
}

/// Run the query across every vector collection and merge by similarity.
pub async fn vector_search(
    db: &SurrealDbClient,
    embedder: &EmbeddingClient,
    query: &str,
) -> Result<VectorSearchResult, AppError> {
    let collections = VectorStore::list_collections(db).await?;
    if collections.is_empty() {
        return Ok(VectorSearchResult {
            results: Vec::new(),
            context: String::new(),
            reasoning: vec!["Busca vetorial: nenhuma coleção disponível.".to_string()],
        });
    }

    let query_vector = embedder.embed(query).await?;
    let hits = VectorStore::search_all(query_vector, VECTOR_TOP_K, db).await?;

    let results: Vec<VectorResult> = hits
        .into_iter()
        .map(|(collection, hit)| VectorResult {
            text: hit
                .payload
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            score: hit.score,
            source: collection,
        })
        .filter(|result| !result.text.is_empty())
        .collect();

    let reasoning = vec![format!(
        "Busca vetorial: {} trecho(s) recuperados de {} coleção(ões).",
        results.len(),
        collections.len()
    )];

    let mut context = String::new();
    for result in &results {
        let _ = writeln!(
            context,
            "[{} | score {:.3}]\n{}\n",
            result.source, result.score, result.text
        );
    }

    Ok(VectorSearchResult {
        results,
        context,
        reasoning,
    })
}
