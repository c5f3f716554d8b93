pub mod classify;
pub mod global;
pub mod local;
pub mod prompt;
pub mod vector;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            audit_log::{AuditAction, AuditLog},
            community::Community,
            graph_node::GraphNode,
            rag_query::RagQuery,
        },
    },
    utils::{
        embedding::EmbeddingClient,
        llm::{chat_text, OpenAIClient, DEFAULT_LLM_TIMEOUT},
        metrics::observe_timing,
    },
};

pub use classify::QueryMode;
pub use prompt::NO_CONTEXT_ANSWER;
pub use vector::VectorResult;

use classify::classify_query;
use global::{global_search, GlobalSearchResult};
use local::{local_search, LocalSearchResult};
use prompt::{build_prompt, ANSWER_SYSTEM_MESSAGE};
use vector::{vector_search, VectorSearchResult};

/// Minimum accepted query length.
const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug)]
pub struct QueryOutcome {
    pub answer: String,
    pub query_type: QueryMode,
    pub entities: Vec<GraphNode>,
    pub community_reports: Vec<Community>,
    pub vector_results: Vec<VectorResult>,
    pub reasoning_chain: Vec<String>,
    pub query_id: String,
}

/// GraphRAG query planner: classifies the query, fans out to the enabled
/// retrievers, fuses their contexts into one generation prompt and persists
/// the full trace.
pub struct GraphRagPlanner {
    db: Arc<SurrealDbClient>,
    client: Arc<OpenAIClient>,
    model: String,
    embedder: EmbeddingClient,
}

impl GraphRagPlanner {
    pub fn new(
        db: Arc<SurrealDbClient>,
        client: Arc<OpenAIClient>,
        model: String,
        embedder: EmbeddingClient,
    ) -> Self {
        Self {
            db,
            client,
            model,
            embedder,
        }
    }

    pub async fn query(
        &self,
        query: &str,
        user_id: Option<&str>,
    ) -> Result<QueryOutcome, AppError> {
        if query.trim().chars().count() < MIN_QUERY_CHARS {
            return Err(AppError::Validation(
                "Query must be at least 3 characters long".into(),
            ));
        }

        AuditLog::record_started(AuditAction::RagQuery, &self.db).await?;
        let started = Instant::now();

        // Record the query before retrieval so failures still leave a trace.
        let record = RagQuery::started(query.to_string(), user_id.map(str::to_string));
        let query_id = record.id.clone();
        self.db.store_item(record).await?;

        match self.run(query, &query_id).await {
            Ok(outcome) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                observe_timing("rag_query_ms", duration_ms as u64);
                AuditLog::record_completed(
                    AuditAction::RagQuery,
                    serde_json::json!({
                        "entities": outcome.entities.len(),
                        "communities": outcome.community_reports.len(),
                        "vector_results": outcome.vector_results.len(),
                    }),
                    duration_ms,
                    &self.db,
                )
                .await?;
                Ok(outcome)
            }
            Err(err) => {
                AuditLog::record_failed(
                    AuditAction::RagQuery,
                    &err.to_string(),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run(&self, query: &str, query_id: &str) -> Result<QueryOutcome, AppError> {
        let started = Instant::now();
        let mut reasoning: Vec<String> = Vec::new();

        let (mode, classification_reasoning) =
            classify_query(&self.client, &self.model, query).await;
        reasoning.push(format!(
            "Consulta classificada como '{}': {}",
            mode.as_str(),
            classification_reasoning
        ));

        // Run the enabled retrievers in parallel; each degrades to an empty
        // result rather than failing the whole query.
        let local_future = async {
            if mode.runs_local() {
                local_search(&self.db, &self.client, &self.model, query).await
            } else {
                Ok(LocalSearchResult::default())
            }
        };
        let global_future = async {
            if mode.runs_global() {
                global_search(&self.db).await
            } else {
                Ok(GlobalSearchResult::default())
            }
        };
        let vector_future = vector_search(&self.db, &self.embedder, query);

        let (local_result, global_result, vector_result) =
            tokio::join!(local_future, global_future, vector_future);

        let local_result = local_result.unwrap_or_else(|err| {
            warn!(error = %err, "Local retrieval failed, continuing without it");
            LocalSearchResult {
                reasoning: vec!["Busca local indisponível.".to_string()],
                ..Default::default()
            }
        });
        let global_result = global_result.unwrap_or_else(|err| {
            warn!(error = %err, "Global retrieval failed, continuing without it");
            GlobalSearchResult {
                reasoning: vec!["Busca global indisponível.".to_string()],
                ..Default::default()
            }
        });
        let vector_result = vector_result.unwrap_or_else(|err| {
            warn!(error = %err, "Vector retrieval failed, continuing without it");
            VectorSearchResult {
                reasoning: vec!["Busca vetorial indisponível.".to_string()],
                ..Default::default()
            }
        });

        reasoning.extend(local_result.reasoning.iter().cloned());
        reasoning.extend(global_result.reasoning.iter().cloned());
        reasoning.extend(vector_result.reasoning.iter().cloned());

        let no_context = local_result.context.trim().is_empty()
            && global_result.context.trim().is_empty()
            && vector_result.context.trim().is_empty();

        let answer = if no_context {
            reasoning.push("Nenhum contexto encontrado; resposta padrão.".to_string());
            NO_CONTEXT_ANSWER.to_string()
        } else {
            let prompt = build_prompt(
                query,
                &local_result.context,
                &global_result.context,
                &vector_result.context,
            );
            let answer = chat_text(
                &self.client,
                &self.model,
                ANSWER_SYSTEM_MESSAGE,
                prompt,
                DEFAULT_LLM_TIMEOUT,
            )
            .await?;
            reasoning.push("Resposta gerada a partir do contexto recuperado.".to_string());
            answer
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        RagQuery::complete(
            query_id,
            mode.as_str(),
            &answer,
            reasoning.clone(),
            local_result.entities.len() as i64,
            global_result.communities.len() as i64,
            vector_result.results.len() as i64,
            duration_ms,
            &self.db,
        )
        .await?;

        info!(
            %query_id,
            mode = mode.as_str(),
            entities = local_result.entities.len(),
            communities = global_result.communities.len(),
            vector_results = vector_result.results.len(),
            duration_ms,
            "RAG query answered"
        );

        Ok(QueryOutcome {
            answer,
            query_type: mode,
            entities: local_result.entities,
            community_reports: global_result.communities,
            vector_results: vector_result.results,
            reasoning_chain: reasoning,
            query_id: query_id.to_string(),
        })
    }
}
