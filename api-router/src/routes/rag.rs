use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use common::storage::types::{rag_query::RagQuery, user::User};

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: String,
}

/// Rate-limited GraphRAG query endpoint.
pub async fn query(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(params): Json<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.query.trim().chars().count() < 3 {
        return Err(ApiError::ValidationError(
            "Query must be at least 3 characters long".to_string(),
        ));
    }

    let decision = state.rag_limiter.check(&format!("rag:{}", user.id));
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            retry_after_ms: decision.retry_after_ms,
        });
    }

    let outcome = state.planner.query(&params.query, Some(&user.id)).await?;

    let entities: Vec<&str> = outcome.entities.iter().map(|e| e.name.as_str()).collect();
    let community_titles: Vec<&str> = outcome
        .community_reports
        .iter()
        .filter_map(|c| c.title.as_deref())
        .collect();

    Ok(Json(json!({
        "answer": outcome.answer,
        "queryType": outcome.query_type.as_str(),
        "entities": entities,
        "communityReports": community_titles,
        "vectorResults": outcome.vector_results,
        "reasoningChain": outcome.reasoning_chain,
        "queryId": outcome.query_id,
        "remaining": decision.remaining,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

pub async fn history(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let queries = RagQuery::history(
        Some(&user.id),
        params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        &state.db,
    )
    .await?;
    Ok(Json(queries))
}
