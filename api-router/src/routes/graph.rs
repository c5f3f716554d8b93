use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use common::storage::types::{
    community::Community,
    graph_edge::GraphEdge,
    graph_node::{EntityType, GraphNode},
};
use retrieval_pipeline::graph::visualization;

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_NODE_LIMIT: usize = 100;
const DEFAULT_VIZ_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct NodeParams {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

pub async fn nodes(
    State(state): State<ApiState>,
    Query(params): Query<NodeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_type = match params.entity_type.as_deref() {
        Some(raw) => Some(EntityType::parse(raw).ok_or_else(|| {
            ApiError::ValidationError(format!("Unknown entity type: {raw}"))
        })?),
        None => None,
    };

    let nodes = GraphNode::list(
        entity_type,
        params.search,
        params.limit.unwrap_or(DEFAULT_NODE_LIMIT),
        &state.db,
    )
    .await?;

    Ok(Json(nodes))
}

pub async fn node_stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let stats = GraphNode::stats_by_type(&state.db).await?;
    Ok(Json(stats))
}

pub async fn edge_stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let stats = GraphEdge::stats_by_type(&state.db).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct CommunityParams {
    pub level: Option<i64>,
}

pub async fn communities(
    State(state): State<ApiState>,
    Query(params): Query<CommunityParams>,
) -> Result<impl IntoResponse, ApiError> {
    let communities = Community::list(params.level, &state.db).await?;
    Ok(Json(communities))
}

/// Rebuild the community layer. Single-flight; a second call while one is
/// running gets a validation error.
pub async fn build_communities(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.community_builder.build().await?;
    Ok(Json(json!({
        "status": "success",
        "communities": outcome.communities,
        "nodes": outcome.nodes,
        "reports": outcome.reports,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VizParams {
    pub limit: Option<usize>,
}

pub async fn viz(
    State(state): State<ApiState>,
    Query(params): Query<VizParams>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = visualization(params.limit.unwrap_or(DEFAULT_VIZ_LIMIT), &state.db).await?;
    Ok(Json(json!({
        "nodes": graph.nodes,
        "edges": graph.edges,
    })))
}
