use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use common::storage::types::audit_log::AuditLog;

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<ApiState>,
    Query(params): Query<AuditParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = AuditLog::list(params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT), &state.db).await?;
    Ok(Json(entries))
}
