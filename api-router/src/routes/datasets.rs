use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use common::storage::types::{
    audit_log::{AuditAction, AuditLog},
    dataset::Dataset,
    resource::Resource,
};

use crate::{api_state::ApiState, error::ApiError};

pub async fn list(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let datasets = Dataset::list(&state.db).await?;
    Ok(Json(datasets))
}

pub async fn get_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let dataset = Dataset::find_by_slug(&slug, &state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Dataset {slug} not found")))?;
    Ok(Json(dataset))
}

/// Per-status resource counts across all datasets.
pub async fn resource_stats(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = Resource::status_counts(&state.db).await?;
    Ok(Json(counts))
}

/// Refresh datasets and their resources from the STJ CKAN catalogue.
pub async fn sync(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    AuditLog::record_started(AuditAction::SyncDatasets, &state.db).await?;
    let started = Instant::now();

    match state.ckan.sync_datasets(&state.db).await {
        Ok(summary) => {
            AuditLog::record_completed(
                AuditAction::SyncDatasets,
                json!({
                    "datasets": summary.datasets,
                    "resources": summary.resources,
                    "json_resources": summary.json_resources,
                }),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;

            Ok(Json(json!({
                "status": "success",
                "datasets": summary.datasets,
                "resources": summary.resources,
                "jsonResources": summary.json_resources,
            })))
        }
        Err(err) => {
            AuditLog::record_failed(
                AuditAction::SyncDatasets,
                &err.to_string(),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;
            Err(err.into())
        }
    }
}
