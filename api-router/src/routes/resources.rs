use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use common::storage::types::{
    audit_log::{AuditAction, AuditLog},
    job::{Job, JobPayload, JobQueue},
    resource::{Resource, ResourceStatus},
};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub dataset_id: Option<String>,
    pub status: Option<String>,
}

pub async fn list(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };

    let resources = Resource::list(params.dataset_id, status, &state.db).await?;
    Ok(Json(resources))
}

pub async fn status(
    State(state): State<ApiState>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = Resource::get(&resource_id, &state.db).await?;
    Ok(Json(json!({
        "resourceId": resource.id,
        "status": resource.status,
        "errorMessage": resource.error_message,
        "chunkCount": resource.chunk_count,
        "entityCount": resource.entity_count,
        "embeddedAt": resource.embedded_at,
    })))
}

/// Download the raw dump into object storage without processing it.
pub async fn download(
    State(state): State<ApiState>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    AuditLog::record_started(AuditAction::DownloadResource, &state.db).await?;
    let started = Instant::now();

    let result = download_inner(&state, &resource_id).await;
    match result {
        Ok(size) => {
            AuditLog::record_completed(
                AuditAction::DownloadResource,
                json!({ "bytes": size }),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;
            Ok(Json(json!({ "status": "success", "bytes": size })))
        }
        Err(err) => {
            Resource::mark_error(&resource_id, &err.to_string(), &state.db).await?;
            AuditLog::record_failed(
                AuditAction::DownloadResource,
                &err.to_string(),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;
            Err(err.into())
        }
    }
}

async fn download_inner(
    state: &ApiState,
    resource_id: &str,
) -> Result<usize, common::error::AppError> {
    let resource = Resource::get(resource_id, &state.db).await?;

    Resource::set_status(resource_id, ResourceStatus::Downloading, &state.db).await?;
    let bytes = state.ckan.download_resource(&resource.url).await?;
    let size = bytes.len();

    state
        .storage
        .put(&format!("resources/{resource_id}/raw.json"), bytes)
        .await?;
    Resource::set_status(resource_id, ResourceStatus::Downloaded, &state.db).await?;

    Ok(size)
}

/// Queue the full processing pipeline for a resource. Async-only: with the
/// broker unavailable the caller gets a service-unavailable error, never a
/// synchronous fallback.
pub async fn process(
    State(state): State<ApiState>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Resource::get(&resource_id, &state.db).await?;
    Resource::set_status(&resource_id, ResourceStatus::Queued, &state.db).await?;

    let job_id = Job::enqueue(
        JobQueue::ResourceProcess,
        JobPayload::Resource {
            resource_id: resource_id.clone(),
        },
        &state.db,
    )
    .await
    .map_err(|err| {
        tracing::error!(error = %err, "Broker rejected resource job");
        ApiError::ServiceUnavailable(
            "Resource processing requires async processing; job broker unavailable".to_string(),
        )
    })?;

    Ok(Json(json!({ "status": "queued", "jobId": job_id })))
}

fn parse_status(raw: &str) -> Result<ResourceStatus, ApiError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError::ValidationError(format!("Unknown resource status: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_accepts_snake_case_labels() {
        assert_eq!(
            parse_status("extracting_entities").expect("parse"),
            ResourceStatus::ExtractingEntities
        );
        assert_eq!(parse_status("embedded").expect("parse"), ResourceStatus::Embedded);
        assert!(parse_status("weird").is_err());
    }
}
