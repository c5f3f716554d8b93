use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use common::storage::types::{
    audit_log::{AuditAction, AuditLog},
    document::{Document, MAX_DOCUMENT_BYTES},
    job::{Job, JobPayload, JobQueue},
    user::User,
};

use crate::{api_state::ApiState, error::ApiError};

const MAX_FILENAME_CHARS: usize = 500;
const MAX_MIME_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: String,
    pub mime_type: String,
    pub base64_data: String,
}

pub async fn list(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = Document::list_for_user(&user.id, &state.db).await?;
    Ok(Json(documents))
}

pub async fn upload(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(params): Json<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    AuditLog::record_started(AuditAction::UploadDocument, &state.db).await?;
    let started = Instant::now();

    match upload_inner(&state, &user, params).await {
        Ok(document) => {
            AuditLog::record_completed(
                AuditAction::UploadDocument,
                json!({ "bytes": document.size }),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;
            Ok(Json(document))
        }
        Err(err) => {
            AuditLog::record_failed(
                AuditAction::UploadDocument,
                &err.to_string(),
                started.elapsed().as_millis() as i64,
                &state.db,
            )
            .await?;
            Err(err)
        }
    }
}

async fn upload_inner(
    state: &ApiState,
    user: &User,
    params: UploadParams,
) -> Result<Document, ApiError> {
    if params.filename.is_empty() || params.filename.chars().count() > MAX_FILENAME_CHARS {
        return Err(ApiError::ValidationError(
            "Filename must be between 1 and 500 characters".to_string(),
        ));
    }
    if params.mime_type.chars().count() > MAX_MIME_CHARS {
        return Err(ApiError::ValidationError(
            "MIME type must be at most 100 characters".to_string(),
        ));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(params.base64_data.as_bytes())
        .map_err(|_| ApiError::ValidationError("base64_data is not valid base64".to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::ValidationError("Uploaded file is empty".to_string()));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ApiError::PayloadTooLarge(format!(
            "Documents are limited to {MAX_DOCUMENT_BYTES} bytes"
        )));
    }

    let document = Document::new(
        user.id.clone(),
        params.filename,
        params.mime_type,
        bytes.len() as i64,
    );

    state
        .storage
        .put(&document.storage_location(), bytes.into())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "Failed to persist upload");
            ApiError::InternalError("Failed to persist upload".to_string())
        })?;

    let stored = state
        .db
        .store_item(document)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::InternalError("Document row was not created".to_string()))?;

    Ok(stored)
}

pub async fn process(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get(&document_id, &state.db).await?;
    if document.user_id != user.id {
        return Err(ApiError::Unauthorized(
            "Document belongs to another user".to_string(),
        ));
    }

    let job_id = Job::enqueue(
        JobQueue::DocumentProcess,
        JobPayload::Document {
            document_id: document_id.clone(),
        },
        &state.db,
    )
    .await
    .map_err(|err| {
        tracing::error!(error = %err, "Broker rejected document job");
        ApiError::ServiceUnavailable(
            "Document processing requires async processing; job broker unavailable".to_string(),
        )
    })?;

    Ok(Json(json!({ "status": "queued", "jobId": job_id })))
}
