use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Closed set of auditable top-level actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SyncDatasets,
    DownloadResource,
    ProcessJson,
    ExtractEntities,
    BuildCommunities,
    GenerateEmbeddings,
    UploadDocument,
    ProcessDocument,
    RagQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

stored_object!(AuditLog, "audit_log", {
    action: AuditAction,
    status: AuditStatus,
    counters: serde_json::Value,
    duration_ms: Option<i64>,
    error_message: Option<String>
});

impl AuditLog {
    fn entry(
        action: AuditAction,
        status: AuditStatus,
        counters: serde_json::Value,
        duration_ms: Option<i64>,
        error_message: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            action,
            status,
            counters,
            duration_ms,
            error_message,
        }
    }

    pub async fn record_started(action: AuditAction, db: &SurrealDbClient) -> Result<(), AppError> {
        let entry = Self::entry(
            action,
            AuditStatus::Started,
            serde_json::json!({}),
            None,
            None,
        );
        db.store_item(entry).await?;
        Ok(())
    }

    pub async fn record_completed(
        action: AuditAction,
        counters: serde_json::Value,
        duration_ms: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let entry = Self::entry(
            action,
            AuditStatus::Completed,
            counters,
            Some(duration_ms),
            None,
        );
        db.store_item(entry).await?;
        Ok(())
    }

    pub async fn record_failed(
        action: AuditAction,
        error_message: &str,
        duration_ms: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let entry = Self::entry(
            action,
            AuditStatus::Failed,
            serde_json::json!({}),
            Some(duration_ms),
            Some(error_message.to_string()),
        );
        db.store_item(entry).await?;
        Ok(())
    }

    pub async fn list(limit: usize, db: &SurrealDbClient) -> Result<Vec<AuditLog>, AppError> {
        let rows: Vec<AuditLog> = db
            .client
            .query("SELECT * FROM audit_log ORDER BY created_at DESC LIMIT $limit")
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(rows)
    }
}
