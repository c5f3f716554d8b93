use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Resource processing pipeline states. A successful run only ever moves
/// forward through this sequence; `Error` is a terminal sink reachable from
/// any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Queued,
    Downloading,
    Downloaded,
    Processing,
    ExtractingEntities,
    EntitiesExtracted,
    Embedding,
    Embedded,
    Error,
}

impl ResourceStatus {
    /// Position in the forward pipeline, used to assert monotonicity.
    pub fn order(&self) -> Option<u8> {
        match self {
            ResourceStatus::Pending => Some(0),
            ResourceStatus::Queued => Some(1),
            ResourceStatus::Downloading => Some(2),
            ResourceStatus::Downloaded => Some(3),
            ResourceStatus::Processing => Some(4),
            ResourceStatus::ExtractingEntities => Some(5),
            ResourceStatus::EntitiesExtracted => Some(6),
            ResourceStatus::Embedding => Some(7),
            ResourceStatus::Embedded => Some(8),
            ResourceStatus::Error => None,
        }
    }
}

stored_object!(Resource, "resource", {
    dataset_id: String,
    name: Option<String>,
    url: String,
    format: Option<String>,
    status: ResourceStatus,
    error_message: Option<String>,
    chunk_count: Option<i64>,
    entity_count: Option<i64>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    embedded_at: Option<DateTime<Utc>>
});

impl Resource {
    /// Resources are keyed by their external CKAN resource id.
    pub fn new(
        resource_id: String,
        dataset_id: String,
        name: Option<String>,
        url: String,
        format: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: resource_id,
            created_at: now,
            updated_at: now,
            dataset_id,
            name,
            url,
            format,
            status: ResourceStatus::Pending,
            error_message: None,
            chunk_count: None,
            entity_count: None,
            embedded_at: None,
        }
    }

    /// Upsert during dataset sync: refresh metadata, keep processing state.
    pub async fn upsert_metadata(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "UPSERT type::thing('resource', $id) SET
                     dataset_id = $dataset_id,
                     name = $name,
                     url = $url,
                     format = $format,
                     status = IF status != NONE THEN status ELSE $status END,
                     created_at = IF created_at != NONE THEN created_at ELSE time::now() END,
                     updated_at = time::now()",
            )
            .bind(("id", self.id.clone()))
            .bind(("dataset_id", self.dataset_id.clone()))
            .bind(("name", self.name.clone()))
            .bind(("url", self.url.clone()))
            .bind(("format", self.format.clone()))
            .bind(("status", self.status))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn set_status(
        id: &str,
        status: ResourceStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('resource', $id) SET
                     status = $status,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("status", status))
            .await?
            .check()?;

        Ok(())
    }

    /// Mark the resource fully embedded and record the run's counters.
    pub async fn mark_embedded(
        id: &str,
        chunk_count: i64,
        entity_count: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('resource', $id) SET
                     status = $status,
                     chunk_count = $chunk_count,
                     entity_count = $entity_count,
                     embedded_at = time::now(),
                     error_message = NONE,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("status", ResourceStatus::Embedded))
            .bind(("chunk_count", chunk_count))
            .bind(("entity_count", entity_count))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn mark_error(
        id: &str,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('resource', $id) SET
                     status = $status,
                     error_message = $message,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("status", ResourceStatus::Error))
            .bind(("message", message.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Resource, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Resource {id} not found")))
    }

    pub async fn list(
        dataset_id: Option<String>,
        status: Option<ResourceStatus>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Resource>, AppError> {
        let rows: Vec<Resource> = db
            .client
            .query(
                "SELECT * FROM resource
                 WHERE ($dataset_id == NONE OR dataset_id == $dataset_id)
                   AND ($status == NONE OR status == $status)
                 ORDER BY created_at DESC",
            )
            .bind(("dataset_id", dataset_id))
            .bind(("status", status))
            .await?
            .take(0)?;

        Ok(rows)
    }

    pub async fn status_counts(db: &SurrealDbClient) -> Result<Vec<StatusCount>, AppError> {
        let rows: Vec<StatusCount> = db
            .client
            .query("SELECT status, count() AS count FROM resource GROUP BY status")
            .await?
            .take(0)?;

        Ok(rows)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StatusCount {
    pub status: ResourceStatus,
    pub count: i64,
}
