use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Dataset, "dataset", {
    slug: String,
    title: String,
    category: Option<String>,
    total_resources: i64,
    json_resources: i64,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    last_synced_at: Option<DateTime<Utc>>
});

impl Dataset {
    /// Datasets are keyed by their CKAN slug, which keeps sync idempotent.
    pub fn new(slug: String, title: String, category: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: slug.clone(),
            created_at: now,
            updated_at: now,
            slug,
            title,
            category,
            total_resources: 0,
            json_resources: 0,
            last_synced_at: None,
        }
    }

    /// Upsert the dataset row after a sync run, refreshing counts and the
    /// sync timestamp. `json_resources` never exceeds `total_resources`.
    pub async fn record_sync(
        slug: &str,
        title: &str,
        category: Option<String>,
        total_resources: i64,
        json_resources: i64,
        db: &SurrealDbClient,
    ) -> Result<Dataset, AppError> {
        let json_resources = json_resources.min(total_resources);

        let dataset: Option<Dataset> = db
            .client
            .query(
                "UPSERT type::thing('dataset', $slug) SET
                     slug = $slug,
                     title = $title,
                     category = $category,
                     total_resources = $total_resources,
                     json_resources = $json_resources,
                     last_synced_at = time::now(),
                     created_at = IF created_at != NONE THEN created_at ELSE time::now() END,
                     updated_at = time::now()
                 RETURN AFTER",
            )
            .bind(("slug", slug.to_owned()))
            .bind(("title", title.to_owned()))
            .bind(("category", category))
            .bind(("total_resources", total_resources))
            .bind(("json_resources", json_resources))
            .await?
            .take(0)?;

        dataset.ok_or_else(|| AppError::InternalError("dataset upsert returned no row".into()))
    }

    pub async fn find_by_slug(
        slug: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Dataset>, AppError> {
        Ok(db.get_item(slug).await?)
    }

    pub async fn list(db: &SurrealDbClient) -> Result<Vec<Dataset>, AppError> {
        let rows: Vec<Dataset> = db
            .client
            .query("SELECT * FROM dataset ORDER BY slug ASC")
            .await?
            .take(0)?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn record_sync_is_idempotent_per_slug() {
        let db = setup_test_db().await;

        let first = Dataset::record_sync("acordaos-2024", "Acórdãos 2024", None, 10, 4, &db)
            .await
            .expect("first sync");
        assert_eq!(first.total_resources, 10);
        assert_eq!(first.json_resources, 4);
        assert!(first.last_synced_at.is_some());

        let second = Dataset::record_sync(
            "acordaos-2024",
            "Acórdãos 2024",
            Some("jurisprudencia".into()),
            12,
            5,
            &db,
        )
        .await
        .expect("second sync");
        assert_eq!(second.total_resources, 12);

        let all = Dataset::list(&db).await.expect("list");
        assert_eq!(all.len(), 1, "Sync must not duplicate dataset rows");
    }

    #[tokio::test]
    async fn json_resources_never_exceed_total() {
        let db = setup_test_db().await;

        let dataset = Dataset::record_sync("ds", "DS", None, 3, 9, &db)
            .await
            .expect("sync");
        assert_eq!(dataset.json_resources, 3);
    }

    #[tokio::test]
    async fn find_by_slug_returns_none_for_unknown() {
        let db = setup_test_db().await;
        let missing = Dataset::find_by_slug("missing", &db).await.expect("query");
        assert!(missing.is_none());
    }
}
