use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Community, "community", {
    community_id: i64,
    level: i64,
    title: Option<String>,
    summary: Option<String>,
    full_report: Option<String>,
    key_entities: Vec<String>,
    entity_count: i64,
    edge_count: i64,
    rank: f64
});

/// How many member ids are kept as the community's key entities.
pub const KEY_ENTITY_LIMIT: usize = 10;

impl Community {
    pub fn new(
        community_id: i64,
        level: i64,
        title: Option<String>,
        summary: Option<String>,
        full_report: Option<String>,
        members: &[String],
        edge_count: i64,
    ) -> Self {
        let now = Utc::now();
        let entity_count = members.len() as i64;
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            community_id,
            level,
            title,
            summary,
            full_report,
            key_entities: members.iter().take(KEY_ENTITY_LIMIT).cloned().collect(),
            entity_count,
            edge_count,
            rank: entity_count as f64 + 0.5 * edge_count as f64,
        }
    }

    /// Replace the whole community table in one transaction.
    pub async fn replace_all(
        communities: Vec<Community>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION;
                 DELETE community;
                 FOR $community IN $communities {
                     CREATE type::thing('community', $community.id) CONTENT $community;
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("communities", communities))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn clear_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.client.query("DELETE community").await?.check()?;
        Ok(())
    }

    /// Communities at a level, highest rank first.
    pub async fn list(
        level: Option<i64>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Community>, AppError> {
        let rows: Vec<Community> = db
            .client
            .query(
                "SELECT * FROM community
                 WHERE $level == NONE OR level == $level
                 ORDER BY rank DESC",
            )
            .bind(("level", level))
            .await?
            .take(0)?;

        Ok(rows)
    }
}
