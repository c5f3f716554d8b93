use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(RagQuery, "rag_query", {
    user_id: Option<String>,
    query: String,
    query_type: Option<String>,
    response: Option<String>,
    reasoning_chain: Vec<String>,
    entity_count: i64,
    community_count: i64,
    vector_count: i64,
    duration_ms: Option<i64>
});

impl RagQuery {
    /// Record the query before retrieval starts so failures still leave a
    /// trace.
    pub fn started(query: String, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            query,
            query_type: None,
            response: None,
            reasoning_chain: Vec::new(),
            entity_count: 0,
            community_count: 0,
            vector_count: 0,
            duration_ms: None,
        }
    }

    /// Fill in the outcome once the answer has been generated.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete(
        id: &str,
        query_type: &str,
        response: &str,
        reasoning_chain: Vec<String>,
        entity_count: i64,
        community_count: i64,
        vector_count: i64,
        duration_ms: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('rag_query', $id) SET
                     query_type = $query_type,
                     response = $response,
                     reasoning_chain = $reasoning_chain,
                     entity_count = $entity_count,
                     community_count = $community_count,
                     vector_count = $vector_count,
                     duration_ms = $duration_ms,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("query_type", query_type.to_owned()))
            .bind(("response", response.to_owned()))
            .bind(("reasoning_chain", reasoning_chain))
            .bind(("entity_count", entity_count))
            .bind(("community_count", community_count))
            .bind(("vector_count", vector_count))
            .bind(("duration_ms", duration_ms))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn history(
        user_id: Option<&str>,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<RagQuery>, AppError> {
        let rows: Vec<RagQuery> = db
            .client
            .query(
                "SELECT * FROM rag_query
                 WHERE $user_id == NONE OR user_id == $user_id
                 ORDER BY created_at DESC
                 LIMIT $limit",
            )
            .bind(("user_id", user_id.map(str::to_string)))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(rows)
    }
}
