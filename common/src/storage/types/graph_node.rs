use std::collections::HashMap;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Closed set of entity types extracted from STJ legal records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Ministro,
    Processo,
    OrgaoJulgador,
    Tema,
    Legislacao,
    Parte,
    Precedente,
    Decisao,
    ConceitoJuridico,
}

impl EntityType {
    pub fn variants() -> &'static [&'static str] {
        &[
            "MINISTRO",
            "PROCESSO",
            "ORGAO_JULGADOR",
            "TEMA",
            "LEGISLACAO",
            "PARTE",
            "PRECEDENTE",
            "DECISAO",
            "CONCEITO_JURIDICO",
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Ministro => "MINISTRO",
            EntityType::Processo => "PROCESSO",
            EntityType::OrgaoJulgador => "ORGAO_JULGADOR",
            EntityType::Tema => "TEMA",
            EntityType::Legislacao => "LEGISLACAO",
            EntityType::Parte => "PARTE",
            EntityType::Precedente => "PRECEDENTE",
            EntityType::Decisao => "DECISAO",
            EntityType::ConceitoJuridico => "CONCEITO_JURIDICO",
        }
    }

    /// Parse a type label coming back from the LLM. Unknown labels are
    /// rejected so free-form shapes never reach the graph layer.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "MINISTRO" => Some(EntityType::Ministro),
            "PROCESSO" => Some(EntityType::Processo),
            "ORGAO_JULGADOR" => Some(EntityType::OrgaoJulgador),
            "TEMA" => Some(EntityType::Tema),
            "LEGISLACAO" => Some(EntityType::Legislacao),
            "PARTE" => Some(EntityType::Parte),
            "PRECEDENTE" => Some(EntityType::Precedente),
            "DECISAO" => Some(EntityType::Decisao),
            "CONCEITO_JURIDICO" => Some(EntityType::ConceitoJuridico),
            _ => None,
        }
    }
}

stored_object!(GraphNode, "graph_node", {
    name: String,
    entity_type: EntityType,
    description: String,
    mention_count: i64,
    community_id: Option<i64>,
    community_level: Option<i64>
});

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EntityTypeCount {
    pub entity_type: EntityType,
    pub count: i64,
}

impl GraphNode {
    pub fn new(id: String, name: String, entity_type: EntityType, description: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            name,
            entity_type,
            description,
            mention_count: 1,
            community_id: None,
            community_level: None,
        }
    }

    /// Bulk upsert keyed by the stable entity id. Existing nodes get their
    /// mention count incremented and description refreshed; new nodes are
    /// created as-is. Runs as a single transaction.
    pub async fn upsert_many(nodes: Vec<GraphNode>, db: &SurrealDbClient) -> Result<(), AppError> {
        if nodes.is_empty() {
            return Ok(());
        }

        const UPSERT_NODES: &str = r#"
            BEGIN TRANSACTION;
            FOR $node IN $nodes {
                LET $thing = type::thing('graph_node', $node.id);
                LET $existing = (SELECT VALUE mention_count FROM $thing)[0];
                IF $existing == NONE {
                    CREATE $thing CONTENT $node;
                } ELSE {
                    UPDATE $thing SET
                        mention_count = $existing + $node.mention_count,
                        name = $node.name,
                        description = $node.description,
                        updated_at = time::now();
                };
            };
            COMMIT TRANSACTION;
        "#;

        db.client
            .query(UPSERT_NODES)
            .bind(("nodes", nodes))
            .await?
            .check()?;

        Ok(())
    }

    /// Case-insensitive substring search over entity names, most mentioned
    /// first.
    pub async fn search(
        term: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<GraphNode>, AppError> {
        let nodes: Vec<GraphNode> = db
            .client
            .query(
                "SELECT * FROM graph_node
                 WHERE string::contains(string::lowercase(name), string::lowercase($term))
                 ORDER BY mention_count DESC
                 LIMIT $limit",
            )
            .bind(("term", term.to_owned()))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(nodes)
    }

    pub async fn list(
        entity_type: Option<EntityType>,
        search: Option<String>,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<GraphNode>, AppError> {
        let nodes: Vec<GraphNode> = db
            .client
            .query(
                "SELECT * FROM graph_node
                 WHERE ($entity_type == NONE OR entity_type == $entity_type)
                   AND ($search == NONE
                        OR string::contains(string::lowercase(name), string::lowercase($search)))
                 ORDER BY mention_count DESC
                 LIMIT $limit",
            )
            .bind(("entity_type", entity_type))
            .bind(("search", search))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(nodes)
    }

    pub async fn top_by_mentions(
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<GraphNode>, AppError> {
        let nodes: Vec<GraphNode> = db
            .client
            .query("SELECT * FROM graph_node ORDER BY mention_count DESC LIMIT $limit")
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(nodes)
    }

    pub async fn stats_by_type(db: &SurrealDbClient) -> Result<Vec<EntityTypeCount>, AppError> {
        let rows: Vec<EntityTypeCount> = db
            .client
            .query(
                "SELECT entity_type, count() AS count FROM graph_node
                 GROUP BY entity_type ORDER BY count DESC",
            )
            .await?
            .take(0)?;

        Ok(rows)
    }

    /// Null out all community assignments. Part of the community rebuild
    /// transaction boundary.
    pub async fn clear_communities(db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query("UPDATE graph_node SET community_id = NONE, community_level = NONE")
            .await?
            .check()?;

        Ok(())
    }

    /// Persist community memberships for the given level as one transaction.
    pub async fn assign_communities(
        assignment: &HashMap<String, i64>,
        level: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        #[derive(Serialize)]
        struct Membership {
            id: String,
            community_id: i64,
        }

        let memberships: Vec<Membership> = assignment
            .iter()
            .map(|(id, community_id)| Membership {
                id: id.clone(),
                community_id: *community_id,
            })
            .collect();

        db.client
            .query(
                "BEGIN TRANSACTION;
                 FOR $m IN $memberships {
                     UPDATE type::thing('graph_node', $m.id) SET
                         community_id = $m.community_id,
                         community_level = $level,
                         updated_at = time::now();
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("memberships", memberships))
            .bind(("level", level))
            .await?
            .check()?;

        Ok(())
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

    #[test]
    fn entity_type_round_trips_through_labels() {
        for label in EntityType::variants() {
            let parsed = EntityType::parse(label).expect("known label should parse");
            assert_eq!(parsed.as_str(), *label);
        }
        assert_eq!(EntityType::parse("JUIZ"), None);
        assert_eq!(EntityType::parse(" ministro "), Some(EntityType::Ministro));
    }

    #[tokio::test]
    async fn upsert_twice_increments_mention_count() {
        let db = setup_test_db().await;

        let node = GraphNode::new(
            "ministro:min_herman_benjamin".into(),
            "Min. Herman Benjamin".into(),
            EntityType::Ministro,
            "Relator em matéria ambiental".into(),
        );

        GraphNode::upsert_many(vec![node.clone()], &db)
            .await
            .expect("first upsert");
        GraphNode::upsert_many(vec![node.clone()], &db)
            .await
            .expect("second upsert");

        let all: Vec<GraphNode> = db
            .get_all_stored_items()
            .await
            .expect("Failed to list nodes");
        assert_eq!(all.len(), 1, "Upsert must not duplicate rows");
        assert_eq!(all[0].mention_count, 2);
        assert_eq!(all[0].name, "Min. Herman Benjamin");
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let db = setup_test_db().await;

        let node = GraphNode::new(
            "ministro:min_herman_benjamin".into(),
            "Min. Herman Benjamin".into(),
            EntityType::Ministro,
            "desc".into(),
        );
        let other = GraphNode::new(
            "tema:prescricao".into(),
            "Prescrição".into(),
            EntityType::Tema,
            "desc".into(),
        );

        GraphNode::upsert_many(vec![node, other], &db)
            .await
            .expect("upsert");

        let found = GraphNode::search("herman", 5, &db).await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_type, EntityType::Ministro);

        let none = GraphNode::search("inexistente", 5, &db)
            .await
            .expect("search");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let db = setup_test_db().await;

        GraphNode::upsert_many(
            vec![
                GraphNode::new(
                    "ministro:a".into(),
                    "Ministro A".into(),
                    EntityType::Ministro,
                    "d".into(),
                ),
                GraphNode::new(
                    "tema:b".into(),
                    "Tema B".into(),
                    EntityType::Tema,
                    "d".into(),
                ),
            ],
            &db,
        )
        .await
        .expect("upsert");

        let ministros = GraphNode::list(Some(EntityType::Ministro), None, 10, &db)
            .await
            .expect("list");
        assert_eq!(ministros.len(), 1);
        assert_eq!(ministros[0].id, "ministro:a");

        let all = GraphNode::list(None, None, 10, &db).await.expect("list");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn assign_and_clear_communities() {
        let db = setup_test_db().await;

        GraphNode::upsert_many(
            vec![
                GraphNode::new(
                    "tema:a".into(),
                    "A".into(),
                    EntityType::Tema,
                    "d".into(),
                ),
                GraphNode::new(
                    "tema:b".into(),
                    "B".into(),
                    EntityType::Tema,
                    "d".into(),
                ),
            ],
            &db,
        )
        .await
        .expect("upsert");

        let mut assignment = HashMap::new();
        assignment.insert("tema:a".to_string(), 0);
        assignment.insert("tema:b".to_string(), 1);

        GraphNode::assign_communities(&assignment, 0, &db)
            .await
            .expect("assign communities");

        let all: Vec<GraphNode> = db.get_all_stored_items().await.expect("list nodes");
        for node in &all {
            assert!(node.community_id.is_some());
            assert_eq!(node.community_level, Some(0));
        }

        GraphNode::clear_communities(&db)
            .await
            .expect("clear communities");

        let all: Vec<GraphNode> = db.get_all_stored_items().await.expect("list nodes");
        for node in &all {
            assert!(node.community_id.is_none());
            assert!(node.community_level.is_none());
        }
    }
}
