use std::fmt::Write as _;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{graph_edge::GraphEdge, graph_node::GraphNode},
    },
    utils::llm::OpenAIClient,
};

use super::classify::query_entities;

/// Per-name graph search depth.
const PER_NAME_LIMIT: usize = 5;
/// Fallback search over the query prefix.
const QUERY_SEARCH_LIMIT: usize = 10;
const QUERY_PREFIX_CHARS: usize = 100;
/// Entities whose neighborhoods are expanded into the context.
const NEIGHBORHOOD_ENTITIES: usize = 5;
const EDGES_PER_ENTITY: usize = 10;
/// Hard cap on entities returned to the caller.
const MAX_ENTITIES: usize = 20;

#[derive(Debug, Default)]
pub struct LocalSearchResult {
    pub entities: Vec<GraphNode>,
    pub context: String,
    pub reasoning: Vec<String>,
}

/// Entity-centric retrieval: resolve names mentioned in the query against the
/// graph, then expand the strongest matches one hop into a readable context
/// block.
pub async fn local_search(
    db: &SurrealDbClient,
    client: &OpenAIClient,
    model: &str,
    query: &str,
) -> Result<LocalSearchResult, AppError> {
    let mut reasoning = Vec::new();

    let names = query_entities(client, model, query).await;
    reasoning.push(format!(
        "Busca local: {} nome(s) de entidade identificados na consulta.",
        names.len()
    ));

    let mut entities: Vec<GraphNode> = Vec::new();
    for name in &names {
        let found = GraphNode::search(name, PER_NAME_LIMIT, db).await?;
        merge_entities(&mut entities, found);
    }

    // Also search with the query prefix to catch entities the name pass
    // missed.
    let prefix: String = query.chars().take(QUERY_PREFIX_CHARS).collect();
    let found = GraphNode::search(&prefix, QUERY_SEARCH_LIMIT, db).await?;
    merge_entities(&mut entities, found);

    entities.truncate(MAX_ENTITIES);
    reasoning.push(format!(
        "Busca local: {} entidade(s) encontradas no grafo.",
        entities.len()
    ));

    if entities.is_empty() {
        return Ok(LocalSearchResult {
            entities,
            context: String::new(),
            reasoning,
        });
    }

    let mut context = String::new();
    for entity in entities.iter().take(NEIGHBORHOOD_ENTITIES) {
        let edges = GraphEdge::incident_to(&entity.id, EDGES_PER_ENTITY, db).await?;
        format_entity_context(&mut context, entity, &edges);
    }

    Ok(LocalSearchResult {
        entities,
        context,
        reasoning,
    })
}

fn merge_entities(into: &mut Vec<GraphNode>, found: Vec<GraphNode>) {
    for node in found {
        if !into.iter().any(|existing| existing.id == node.id) {
            into.push(node);
        }
    }
}

/// Human-readable neighborhood description for one entity.
fn format_entity_context(context: &mut String, entity: &GraphNode, edges: &[GraphEdge]) {
    let _ = writeln!(
        context,
        "{} ({}): {}",
        entity.name,
        entity.entity_type.as_str(),
        entity.description
    );
    for edge in edges {
        let (arrow, other) = if edge.source == entity.id {
            ("->", edge.target.as_str())
        } else {
            ("<-", edge.source.as_str())
        };
        let _ = writeln!(
            context,
            "  {arrow} [{}] {} (peso {:.2}): {}",
            edge.relationship_type.as_str(),
            other,
            edge.weight,
            edge.description
        );
    }
    let _ = writeln!(context);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::graph_edge::RelationshipType;
    use common::storage::types::graph_node::EntityType;
    use std::sync::Arc;
    use uuid::Uuid;

    fn unreachable_client() -> OpenAIClient {
        async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key("test")
                .with_api_base("http://127.0.0.1:1"),
        )
    }

    async fn setup() -> Arc<SurrealDbClient> {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    #[test]
    fn entity_context_lists_both_edge_directions() {
        let entity = GraphNode::new(
            "ministro:min_a".into(),
            "Min. A".into(),
            EntityType::Ministro,
            "Relator".into(),
        );
        let edges = vec![
            GraphEdge::new(
                "ministro:min_a".into(),
                "processo:resp_1".into(),
                RelationshipType::RelatorDe,
                "relator do recurso".into(),
                0.9,
            ),
            GraphEdge::new(
                "processo:resp_2".into(),
                "ministro:min_a".into(),
                RelationshipType::JulgadoPor,
                "julgado pela turma".into(),
                0.4,
            ),
        ];

        let mut context = String::new();
        format_entity_context(&mut context, &entity, &edges);

        assert!(context.contains("Min. A (MINISTRO): Relator"));
        assert!(context.contains("-> [RELATOR_DE] processo:resp_1"));
        assert!(context.contains("<- [JULGADO_POR] processo:resp_2"));
    }

    #[test]
    fn merge_skips_duplicate_ids() {
        let a = GraphNode::new("tema:a".into(), "A".into(), EntityType::Tema, "d".into());
        let mut entities = vec![a.clone()];
        merge_entities(&mut entities, vec![a.clone()]);
        assert_eq!(entities.len(), 1);

        let b = GraphNode::new("tema:b".into(), "B".into(), EntityType::Tema, "d".into());
        merge_entities(&mut entities, vec![b]);
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn empty_graph_yields_empty_context_with_reasoning() {
        let db = setup().await;
        let client = unreachable_client();

        let result = local_search(&db, &client, "gpt-4o-mini", "tendências recentes")
            .await
            .expect("local search");

        assert!(result.entities.is_empty());
        assert!(result.context.is_empty());
        assert_eq!(result.reasoning.len(), 2);
    }

    #[tokio::test]
    async fn query_substring_match_builds_context() {
        let db = setup().await;
        let client = unreachable_client();

        GraphNode::upsert_many(
            vec![GraphNode::new(
                "tema:prescricao".into(),
                "Prescrição".into(),
                EntityType::Tema,
                "Extinção da pretensão pelo decurso do tempo".into(),
            )],
            &db,
        )
        .await
        .expect("upsert");

        // The LLM name pass fails (unreachable); the query-prefix search must
        // still find the entity by substring.
        let result = local_search(&db, &client, "gpt-4o-mini", "Prescrição")
            .await
            .expect("local search");

        assert_eq!(result.entities.len(), 1);
        assert!(result.context.contains("Prescrição (TEMA)"));
    }
}
