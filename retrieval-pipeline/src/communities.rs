use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            audit_log::{AuditAction, AuditLog},
            community::Community,
            graph_node::GraphNode,
        },
    },
    utils::llm::{chat_structured, OpenAIClient, SUMMARY_LLM_TIMEOUT},
};

use crate::graph::{community::detect_communities, GraphSnapshot, SnapshotEdge};

/// Pause between community summarization calls.
const REPORT_PAUSE: Duration = Duration::from_millis(500);
/// Members quoted in the LLM briefing.
const BRIEFING_MEMBER_LIMIT: usize = 15;
/// Internal edges quoted in the LLM briefing.
const BRIEFING_EDGE_LIMIT: usize = 20;

const REPORT_SYSTEM_MESSAGE: &str = "\
Você é um analista de jurisprudência do STJ. Receberá os membros e as \
conexões internas de uma comunidade do grafo de conhecimento. Produza um \
título curto, um resumo de um parágrafo e um relatório completo sobre o que \
une essas entidades, em português.";

#[derive(Debug, Deserialize)]
struct CommunityReport {
    title: String,
    summary: String,
    full_report: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunityBuildOutcome {
    pub communities: usize,
    pub nodes: usize,
    pub reports: usize,
}

/// Rebuilds the community layer: clears assignments, re-runs detection,
/// summarizes the largest communities and rewrites the community table.
/// Globally single-flight.
pub struct CommunityBuilder {
    db: Arc<SurrealDbClient>,
    client: Arc<OpenAIClient>,
    model: String,
    report_cap: usize,
    gate: Mutex<()>,
}

impl CommunityBuilder {
    pub fn new(
        db: Arc<SurrealDbClient>,
        client: Arc<OpenAIClient>,
        model: String,
        report_cap: usize,
    ) -> Self {
        Self {
            db,
            client,
            model,
            report_cap,
            gate: Mutex::new(()),
        }
    }

    pub async fn build(&self) -> Result<CommunityBuildOutcome, AppError> {
        let Ok(_guard) = self.gate.try_lock() else {
            return Err(AppError::Validation(
                "A community build is already running".into(),
            ));
        };

        AuditLog::record_started(AuditAction::BuildCommunities, &self.db).await?;
        let started = Instant::now();

        match self.run().await {
            Ok(outcome) => {
                AuditLog::record_completed(
                    AuditAction::BuildCommunities,
                    json!({
                        "communities": outcome.communities,
                        "nodes": outcome.nodes,
                        "reports": outcome.reports,
                    }),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Ok(outcome)
            }
            Err(err) => {
                AuditLog::record_failed(
                    AuditAction::BuildCommunities,
                    &err.to_string(),
                    started.elapsed().as_millis() as i64,
                    &self.db,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run(&self) -> Result<CommunityBuildOutcome, AppError> {
        // Clear community rows and node assignments atomically so readers
        // never observe a partially renumbered layer.
        self.db
            .client
            .query(
                "BEGIN TRANSACTION;
                 DELETE community;
                 UPDATE graph_node SET community_id = NONE, community_level = NONE;
                 COMMIT TRANSACTION;",
            )
            .await?
            .check()?;

        let (snapshot, nodes) = GraphSnapshot::load(&self.db).await?;
        if nodes.is_empty() {
            info!("No graph nodes, community build is a no-op");
            return Ok(CommunityBuildOutcome::default());
        }

        let assignment = detect_communities(&snapshot.adjacency);
        GraphNode::assign_communities(&assignment, 0, &self.db).await?;

        let nodes_by_id: HashMap<&str, &GraphNode> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        // Group entities into community bags.
        let mut bags: HashMap<i64, Vec<String>> = HashMap::new();
        for (entity_id, community_id) in &assignment {
            bags.entry(*community_id).or_default().push(entity_id.clone());
        }
        for members in bags.values_mut() {
            members.sort_by_key(|id| {
                std::cmp::Reverse(nodes_by_id.get(id.as_str()).map_or(0, |n| n.mention_count))
            });
        }

        // Largest communities first; only those get LLM reports.
        let mut ordered: Vec<(i64, Vec<String>)> = bags.into_iter().collect();
        ordered.sort_by_key(|(id, members)| (std::cmp::Reverse(members.len()), *id));

        let mut communities = Vec::with_capacity(ordered.len());
        let mut reports = 0usize;

        for (community_id, members) in ordered {
            let internal_edges: Vec<&SnapshotEdge> = snapshot
                .edges
                .iter()
                .filter(|e| {
                    assignment.get(&e.source) == Some(&community_id)
                        && assignment.get(&e.target) == Some(&community_id)
                })
                .collect();

            let report = if members.len() >= 2 && reports < self.report_cap {
                if reports > 0 {
                    sleep(REPORT_PAUSE).await;
                }
                reports += 1;
                self.request_report(&members, &internal_edges, &nodes_by_id)
                    .await
            } else {
                None
            };

            let (title, summary, full_report) = match report {
                Some(report) => (
                    Some(report.title),
                    Some(report.summary),
                    Some(report.full_report),
                ),
                None => fallback_report(&members, internal_edges.len(), &nodes_by_id),
            };

            communities.push(Community::new(
                community_id,
                0,
                title,
                summary,
                full_report,
                &members,
                internal_edges.len() as i64,
            ));
        }

        let outcome = CommunityBuildOutcome {
            communities: communities.len(),
            nodes: assignment.len(),
            reports,
        };

        Community::replace_all(communities, &self.db).await?;

        info!(
            communities = outcome.communities,
            nodes = outcome.nodes,
            reports = outcome.reports,
            "Community build finished"
        );

        Ok(outcome)
    }

    async fn request_report(
        &self,
        members: &[String],
        internal_edges: &[&SnapshotEdge],
        nodes_by_id: &HashMap<&str, &GraphNode>,
    ) -> Option<CommunityReport> {
        let briefing = build_briefing(members, internal_edges, nodes_by_id);

        let result = chat_structured::<CommunityReport>(
            &self.client,
            &self.model,
            REPORT_SYSTEM_MESSAGE,
            briefing,
            "community_report",
            report_schema(),
            SUMMARY_LLM_TIMEOUT,
        )
        .await;

        match result {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, "Community summarization failed, using fallback");
                None
            }
        }
    }
}

fn report_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "summary": { "type": "string" },
            "full_report": { "type": "string" }
        },
        "required": ["title", "summary", "full_report"],
        "additionalProperties": false
    })
}

fn build_briefing(
    members: &[String],
    internal_edges: &[&SnapshotEdge],
    nodes_by_id: &HashMap<&str, &GraphNode>,
) -> String {
    let mut lines = vec!["Membros da comunidade:".to_string()];
    for id in members.iter().take(BRIEFING_MEMBER_LIMIT) {
        if let Some(node) = nodes_by_id.get(id.as_str()) {
            lines.push(format!(
                "- {} ({}): {}",
                node.name,
                node.entity_type.as_str(),
                node.description
            ));
        }
    }

    lines.push(String::new());
    lines.push("Conexões internas:".to_string());
    for edge in internal_edges.iter().take(BRIEFING_EDGE_LIMIT) {
        lines.push(format!(
            "- {} -[{}]-> {} (peso {:.2})",
            edge.source,
            edge.relationship_type.as_str(),
            edge.target,
            edge.weight
        ));
    }

    lines.join("\n")
}

/// Name-based title and summary used when the LLM is unavailable or the
/// community was not sampled for a report.
fn fallback_report(
    members: &[String],
    edge_count: usize,
    nodes_by_id: &HashMap<&str, &GraphNode>,
) -> (Option<String>, Option<String>, Option<String>) {
    let names: Vec<String> = members
        .iter()
        .take(3)
        .map(|id| {
            nodes_by_id
                .get(id.as_str())
                .map_or_else(|| id.clone(), |n| n.name.clone())
        })
        .collect();

    let title = names.join(" / ");
    let summary = format!(
        "Comunidade com {} entidades e {} conexões internas em torno de {}.",
        members.len(),
        edge_count,
        title
    );

    (Some(title), Some(summary), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::graph_edge::{GraphEdge, RelationshipType};
    use common::storage::types::graph_node::EntityType;
    use uuid::Uuid;

    fn unreachable_client() -> Arc<OpenAIClient> {
        Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key("test")
                .with_api_base("http://127.0.0.1:1"),
        ))
    }

    async fn setup() -> (Arc<SurrealDbClient>, CommunityBuilder) {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let builder =
            CommunityBuilder::new(db.clone(), unreachable_client(), "gpt-4o-mini".into(), 30);
        (db, builder)
    }

    fn node(id: &str, name: &str) -> GraphNode {
        GraphNode::new(id.into(), name.into(), EntityType::Tema, "descrição".into())
    }

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge::new(
            source.into(),
            target.into(),
            RelationshipType::SimilarA,
            "d".into(),
            1.0,
        )
    }

    #[tokio::test]
    async fn build_assigns_every_node_a_dense_community() {
        let (db, builder) = setup().await;

        GraphNode::upsert_many(
            vec![
                node("tema:a", "A"),
                node("tema:b", "B"),
                node("tema:c", "C"),
                node("tema:d", "D"),
            ],
            &db,
        )
        .await
        .expect("upsert nodes");
        GraphEdge::insert_many(
            vec![
                edge("tema:a", "tema:b"),
                edge("tema:b", "tema:a"),
                edge("tema:c", "tema:d"),
                edge("tema:d", "tema:c"),
            ],
            &db,
        )
        .await
        .expect("insert edges");

        let outcome = builder.build().await.expect("build");
        assert_eq!(outcome.nodes, 4);
        assert_eq!(outcome.communities, 2);

        let nodes: Vec<GraphNode> = db.get_all_stored_items().await.expect("nodes");
        let max_community = outcome.communities as i64 - 1;
        for node in &nodes {
            let community_id = node.community_id.expect("assigned community");
            assert!(
                (0..=max_community).contains(&community_id),
                "community id {community_id} outside dense range"
            );
            assert_eq!(node.community_level, Some(0));
        }
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_name_based_reports() {
        let (db, builder) = setup().await;

        GraphNode::upsert_many(vec![node("tema:a", "Prescrição"), node("tema:b", "Decadência")], &db)
            .await
            .expect("upsert nodes");
        GraphEdge::insert_many(
            vec![edge("tema:a", "tema:b"), edge("tema:b", "tema:a")],
            &db,
        )
        .await
        .expect("insert edges");

        builder.build().await.expect("build");

        let communities = Community::list(Some(0), &db).await.expect("list");
        assert_eq!(communities.len(), 1);
        let community = &communities[0];
        assert!(community.title.as_deref().is_some_and(|t| t.contains("Prescrição")));
        assert!(community
            .summary
            .as_deref()
            .is_some_and(|s| s.contains("2 entidades")));
        assert!(community.full_report.is_none());
        assert_eq!(community.entity_count, 2);
        assert_eq!(community.edge_count, 2);
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_communities() {
        let (db, builder) = setup().await;

        GraphNode::upsert_many(vec![node("tema:a", "A"), node("tema:b", "B")], &db)
            .await
            .expect("upsert");
        GraphEdge::insert_many(
            vec![edge("tema:a", "tema:b"), edge("tema:b", "tema:a")],
            &db,
        )
        .await
        .expect("edges");

        builder.build().await.expect("first build");
        builder.build().await.expect("second build");

        let communities = Community::list(None, &db).await.expect("list");
        assert_eq!(
            communities.len(),
            1,
            "rebuild must rewrite the table wholesale"
        );
    }

    #[tokio::test]
    async fn empty_graph_build_is_a_no_op() {
        let (db, builder) = setup().await;
        let outcome = builder.build().await.expect("build");
        assert_eq!(outcome, CommunityBuildOutcome::default());

        let communities = Community::list(None, &db).await.expect("list");
        assert!(communities.is_empty());
    }

    #[tokio::test]
    async fn build_is_single_flight() {
        let (_db, builder) = setup().await;

        let _guard = builder.gate.try_lock().expect("gate");
        let result = builder.build().await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
