use std::fmt::Write as _;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::community::Community},
};

/// Communities taken into the global context block.
const COMMUNITY_LIMIT: usize = 15;
/// Summaries shorter than this are considered trivial and skipped.
const MIN_SUMMARY_CHARS: usize = 20;

#[derive(Debug, Default)]
pub struct GlobalSearchResult {
    pub communities: Vec<Community>,
    pub context: String,
    pub reasoning: Vec<String>,
}

/// Community-summary-centric retrieval for broad or thematic questions.
pub async fn global_search(db: &SurrealDbClient) -> Result<GlobalSearchResult, AppError> {
    let all = Community::list(Some(0), db).await?;

    let communities: Vec<Community> = all
        .into_iter()
        .filter(|c| {
            c.summary
                .as_deref()
                .is_some_and(|s| s.trim().len() >= MIN_SUMMARY_CHARS)
        })
        .take(COMMUNITY_LIMIT)
        .collect();

    let reasoning = vec![format!(
        "Busca global: {} comunidade(s) com resumo relevante.",
        communities.len()
    )];

    let mut context = String::new();
    for community in &communities {
        let title = community.title.as_deref().unwrap_or("Comunidade sem título");
        let _ = writeln!(
            context,
            "## {} (entidades: {}, conexões: {}, rank {:.1})",
            title, community.entity_count, community.edge_count, community.rank
        );
        if let Some(summary) = &community.summary {
            let _ = writeln!(context, "{summary}");
        }
        if let Some(report) = &community.full_report {
            let _ = writeln!(context, "{report}");
        }
        let _ = writeln!(context);
    }

    Ok(GlobalSearchResult {
        communities,
        context,
        reasoning,
    })
}
