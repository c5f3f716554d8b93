use std::sync::Arc;
use std::time::Instant;

use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{
        config::AppConfig, embedding::EmbeddingClient, llm::OpenAIClient,
        rate_limit::RateLimiter,
    },
};
use ingestion_pipeline::ckan::CkanClient;
use retrieval_pipeline::{communities::CommunityBuilder, planner::GraphRagPlanner};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub embedder: EmbeddingClient,
    pub planner: Arc<GraphRagPlanner>,
    pub community_builder: Arc<CommunityBuilder>,
    pub ckan: Arc<CkanClient>,
    pub rag_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        openai_client: Arc<OpenAIClient>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let embedder = EmbeddingClient::new(openai_client.clone(), config);

        let planner = Arc::new(GraphRagPlanner::new(
            db.clone(),
            openai_client.clone(),
            config.chat_model.clone(),
            embedder.clone(),
        ));

        let community_builder = Arc::new(CommunityBuilder::new(
            db.clone(),
            openai_client,
            config.chat_model.clone(),
            config.community_report_cap,
        ));

        let ckan = Arc::new(CkanClient::new(config)?);

        Ok(Self {
            db,
            config: config.clone(),
            storage,
            embedder,
            planner,
            community_builder,
            ckan,
            rag_limiter: Arc::new(RateLimiter::for_rag_queries()),
            started_at: Instant::now(),
        })
    }
}
