use std::time::Instant;

use async_openai::types::CreateEmbeddingRequestArgs;
use futures::{stream, StreamExt, TryStreamExt};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, warn};

use crate::{
    error::AppError,
    utils::{
        config::AppConfig,
        llm::OpenAIClient,
        metrics::{
            observe_timing, EMBEDDING_BATCH_FALLBACK_PER_ITEM_USED,
            EMBEDDING_BATCH_JOBS_FAILED_ASYNC, EMBEDDING_BATCH_JOBS_FAILED_PER_ITEM,
            EMBEDDING_BATCH_JOBS_STARTED, EMBEDDING_BATCH_JOBS_SUCCEEDED,
        },
    },
};

/// Embedding generation client. Prefers a single batch request and falls back
/// to bounded-concurrency per-item calls with retries when the batch path
/// fails or returns a mismatched number of vectors.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: std::sync::Arc<OpenAIClient>,
    model: String,
    dimension: u32,
    batch_size: usize,
    max_retries: usize,
    retry_base_ms: u64,
    concurrency: usize,
}

impl EmbeddingClient {
    pub fn new(client: std::sync::Arc<OpenAIClient>, config: &AppConfig) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            batch_size: config.embedding_batch_size.max(1),
            max_retries: config.embedding_max_retries,
            retry_base_ms: config.embedding_retry_base_ms.max(1),
            concurrency: config.embedding_concurrency.max(1),
        }
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Generate one embedding vector for a single input.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimension)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
            .embedding
            .clone();

        Ok(embedding)
    }

    /// Generate embeddings for all inputs, one vector per input, in order.
    /// If any item still fails after retries the whole batch fails.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_BATCH_JOBS_STARTED.inc();
        let started = Instant::now();

        let result = match self.embed_batch_request(inputs).await {
            Ok(vectors) => Ok(vectors),
            Err(err) => {
                warn!(
                    error = %err,
                    items = inputs.len(),
                    "Batch embedding request failed, falling back to per-item calls"
                );
                EMBEDDING_BATCH_JOBS_FAILED_ASYNC.inc();
                EMBEDDING_BATCH_FALLBACK_PER_ITEM_USED.inc();
                self.embed_per_item(inputs).await
            }
        };

        observe_timing(
            "embedding_batch_request_ms",
            started.elapsed().as_millis() as u64,
        );

        match result {
            Ok(vectors) => {
                EMBEDDING_BATCH_JOBS_SUCCEEDED.inc();
                Ok(vectors)
            }
            Err(err) => {
                EMBEDDING_BATCH_JOBS_FAILED_PER_ITEM.inc();
                Err(err)
            }
        }
    }

    async fn embed_batch_request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimension)
            .input(inputs.to_vec())
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        if response.data.len() != inputs.len() {
            return Err(AppError::LLMParsing(format!(
                "Embedding batch returned {} vectors for {} inputs",
                response.data.len(),
                inputs.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_per_item(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        debug!(
            items = inputs.len(),
            concurrency = self.concurrency,
            "Embedding inputs one by one"
        );

        stream::iter(inputs.iter().map(|input| self.embed_with_retries(input)))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn embed_with_retries(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_base_ms)
            .map(jitter)
            .take(self.max_retries);

        Retry::spawn(retry_strategy, || self.embed(input)).await
    }
}
