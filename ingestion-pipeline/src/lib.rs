#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunking;
pub mod ckan;
pub mod document;
pub mod extractor;
pub mod resource;
pub mod stj_record;
pub mod text_extraction;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::job::{Job, JobPayload, JobQueue},
    },
};
use document::DocumentProcessor;
use resource::{ProgressFn, ResourceProcessor};

/// Poll interval while a queue is empty.
const IDLE_BACKOFF: Duration = Duration::from_millis(500);

/// The two pipeline processors the worker dispatches jobs to.
#[derive(Clone)]
pub struct Processors {
    pub resources: Arc<ResourceProcessor>,
    pub documents: Arc<DocumentProcessor>,
}

/// Run claim loops for both queues until `shutdown` flips to true. Each queue
/// gets as many loops as its concurrency allows; in-flight jobs are drained
/// before the function returns.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    processors: Processors,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let mut slots = JoinSet::new();

    for queue in JobQueue::ALL {
        for slot in 0..queue.concurrency() {
            let worker_id = format!("{}-{}-{}", queue.as_str(), slot, Uuid::new_v4());
            let db = db.clone();
            let processors = processors.clone();
            let shutdown = shutdown.clone();
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
                Box::pin(async move {
                    claim_loop(queue, worker_id, db, processors, shutdown).await;
                });
            slots.spawn(fut);
        }
    }

    while let Some(result) = slots.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "Worker slot panicked");
        }
    }

    info!("Worker loops drained");
    Ok(())
}

fn claim_loop(
    queue: JobQueue,
    worker_id: String,
    db: Arc<SurrealDbClient>,
    processors: Processors,
    mut shutdown: watch::Receiver<bool>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        info!(%worker_id, queue = queue.as_str(), "Worker slot started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            claim_iteration(
                queue,
                worker_id.clone(),
                db.clone(),
                processors.clone(),
                &mut shutdown,
            )
            .await;
        }

        info!(%worker_id, queue = queue.as_str(), "Worker slot stopped");
    })
}

async fn claim_iteration(
    queue: JobQueue,
    worker_id: String,
    db: Arc<SurrealDbClient>,
    processors: Processors,
    shutdown: &mut watch::Receiver<bool>,
) {
    match Job::claim_next_ready(queue, &worker_id, Utc::now(), &db).await {
        Ok(Some(job)) => {
            info!(
                %worker_id,
                job_id = %job.id,
                attempt = job.attempts,
                "Claimed job"
            );
            run_job(&db, &processors, job).await;
        }
        Ok(None) => {
            tokio::select! {
                _ = sleep(IDLE_BACKOFF) => {}
                _ = shutdown.changed() => {}
            }
        }
        Err(err) => {
            error!(%worker_id, error = %err, "Failed to claim job, backing off");
            tokio::select! {
                _ = sleep(Duration::from_secs(1)) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

async fn run_job(db: &Arc<SurrealDbClient>, processors: &Processors, job: Job) {
    let progress = progress_reporter(db.clone(), job.id.clone());

    let outcome = match &job.payload {
        JobPayload::Resource { resource_id } => {
            processors.resources.process(resource_id, progress).await
        }
        JobPayload::Document { document_id } => {
            processors.documents.process(document_id, progress).await
        }
    };

    match outcome {
        Ok(()) => {
            if let Err(err) = Box::pin(Job::mark_succeeded(&job.id, db)).await {
                error!(job_id = %job.id, error = %err, "Failed to mark job succeeded");
            }
        }
        Err(err) => {
            warn!(job_id = %job.id, attempt = job.attempts, error = %err, "Job failed");
            if let Err(mark_err) =
                Box::pin(Job::mark_failed(&job.id, job.attempts, &err.to_string(), db)).await
            {
                error!(job_id = %job.id, error = %mark_err, "Failed to mark job failed");
            }
        }
    }
}

/// Progress callback that persists percentages without blocking the handler.
fn progress_reporter(db: Arc<SurrealDbClient>, job_id: String) -> ProgressFn {
    Arc::new(move |pct: u8| {
        let db = db.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if let Err(err) = Job::set_progress(&job_id, pct, &db).await {
                warn!(%job_id, error = %err, "Failed to persist job progress");
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::job::JobState;
    use common::storage::types::resource::{Resource, ResourceStatus};
    use crate::extractor::EntityExtractor;
    use common::utils::config::AppConfig;
    use common::utils::embedding::EmbeddingClient;
    use common::{storage::store::StorageManager, utils::config::StorageKind};

    async fn setup() -> (Arc<SurrealDbClient>, Processors) {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        );

        let config = AppConfig {
            storage: StorageKind::Memory,
            ..Default::default()
        };
        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));
        let embedder = EmbeddingClient::new(openai_client.clone(), &config);
        let storage = StorageManager::new(&config).await.expect("storage");

        let processors = Processors {
            resources: Arc::new(
                ResourceProcessor::new(
                    db.clone(),
                    EntityExtractor::new(openai_client.clone(), config.chat_model.clone()),
                    embedder.clone(),
                    &config,
                )
                .expect("resource processor"),
            ),
            documents: Arc::new(DocumentProcessor::new(db.clone(), storage, embedder)),
        };

        (db, processors)
    }

    #[tokio::test]
    async fn failed_job_is_rescheduled_with_backoff() {
        let (db, processors) = setup().await;

        // A job pointing at a missing resource fails permanently at the
        // processor level but still goes through the retry bookkeeping.
        let job_id = Job::enqueue(
            JobQueue::ResourceProcess,
            JobPayload::Resource {
                resource_id: "missing".into(),
            },
            &db,
        )
        .await
        .expect("enqueue");

        let job = Job::claim_next_ready(JobQueue::ResourceProcess, "test-worker", Utc::now(), &db)
            .await
            .expect("claim")
            .expect("job present");
        run_job(&db, &processors, job).await;

        let job = Job::get(&job_id, &db).await.expect("get");
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error_message.is_some());
        assert!(
            job.scheduled_at > Utc::now(),
            "retry must be scheduled in the future"
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker_loop() {
        let (db, processors) = setup().await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker_loop(db, processors, rx));

        sleep(Duration::from_millis(50)).await;
        tx.send(true).expect("signal shutdown");

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker loop must stop after shutdown")
            .expect("join");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn resource_job_marks_resource_error_on_failure() {
        let (db, processors) = setup().await;

        // Resource with an unroutable URL: download fails, resource goes to
        // error, job records the failure.
        let resource = Resource::new(
            "res-1".into(),
            "acordaos".into(),
            None,
            "http://127.0.0.1:1/dump.json".into(),
            Some("JSON".into()),
        );
        db.store_item(resource).await.expect("store resource");

        let job_id = Job::enqueue(
            JobQueue::ResourceProcess,
            JobPayload::Resource {
                resource_id: "res-1".into(),
            },
            &db,
        )
        .await
        .expect("enqueue");

        let job = Job::claim_next_ready(JobQueue::ResourceProcess, "test-worker", Utc::now(), &db)
            .await
            .expect("claim")
            .expect("job present");
        run_job(&db, &processors, job).await;

        let resource = Resource::get("res-1", &db).await.expect("get resource");
        assert_eq!(resource.status, ResourceStatus::Error);

        let job = Job::get(&job_id, &db).await.expect("get job");
        assert_eq!(job.state, JobState::Failed);
    }
}
