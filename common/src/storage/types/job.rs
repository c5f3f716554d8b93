use chrono::Duration;
use std::future::IntoFuture;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const MAX_ATTEMPTS: u32 = 3;
/// Base delay for the exponential retry backoff.
pub const RETRY_BASE_DELAY_SECS: i64 = 5;
/// Retention: completed and terminally failed jobs kept on the broker.
pub const KEEP_COMPLETED: usize = 100;
pub const KEEP_FAILED: usize = 50;

/// The two logical queues and their per-queue concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JobQueue {
    #[serde(rename = "resource-process")]
    ResourceProcess,
    #[serde(rename = "document-process")]
    DocumentProcess,
}

impl JobQueue {
    pub const ALL: [JobQueue; 2] = [JobQueue::ResourceProcess, JobQueue::DocumentProcess];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobQueue::ResourceProcess => "resource-process",
            JobQueue::DocumentProcess => "document-process",
        }
    }

    /// Resource jobs are serialized (the same resource must never run twice
    /// concurrently); document jobs may overlap.
    pub fn concurrency(&self) -> usize {
        match self {
            JobQueue::ResourceProcess => 1,
            JobQueue::DocumentProcess => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Resource { resource_id: String },
    Document { document_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

stored_object!(Job, "job", {
    queue: JobQueue,
    payload: JobPayload,
    state: JobState,
    attempts: u32,
    max_attempts: u32,
    progress: u8,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    scheduled_at: DateTime<Utc>,
    worker_id: Option<String>,
    error_message: Option<String>
});

impl Job {
    pub fn new(queue: JobQueue, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            queue,
            payload,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            progress: 0,
            scheduled_at: now,
            worker_id: None,
            error_message: None,
        }
    }

    /// Durably enqueue a job. Returns the job id; a broker failure surfaces
    /// as an error so the API can report that async processing is required.
    pub async fn enqueue(
        queue: JobQueue,
        payload: JobPayload,
        db: &SurrealDbClient,
    ) -> Result<String, AppError> {
        let job = Self::new(queue, payload);
        let id = job.id.clone();
        db.store_item(job)
            .await?
            .ok_or_else(|| AppError::InternalError("broker did not accept the job".into()))?;
        Ok(id)
    }

    /// Atomically claim the next runnable job on a queue: pending jobs, plus
    /// failed ones whose backoff has elapsed and that still have attempts
    /// left. The claim flips the state and bumps the attempt counter in the
    /// same transaction.
    pub async fn claim_next_ready(
        queue: JobQueue,
        worker_id: &str,
        now: DateTime<Utc>,
        db: &SurrealDbClient,
    ) -> Result<Option<Job>, AppError> {
        let mut response = Box::pin(
            db.client
                .query(
                    "UPDATE (
                     SELECT VALUE id FROM job
                     WHERE queue = $queue
                       AND scheduled_at <= $now
                       AND (
                           state = 'pending'
                           OR (state = 'failed' AND attempts < max_attempts)
                       )
                     ORDER BY scheduled_at ASC
                     LIMIT 1
                 ) SET
                     state = 'processing',
                     attempts += 1,
                     worker_id = $worker_id,
                     updated_at = time::now()
                 RETURN AFTER",
                )
                .bind(("queue", queue))
                .bind(("now", surrealdb::Datetime::from(now)))
                .bind(("worker_id", worker_id.to_owned()))
                .into_future(),
        )
        .await?;

        let job: Option<Job> = response.take(0)?;
        Ok(job)
    }

    /// Publish handler progress (percent complete).
    pub async fn set_progress(id: &str, progress: u8, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('job', $id) SET
                     progress = $progress,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("progress", progress.min(100)))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn mark_succeeded(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('job', $id) SET
                     state = 'succeeded',
                     progress = 100,
                     error_message = NONE,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .await?
            .check()?;

        Self::prune_finished(db).await
    }

    /// Record a failure. While attempts remain the job is rescheduled with
    /// exponential backoff; otherwise it stays failed for good.
    pub async fn mark_failed(
        id: &str,
        attempts: u32,
        error_message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let next_attempt = Utc::now() + Self::retry_delay(attempts);

        db.client
            .query(
                "UPDATE type::thing('job', $id) SET
                     state = 'failed',
                     error_message = $error_message,
                     scheduled_at = $scheduled_at,
                     updated_at = time::now()",
            )
            .bind(("id", id.to_owned()))
            .bind(("error_message", error_message.to_owned()))
            .bind(("scheduled_at", surrealdb::Datetime::from(next_attempt)))
            .await?
            .check()?;

        Self::prune_finished(db).await
    }

    /// Exponential backoff: 5s, 10s, 20s, ...
    pub fn retry_delay(attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(10);
        Duration::seconds(RETRY_BASE_DELAY_SECS << exponent)
    }

    /// Keep only the most recent completed/terminally-failed jobs.
    async fn prune_finished(db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "DELETE job WHERE id IN (
                     SELECT VALUE id FROM job
                     WHERE state = 'succeeded'
                     ORDER BY updated_at DESC
                     START $keep_completed
                 );
                 DELETE job WHERE id IN (
                     SELECT VALUE id FROM job
                     WHERE state = 'failed' AND attempts >= max_attempts
                     ORDER BY updated_at DESC
                     START $keep_failed
                 );",
            )
            .bind(("keep_completed", KEEP_COMPLETED))
            .bind(("keep_failed", KEEP_FAILED))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Job, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
    }
}
