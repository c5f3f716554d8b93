use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Rate limited, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

/// Message fragments that mark an error as transient and therefore retryable.
/// Compared case-insensitively against the whole error source chain.
const TRANSIENT_MARKERS: [&str; 9] = [
    "429",
    "502",
    "503",
    "econnrefused",
    "etimedout",
    "fetch failed",
    "network",
    "timed out",
    "connection",
];

impl AppError {
    /// Classify an error as transient (retry at the job/client layer) or
    /// permanent (surface and do not retry). Pure function of the error value.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Reqwest(err) => {
                err.is_timeout() || err.is_connect() || transient_by_chain(err)
            }
            AppError::OpenAI(err) => transient_by_chain(err),
            AppError::Database(err) => transient_by_chain(err),
            AppError::ObjectStore(err) => transient_by_chain(err),
            AppError::LLMParsing(_)
            | AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::Auth(_)
            | AppError::Config(_)
            | AppError::RateLimited { .. } => false,
            other => transient_by_message(&other.to_string()),
        }
    }
}

fn transient_by_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Check the error and every cause beneath it; transport failures often only
/// surface their nature deep in the source chain.
fn transient_by_chain(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if transient_by_message(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}
