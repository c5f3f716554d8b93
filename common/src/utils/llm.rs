use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::debug;

use crate::error::AppError;

pub type OpenAIClient = async_openai::Client<async_openai::config::OpenAIConfig>;

/// Default deadline for chat completions.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for the longer community summarization calls.
pub const SUMMARY_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Perform a chat completion constrained to a strict JSON schema and parse the
/// response into `T`. Schema violations and empty responses surface as
/// `LLMParsing` errors so callers can classify them as permanent.
pub async fn chat_structured<T: DeserializeOwned>(
    client: &OpenAIClient,
    model: &str,
    system_message: &str,
    user_message: String,
    schema_name: &str,
    schema: serde_json::Value,
    deadline: Duration,
) -> Result<T, AppError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: schema_name.into(),
            schema: Some(schema),
            strict: Some(true),
        },
    };

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(system_message).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .response_format(response_format)
        .build()?;

    let response = timeout(deadline, client.chat().create(request))
        .await
        .map_err(|_| AppError::InternalError("LLM request timed out".into()))??;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or(AppError::LLMParsing(
            "No content found in LLM response".into(),
        ))?;

    debug!("LLM structured response: {}", content);

    serde_json::from_str::<T>(content).map_err(|e| {
        AppError::LLMParsing(format!("Failed to parse LLM response into {schema_name}: {e}"))
    })
}

/// Perform a free-form chat completion and return the raw answer text.
pub async fn chat_text(
    client: &OpenAIClient,
    model: &str,
    system_message: &str,
    user_message: String,
    deadline: Duration,
) -> Result<String, AppError> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(system_message).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()?;

    let response = timeout(deadline, client.chat().create(request))
        .await
        .map_err(|_| AppError::InternalError("LLM request timed out".into()))??;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or(AppError::LLMParsing(
            "No content found in LLM response".into(),
        ))
}
