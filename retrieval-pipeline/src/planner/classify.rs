use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use common::{
    error::AppError,
    utils::llm::{chat_structured, OpenAIClient, DEFAULT_LLM_TIMEOUT},
};

const CLASSIFY_SYSTEM_MESSAGE: &str = "\
Você classifica consultas jurídicas sobre o STJ para um sistema GraphRAG. \
'local' quando a consulta cita entidades específicas (ministros, processos, \
leis); 'global' quando pede panoramas, tendências ou temas amplos; 'hybrid' \
quando mistura os dois ou é ambígua. Explique brevemente o raciocínio.";

const QUERY_ENTITIES_SYSTEM_MESSAGE: &str = "\
Liste os nomes das entidades jurídicas (ministros, processos, órgãos, leis, \
temas, partes) mencionadas na consulta. Responda apenas com os nomes, sem \
inventar entidades que não aparecem no texto.";

/// Which retrievers a query activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Local,
    Global,
    Hybrid,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Local => "local",
            QueryMode::Global => "global",
            QueryMode::Hybrid => "hybrid",
        }
    }

    pub fn runs_local(&self) -> bool {
        matches!(self, QueryMode::Local | QueryMode::Hybrid)
    }

    pub fn runs_global(&self) -> bool {
        matches!(self, QueryMode::Global | QueryMode::Hybrid)
    }
}

#[derive(Debug, Deserialize)]
struct Classification {
    query_type: QueryMode,
    reasoning: String,
}

/// Classify the query; any failure defaults to `hybrid` so retrieval still
/// runs every strategy.
pub async fn classify_query(
    client: &OpenAIClient,
    model: &str,
    query: &str,
) -> (QueryMode, String) {
    let result = chat_structured::<Classification>(
        client,
        model,
        CLASSIFY_SYSTEM_MESSAGE,
        format!("Consulta:\n{query}"),
        "query_classification",
        json!({
            "type": "object",
            "properties": {
                "query_type": { "type": "string", "enum": ["local", "global", "hybrid"] },
                "reasoning": { "type": "string" }
            },
            "required": ["query_type", "reasoning"],
            "additionalProperties": false
        }),
        DEFAULT_LLM_TIMEOUT,
    )
    .await;

    match result {
        Ok(classification) => (classification.query_type, classification.reasoning),
        Err(err) => {
            warn!(error = %err, "Query classification failed, defaulting to hybrid");
            (
                QueryMode::Hybrid,
                "Classificação indisponível; usando estratégia híbrida.".to_string(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryEntities {
    entities: Vec<String>,
}

/// Entity names mentioned in the query; errors are suppressed to an empty
/// list.
pub async fn query_entities(client: &OpenAIClient, model: &str, query: &str) -> Vec<String> {
    let result = chat_structured::<QueryEntities>(
        client,
        model,
        QUERY_ENTITIES_SYSTEM_MESSAGE,
        format!("Consulta:\n{query}"),
        "query_entities",
        json!({
            "type": "object",
            "properties": {
                "entities": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["entities"],
            "additionalProperties": false
        }),
        DEFAULT_LLM_TIMEOUT,
    )
    .await;

    match result {
        Ok(parsed) => parsed
            .entities
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .collect(),
        Err(err) => {
            warn!(error = %err, "Query entity extraction failed, continuing without names");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> OpenAIClient {
        async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key("test")
                .with_api_base("http://127.0.0.1:1"),
        )
    }

    #[test]
    fn mode_flags_follow_the_classification() {
        assert!(QueryMode::Local.runs_local());
        assert!(!QueryMode::Local.runs_global());
        assert!(QueryMode::Global.runs_global());
        assert!(!QueryMode::Global.runs_local());
        assert!(QueryMode::Hybrid.runs_local());
        assert!(QueryMode::Hybrid.runs_global());
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(QueryMode::Hybrid.as_str(), "hybrid");
        let parsed: QueryMode = serde_json::from_str("\"global\"").expect("parse");
        assert_eq!(parsed, QueryMode::Global);
    }

    #[tokio::test]
    async fn classification_defaults_to_hybrid_on_failure() {
        let client = unreachable_client();
        let (mode, reasoning) = classify_query(&client, "gpt-4o-mini", "qualquer coisa").await;
        assert_eq!(mode, QueryMode::Hybrid);
        assert!(!reasoning.is_empty());
    }

    #[tokio::test]
    async fn entity_extraction_failure_is_an_empty_list() {
        let client = unreachable_client();
        let names = query_entities(&client, "gpt-4o-mini", "REsp 1.234/SP").await;
        assert!(names.is_empty());
    }
}
