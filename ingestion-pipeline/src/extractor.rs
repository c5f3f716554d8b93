use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::warn;

use common::{
    error::AppError,
    storage::types::{graph_edge::RelationshipType, graph_node::EntityType},
    utils::{
        llm::{chat_structured, OpenAIClient, DEFAULT_LLM_TIMEOUT},
        slug::entity_id,
    },
};

use crate::chunking::Chunk;

/// Pause between per-chunk LLM calls to stay under gateway rate limits.
const INTER_CALL_PAUSE: Duration = Duration::from_millis(300);
/// Weight assigned to relationships the LLM returned without one.
const DEFAULT_WEIGHT: f64 = 0.5;

const EXTRACTION_SYSTEM_MESSAGE: &str = "\
Você é um extrator de entidades jurídicas do Superior Tribunal de Justiça. \
A partir do trecho fornecido, identifique entidades (ministros, processos, \
órgãos julgadores, temas, legislação, partes, precedentes, decisões e \
conceitos jurídicos) e os relacionamentos entre elas. Use somente os tipos \
permitidos pelo schema e descreva cada item em português, de forma concisa.";

#[derive(Debug, Deserialize)]
struct RawExtraction {
    entities: Vec<RawEntity>,
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    entity_type: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source_name: String,
    source_type: String,
    target_name: String,
    target_type: String,
    relationship_type: String,
    description: String,
    #[serde(default)]
    weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub description: String,
    pub mentions: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

pub struct EntityExtractor {
    client: Arc<OpenAIClient>,
    model: String,
}

impl EntityExtractor {
    pub fn new(client: Arc<OpenAIClient>, model: String) -> Self {
        Self { client, model }
    }

    /// Extract entities and relationships from one chunk. Transient gateway
    /// failures are re-raised so the surrounding job retries; malformed LLM
    /// output degrades to an empty result.
    pub async fn extract(&self, chunk: &Chunk) -> Result<ExtractionResult, AppError> {
        let raw = chat_structured::<RawExtraction>(
            &self.client,
            &self.model,
            EXTRACTION_SYSTEM_MESSAGE,
            format!("Trecho:\n{}", chunk.text),
            "entity_extraction",
            extraction_schema(),
            DEFAULT_LLM_TIMEOUT,
        )
        .await;

        match raw {
            Ok(raw) => Ok(parse_extraction(raw)),
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                warn!(error = %err, "Entity extraction failed permanently, returning empty result");
                Ok(ExtractionResult::default())
            }
        }
    }

    /// Extract across chunks sequentially, deduplicating entities by id and
    /// concatenating relationships. Progress is reported after each chunk.
    pub async fn extract_many(
        &self,
        chunks: &[Chunk],
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<ExtractionResult, AppError> {
        let mut merged = ExtractionResult::default();
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            let result = self.extract(chunk).await?;
            merge_results(&mut merged, result);
            on_progress(i + 1, total);

            if i + 1 < total {
                sleep(INTER_CALL_PAUSE).await;
            }
        }

        Ok(merged)
    }
}

/// Strict response schema for the extraction call.
fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "entity_type": { "type": "string", "enum": EntityType::variants() },
                        "description": { "type": "string" }
                    },
                    "required": ["name", "entity_type", "description"],
                    "additionalProperties": false
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source_name": { "type": "string" },
                        "source_type": { "type": "string", "enum": EntityType::variants() },
                        "target_name": { "type": "string" },
                        "target_type": { "type": "string", "enum": EntityType::variants() },
                        "relationship_type": {
                            "type": "string",
                            "enum": RelationshipType::variants()
                        },
                        "description": { "type": "string" },
                        "weight": { "type": ["number", "null"] }
                    },
                    "required": [
                        "source_name",
                        "source_type",
                        "target_name",
                        "target_type",
                        "relationship_type",
                        "description",
                        "weight"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["entities", "relationships"],
        "additionalProperties": false
    })
}

/// Validate the raw LLM shapes against the closed sets, derive stable ids and
/// clamp weights. Rows with unknown types are dropped, not defaulted.
fn parse_extraction(raw: RawExtraction) -> ExtractionResult {
    let mut entities = Vec::new();
    for raw_entity in raw.entities {
        let Some(entity_type) = EntityType::parse(&raw_entity.entity_type) else {
            warn!(
                entity_type = %raw_entity.entity_type,
                name = %raw_entity.name,
                "Dropping entity with unknown type"
            );
            continue;
        };
        if raw_entity.name.trim().is_empty() {
            continue;
        }
        entities.push(ExtractedEntity {
            id: entity_id(&raw_entity.name, entity_type),
            name: raw_entity.name.trim().to_string(),
            entity_type,
            description: raw_entity.description,
            mentions: 1,
        });
    }

    let mut relationships = Vec::new();
    for raw_rel in raw.relationships {
        let (Some(source_type), Some(target_type)) = (
            EntityType::parse(&raw_rel.source_type),
            EntityType::parse(&raw_rel.target_type),
        ) else {
            warn!("Dropping relationship with unknown endpoint type");
            continue;
        };
        let Some(relationship_type) = RelationshipType::parse(&raw_rel.relationship_type) else {
            warn!(
                relationship_type = %raw_rel.relationship_type,
                "Dropping relationship with unknown type"
            );
            continue;
        };

        relationships.push(ExtractedRelationship {
            source_id: entity_id(&raw_rel.source_name, source_type),
            target_id: entity_id(&raw_rel.target_name, target_type),
            relationship_type,
            description: raw_rel.description,
            weight: raw_rel.weight.unwrap_or(DEFAULT_WEIGHT).clamp(0.0, 1.0),
        });
    }

    ExtractionResult {
        entities,
        relationships,
    }
}

/// Merge a chunk's result into the accumulator: entities deduplicate by id
/// (counting mentions), relationships concatenate.
fn merge_results(accumulator: &mut ExtractionResult, incoming: ExtractionResult) {
    for entity in incoming.entities {
        match accumulator
            .entities
            .iter_mut()
            .find(|existing| existing.id == entity.id)
        {
            Some(existing) => existing.mentions += entity.mentions,
            None => accumulator.entities.push(entity),
        }
    }
    accumulator.relationships.extend(incoming.relationships);
}
