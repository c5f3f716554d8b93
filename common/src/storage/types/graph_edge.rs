use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Closed set of relationship types between graph entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    RelatorDe,
    JulgadoPor,
    Referencia,
    CitaPrecedente,
    TrataDe,
    SimilarA,
    PertenceA,
    ParteEm,
    Fundamenta,
    Aplica,
    Contraria,
    Confirma,
}

impl RelationshipType {
    pub fn variants() -> &'static [&'static str] {
        &[
            "RELATOR_DE",
            "JULGADO_POR",
            "REFERENCIA",
            "CITA_PRECEDENTE",
            "TRATA_DE",
            "SIMILAR_A",
            "PERTENCE_A",
            "PARTE_EM",
            "FUNDAMENTA",
            "APLICA",
            "CONTRARIA",
            "CONFIRMA",
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::RelatorDe => "RELATOR_DE",
            RelationshipType::JulgadoPor => "JULGADO_POR",
            RelationshipType::Referencia => "REFERENCIA",
            RelationshipType::CitaPrecedente => "CITA_PRECEDENTE",
            RelationshipType::TrataDe => "TRATA_DE",
            RelationshipType::SimilarA => "SIMILAR_A",
            RelationshipType::PertenceA => "PERTENCE_A",
            RelationshipType::ParteEm => "PARTE_EM",
            RelationshipType::Fundamenta => "FUNDAMENTA",
            RelationshipType::Aplica => "APLICA",
            RelationshipType::Contraria => "CONTRARIA",
            RelationshipType::Confirma => "CONFIRMA",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "RELATOR_DE" => Some(RelationshipType::RelatorDe),
            "JULGADO_POR" => Some(RelationshipType::JulgadoPor),
            "REFERENCIA" => Some(RelationshipType::Referencia),
            "CITA_PRECEDENTE" => Some(RelationshipType::CitaPrecedente),
            "TRATA_DE" => Some(RelationshipType::TrataDe),
            "SIMILAR_A" => Some(RelationshipType::SimilarA),
            "PERTENCE_A" => Some(RelationshipType::PertenceA),
            "PARTE_EM" => Some(RelationshipType::ParteEm),
            "FUNDAMENTA" => Some(RelationshipType::Fundamenta),
            "APLICA" => Some(RelationshipType::Aplica),
            "CONTRARIA" => Some(RelationshipType::Contraria),
            "CONFIRMA" => Some(RelationshipType::Confirma),
            _ => None,
        }
    }
}

stored_object!(GraphEdge, "graph_edge", {
    source: String,
    target: String,
    relationship_type: RelationshipType,
    description: String,
    weight: f64
});

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelationshipTypeCount {
    pub relationship_type: RelationshipType,
    pub count: i64,
}

impl GraphEdge {
    /// Create a new edge between two entity ids. The weight is clamped into
    /// `[0, 1]` on construction so it never leaves that range downstream.
    pub fn new(
        source: String,
        target: String,
        relationship_type: RelationshipType,
        description: String,
        weight: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source,
            target,
            relationship_type,
            description,
            weight: weight.clamp(0.0, 1.0),
        }
    }

    /// Bulk append edges in a single transaction. Callers must upsert the
    /// referenced nodes first.
    pub async fn insert_many(edges: Vec<GraphEdge>, db: &SurrealDbClient) -> Result<(), AppError> {
        if edges.is_empty() {
            return Ok(());
        }

        db.client
            .query(
                "BEGIN TRANSACTION;
                 FOR $edge IN $edges {
                     CREATE type::thing('graph_edge', $edge.id) CONTENT $edge;
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("edges", edges))
            .await?
            .check()?;

        Ok(())
    }

    /// All edges incident to an entity, strongest first.
    pub async fn incident_to(
        entity_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<GraphEdge>, AppError> {
        let edges: Vec<GraphEdge> = db
            .client
            .query(
                "SELECT * FROM graph_edge
                 WHERE source == $entity_id OR target == $entity_id
                 ORDER BY weight DESC
                 LIMIT $limit",
            )
            .bind(("entity_id", entity_id.to_owned()))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(edges)
    }

    pub async fn stats_by_type(
        db: &SurrealDbClient,
    ) -> Result<Vec<RelationshipTypeCount>, AppError> {
        let rows: Vec<RelationshipTypeCount> = db
            .client
            .query(
                "SELECT relationship_type, count() AS count FROM graph_edge
                 GROUP BY relationship_type ORDER BY count DESC",
            )
            .await?
            .take(0)?;

        Ok(rows)
    }
}
