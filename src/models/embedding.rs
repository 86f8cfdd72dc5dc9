use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEmbedding {
    pub message_id: Uuid,
    pub model: String,
    #[serde(skip)]
    pub vector: Vector,
    pub created_at: DateTime<Utc>,
}

/// Candidate row from a vector nearest-neighbour query: the message plus its
/// cosine similarity to the query vector (1.0 = identical).
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub message_id: Uuid,
    pub similarity: f64,
}

/// Coverage stats returned by `Embeddings::get_coverage_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddingCoverage {
    pub embedded_messages: i64,
    pub total_messages: i64,
    pub coverage_pct: f64,
}
