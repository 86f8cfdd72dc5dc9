use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumString, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Leased,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
}

/// Payload shape for a `generate_embedding` job (§4.2 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateEmbeddingPayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub model: String,
}

/// Aggregate counters returned by `Jobs::get_queue_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub leased: i64,
    pub completed: i64,
    pub failed: i64,
}

pub const GENERATE_EMBEDDING: &str = "generate_embedding";
