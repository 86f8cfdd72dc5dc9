use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source archive format a conversation was imported from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumString, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Chatgpt,
    Claude,
    Openwebui,
    Docx,
    Youtube,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub source: Option<Source>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a new conversation row. `created_at`/`updated_at`
/// are the importer's derived earliest/latest message timestamps (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    pub title: String,
    pub source: Option<Source>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters returned by `Conversations::get_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversationStats {
    pub total_conversations: i64,
    pub total_messages: i64,
    /// Count of conversations per normalised source tag (see §9.1).
    pub by_source: std::collections::HashMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn source_round_trips_through_display_and_from_str() {
        for s in [
            Source::Chatgpt,
            Source::Claude,
            Source::Openwebui,
            Source::Docx,
            Source::Youtube,
            Source::Unknown,
        ] {
            let text = s.to_string();
            assert_eq!(Source::from_str(&text).unwrap(), s);
        }
    }
}
