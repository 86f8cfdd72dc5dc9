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
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Whether a role survives extraction for formats that keep only
    /// conversational turns (ChatGPT, Claude, OpenWebUI drop `system`/`tool`).
    pub fn is_conversational(self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

/// A polymorphic attachment embedded in a message's metadata JSON (§3, §9).
///
/// `available=true` means the attachment's textual content was captured in
/// the export and is part of what the message is searchable by; `false`
/// denotes a reference-only placeholder (e.g. an image with no OCR/caption).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    File {
        file_name: String,
        file_size: Option<u64>,
        file_type: Option<String>,
        extracted_content: Option<String>,
        available: bool,
    },
    Image {
        file_name: String,
        file_type: Option<String>,
        available: bool,
    },
    Code {
        file_name: Option<String>,
        language: Option<String>,
        extracted_content: String,
        available: bool,
    },
    Reasoning {
        extracted_content: String,
        available: bool,
    },
    Audio {
        file_name: String,
        extracted_content: Option<String>,
        available: bool,
    },
    Citation {
        url: Option<String>,
        title: Option<String>,
        available: bool,
    },
    Artifact {
        file_name: String,
        artifact_type: Option<String>,
        extracted_content: Option<String>,
        available: bool,
    },
}

impl Attachment {
    pub fn available(&self) -> bool {
        match self {
            Attachment::File { available, .. }
            | Attachment::Image { available, .. }
            | Attachment::Code { available, .. }
            | Attachment::Reasoning { available, .. }
            | Attachment::Audio { available, .. }
            | Attachment::Citation { available, .. }
            | Attachment::Artifact { available, .. } => *available,
        }
    }
}

/// Per-message metadata: source tag, the extractor-reported conversation id
/// (used by `DuplicateGuard`), and any attachments. Stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    pub source: Option<String>,
    pub original_conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Fields needed to insert a new message row, in extractor emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub metadata: MessageMetadata,
}

/// Counters returned by `Messages::get_message_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageStats {
    pub total: i64,
    pub by_role: std::collections::HashMap<String, i64>,
    pub embedding_coverage_pct: f64,
    pub created_last_24h: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_tag_round_trips_through_json() {
        let a = Attachment::Code {
            file_name: Some("main.rs".into()),
            language: Some("rust".into()),
            extracted_content: "fn main() {}".into(),
            available: true,
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "code");
        let back: Attachment = serde_json::from_value(json).unwrap();
        assert!(back.available());
    }

    #[test]
    fn role_conversational_filters_system() {
        assert!(Role::User.is_conversational());
        assert!(Role::Assistant.is_conversational());
        assert!(!Role::System.is_conversational());
    }
}
