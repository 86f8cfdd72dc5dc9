//! Claude format extractor.
//!
//! Claude exports are a flat `chat_messages` array per conversation, each
//! with a `sender` (`human` or anything else) and `text`.

use super::{clean_message_content, Extractor, ExtractedMessage, ExtractorMetadata};
use crate::error::Result;
use crate::models::message::{Attachment, Role};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub struct ClaudeExtractor;

impl Extractor for ClaudeExtractor {
    fn key(&self) -> &'static str {
        "claude"
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "Claude",
            version: "1.0.0",
            description: "Extracts messages from Claude's chat_messages list format.",
            supported_extensions: vec![".json"],
            auto_detect: true,
            file_based: false,
        }
    }

    fn detect(&self, data: &Value) -> bool {
        data.get("uuid").map(|u| !u.is_null()).unwrap_or(false)
            && data.get("name").is_some()
            && data.get("chat_messages").map(|m| m.is_array()).unwrap_or(false)
    }

    fn origin_id(&self, data: &Value) -> Option<String> {
        data.get("uuid").and_then(|v| v.as_str()).map(String::from)
    }

    fn extract(&self, data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>> {
        let title = data
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(String::from);

        let Some(chat_messages) = data.get("chat_messages").and_then(|m| m.as_array()) else {
            return Ok(vec![(title, Vec::new())]);
        };

        let mut messages = Vec::new();

        for entry in chat_messages {
            let sender = entry.get("sender").and_then(|s| s.as_str()).unwrap_or("");
            let role = if sender == "human" { Role::User } else { Role::Assistant };

            let content = entry.get("text").and_then(|t| t.as_str()).unwrap_or("").trim();

            let attachments = extract_attachments(entry);

            if content.is_empty() && attachments.is_empty() {
                continue;
            }

            let created_at = entry
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(parse_iso8601);

            messages.push(ExtractedMessage {
                role,
                content: clean_message_content(content),
                created_at,
                attachments,
                extra_metadata: Value::Null,
            });
        }

        Ok(vec![(title, messages)])
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Attachments from `attachments[]` (text files, available), `files[]`
/// (image references, unavailable), and `content[]` artifact tool-use
/// blocks (treated as file attachments).
fn extract_attachments(entry: &Value) -> Vec<Attachment> {
    let mut out = Vec::new();

    if let Some(files) = entry.get("attachments").and_then(|a| a.as_array()) {
        for file in files {
            let file_name = file
                .get("file_name")
                .and_then(|n| n.as_str())
                .unwrap_or("attachment")
                .to_string();
            let extracted_content = file
                .get("extracted_content")
                .and_then(|c| c.as_str())
                .map(|c| clean_message_content(c));
            out.push(Attachment::File {
                file_name,
                file_size: file.get("file_size").and_then(|s| s.as_u64()),
                file_type: file.get("file_type").and_then(|t| t.as_str()).map(String::from),
                available: extracted_content.is_some(),
                extracted_content,
            });
        }
    }

    if let Some(files) = entry.get("files").and_then(|f| f.as_array()) {
        for file in files {
            let file_name = file
                .get("file_name")
                .and_then(|n| n.as_str())
                .unwrap_or("image")
                .to_string();
            out.push(Attachment::Image {
                file_name,
                file_type: file.get("file_type").and_then(|t| t.as_str()).map(String::from),
                available: false,
            });
        }
    }

    if let Some(blocks) = entry.get("content").and_then(|c| c.as_array()) {
        for block in blocks {
            let is_artifact = block.get("type").and_then(|t| t.as_str()) == Some("tool_use")
                && block.get("name").and_then(|n| n.as_str()) == Some("artifacts");
            if !is_artifact {
                continue;
            }
            let input = block.get("input");
            let title = input.and_then(|i| i.get("title")).and_then(|t| t.as_str());
            let artifact_type = input
                .and_then(|i| i.get("type"))
                .and_then(|t| t.as_str())
                .map(String::from);
            let extension = artifact_type
                .as_deref()
                .map(extension_for_artifact_type)
                .unwrap_or("md");
            let file_name = format!("{}.{extension}", title.unwrap_or("artifact"));
            let extracted_content = input
                .and_then(|i| i.get("content"))
                .and_then(|c| c.as_str())
                .map(|c| clean_message_content(c));
            out.push(Attachment::Artifact {
                file_name,
                artifact_type,
                available: extracted_content.is_some(),
                extracted_content,
            });
        }
    }

    out
}

fn extension_for_artifact_type(artifact_type: &str) -> &'static str {
    if artifact_type.contains("html") {
        "html"
    } else if artifact_type.contains("code") {
        "txt"
    } else {
        "md"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_claude_signature_with_empty_name() {
        let data = json!({"uuid": "abc", "name": "", "chat_messages": []});
        assert!(ClaudeExtractor.detect(&data));
    }

    #[test]
    fn maps_human_to_user_and_others_to_assistant() {
        let data = json!({
            "uuid": "abc",
            "name": "chat",
            "chat_messages": [
                {"sender": "human", "text": "hi", "created_at": "2024-01-01T00:00:00Z"},
                {"sender": "assistant", "text": "hello", "created_at": "2024-01-01T00:00:01Z"},
            ]
        });
        let (_, messages) = ClaudeExtractor.extract(&data).unwrap().remove(0);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn artifact_tool_use_becomes_file_attachment() {
        let data = json!({
            "uuid": "abc",
            "name": "chat",
            "chat_messages": [{
                "sender": "assistant",
                "text": "here you go",
                "content": [{
                    "type": "tool_use",
                    "name": "artifacts",
                    "input": {"title": "demo", "type": "text/html", "content": "<p>hi</p>"}
                }]
            }]
        });
        let (_, messages) = ClaudeExtractor.extract(&data).unwrap().remove(0);
        assert_eq!(messages[0].attachments.len(), 1);
        match &messages[0].attachments[0] {
            Attachment::Artifact { file_name, .. } => assert_eq!(file_name, "demo.html"),
            other => panic!("unexpected attachment: {other:?}"),
        }
    }
}
