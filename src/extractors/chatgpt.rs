//! ChatGPT format extractor.
//!
//! Walks ChatGPT's node-based `mapping` structure: a dict of node_id ->
//! node_data with parent/child links. Grounded in the original
//! `db/importers/chatgpt.py` extractor.

use super::{clean_message_content, Extractor, ExtractedMessage, ExtractorMetadata};
use crate::error::Result;
use crate::models::message::{Attachment, Role};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub struct ChatGptExtractor;

impl Extractor for ChatGptExtractor {
    fn key(&self) -> &'static str {
        "chatgpt"
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "ChatGPT",
            version: "1.0.0",
            description: "Extracts messages from ChatGPT's node-based mapping structure.",
            supported_extensions: vec![".json"],
            auto_detect: true,
            file_based: false,
        }
    }

    fn detect(&self, data: &Value) -> bool {
        data.get("title").is_some()
            && data.get("mapping").map(|m| m.is_object()).unwrap_or(false)
            && data.get("create_time").map(|t| !t.is_null()).unwrap_or(false)
    }

    fn origin_id(&self, data: &Value) -> Option<String> {
        data.get("id")
            .or_else(|| data.get("conversation_id"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn extract(&self, data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>> {
        let title = data.get("title").and_then(|t| t.as_str()).map(String::from);
        let mapping = match data.get("mapping").and_then(|m| m.as_object()) {
            Some(m) => m,
            None => return Ok(vec![(title, Vec::new())]),
        };

        let mut nodes: Vec<(&String, &Value)> = mapping.iter().collect();
        nodes.sort_by(|a, b| {
            let ta = a.1.get("create_time").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let tb = b.1.get("create_time").and_then(|v| v.as_f64()).unwrap_or(0.0);
            ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut messages = Vec::new();

        for (_node_id, node) in nodes {
            let Some(message) = node.get("message").filter(|m| !m.is_null()) else {
                continue;
            };

            let role_str = message
                .get("author")
                .and_then(|a| a.get("role"))
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            let role = match role_str {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => continue,
            };

            let attachments = extract_attachments(message);

            let content_data = message.get("content");
            let parts = content_data.and_then(|c| c.get("parts")).and_then(|p| p.as_array());
            let mut content = parts
                .and_then(|p| p.first())
                .and_then(|v| v.as_str())
                .map(String::from);

            if content.is_none() && !attachments.is_empty() {
                let content_type = content_data
                    .and_then(|c| c.get("content_type"))
                    .and_then(|c| c.as_str())
                    .unwrap_or("");
                content = Some(
                    match content_type {
                        "thoughts" => "[Reasoning process]",
                        "reasoning_recap" => "[Reasoning summary]",
                        _ => "[Attachment]",
                    }
                    .to_string(),
                );
            }

            let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
                continue;
            };

            let created_at = message
                .get("create_time")
                .and_then(|v| v.as_f64())
                .or_else(|| node.get("create_time").and_then(|v| v.as_f64()))
                .and_then(epoch_to_datetime);

            messages.push(ExtractedMessage {
                role,
                content: clean_message_content(&content),
                created_at,
                attachments,
                extra_metadata: Value::Null,
            });
        }

        Ok(vec![(title, messages)])
    }
}

fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch.trunc() as i64, ((epoch.fract()) * 1e9) as u32)
}

/// Attachments come from multimodal_text image/audio parts, code blocks,
/// reasoning blocks, and `metadata.content_references` web citations.
fn extract_attachments(message: &Value) -> Vec<Attachment> {
    let mut out = Vec::new();
    let content = message.get("content");
    let content_type = content
        .and_then(|c| c.get("content_type"))
        .and_then(|c| c.as_str())
        .unwrap_or("");

    match content_type {
        "code" => {
            if let Some(text) = content.and_then(|c| c.get("text")).and_then(|t| t.as_str()) {
                out.push(Attachment::Code {
                    file_name: None,
                    language: content
                        .and_then(|c| c.get("language"))
                        .and_then(|l| l.as_str())
                        .map(String::from),
                    extracted_content: clean_message_content(text),
                    available: true,
                });
            }
        }
        "thoughts" | "reasoning_recap" => {
            if let Some(parts) = content.and_then(|c| c.get("parts")).and_then(|p| p.as_array()) {
                let joined = parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !joined.trim().is_empty() {
                    out.push(Attachment::Reasoning {
                        extracted_content: clean_message_content(&joined),
                        available: true,
                    });
                }
            }
        }
        "multimodal_text" => {
            if let Some(parts) = content.and_then(|c| c.get("parts")).and_then(|p| p.as_array()) {
                for part in parts {
                    if part.get("content_type").and_then(|c| c.as_str()) == Some("image_asset_pointer") {
                        out.push(Attachment::Image {
                            file_name: part
                                .get("asset_pointer")
                                .and_then(|a| a.as_str())
                                .unwrap_or("image")
                                .to_string(),
                            file_type: None,
                            available: false,
                        });
                    } else if part.get("content_type").and_then(|c| c.as_str())
                        == Some("audio_transcription")
                    {
                        out.push(Attachment::Audio {
                            file_name: "audio".to_string(),
                            extracted_content: part
                                .get("text")
                                .and_then(|t| t.as_str())
                                .map(|t| clean_message_content(t)),
                            available: true,
                        });
                    }
                }
            }
        }
        _ => {}
    }

    if let Some(refs) = message
        .get("metadata")
        .and_then(|m| m.get("content_references"))
        .and_then(|r| r.as_array())
    {
        for reference in refs {
            let url = reference.get("url").and_then(|u| u.as_str()).map(String::from);
            let title = reference.get("title").and_then(|t| t.as_str()).map(String::from);
            if url.is_some() || title.is_some() {
                out.push(Attachment::Citation {
                    url,
                    title,
                    available: true,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_chatgpt_signature() {
        let data = json!({"title": "t", "mapping": {}, "create_time": 100.0});
        assert!(ChatGptExtractor.detect(&data));
    }

    #[test]
    fn extracts_user_and_assistant_turns_in_order() {
        let data = json!({
            "title": "convo",
            "create_time": 1.0,
            "mapping": {
                "a": {"create_time": 2.0, "message": {"author": {"role": "user"}, "content": {"parts": ["hi"]}}},
                "b": {"create_time": 1.0, "message": {"author": {"role": "assistant"}, "content": {"parts": ["hello"]}}},
                "c": {"create_time": 3.0, "message": {"author": {"role": "system"}, "content": {"parts": ["sys"]}}},
            }
        });
        let (_, messages) = ChatGptExtractor.extract(&data).unwrap().remove(0);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn reasoning_only_message_gets_placeholder_content() {
        let data = json!({
            "title": "t",
            "create_time": 1.0,
            "mapping": {
                "a": {
                    "message": {
                        "author": {"role": "assistant"},
                        "content": {"content_type": "thoughts", "parts": ["thinking..."]}
                    }
                }
            }
        });
        let (_, messages) = ChatGptExtractor.extract(&data).unwrap().remove(0);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "[Reasoning process]");
        assert!(!messages[0].attachments.is_empty());
    }
}
