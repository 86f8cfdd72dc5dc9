//! OpenWebUI format extractor.
//!
//! OpenWebUI stores a conversation's turns as a tree-structured dict keyed
//! by message id, under `chat.history.messages`. Parent/child links let us
//! recover the linear chain; failing that we sort by timestamp.

use super::{clean_message_content, Extractor, ExtractedMessage, ExtractorMetadata};
use crate::error::Result;
use crate::models::message::Role;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub struct OpenWebUiExtractor;

impl Extractor for OpenWebUiExtractor {
    fn key(&self) -> &'static str {
        "openwebui"
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "OpenWebUI",
            version: "1.0.0",
            description: "Extracts and flattens messages from OpenWebUI's tree-structured dict format.",
            supported_extensions: vec![".json"],
            auto_detect: true,
            file_based: false,
        }
    }

    fn detect(&self, data: &Value) -> bool {
        let Some(messages) = data
            .get("chat")
            .and_then(|c| c.get("history"))
            .and_then(|h| h.get("messages"))
            .and_then(|m| m.as_object())
        else {
            return false;
        };
        if messages.is_empty() {
            return false;
        }
        messages
            .values()
            .next()
            .map(|m| m.get("role").is_some() && m.get("content").is_some() && m.get("timestamp").is_some())
            .unwrap_or(false)
    }

    fn origin_id(&self, data: &Value) -> Option<String> {
        data.get("chat")
            .and_then(|c| c.get("id"))
            .or_else(|| data.get("id"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn extract(&self, data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>> {
        let title = data.get("chat").and_then(|c| c.get("title")).and_then(|t| t.as_str())
            .map(String::from);

        let Some(messages) = data
            .get("chat")
            .and_then(|c| c.get("history"))
            .and_then(|h| h.get("messages"))
            .and_then(|m| m.as_object())
        else {
            return Ok(vec![(title, Vec::new())]);
        };

        let current_id = data
            .get("chat")
            .and_then(|c| c.get("history"))
            .and_then(|h| h.get("currentId"))
            .and_then(|v| v.as_str());

        let has_chain_fields = messages.values().any(|m| m.get("parentId").is_some() || m.get("childrenIds").is_some());

        let entries: Vec<&Value> = has_chain_fields
            .then(|| resolve_parent_chain(messages, current_id))
            .flatten()
            .unwrap_or_else(|| sorted_by_timestamp(messages));

        let mut out = Vec::new();
        for entry in entries {
            let role_str = entry.get("role").and_then(|r| r.as_str()).unwrap_or("");
            let role = match role_str {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => continue,
            };

            let content = entry.get("content").and_then(|c| c.as_str()).unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let created_at = entry.get("timestamp").and_then(|v| v.as_f64()).and_then(normalize_timestamp);

            out.push(ExtractedMessage {
                role,
                content: clean_message_content(content),
                created_at,
                attachments: Vec::new(),
                extra_metadata: Value::Null,
            });
        }

        Ok(vec![(title, out)])
    }
}

fn sorted_by_timestamp(messages: &Map<String, Value>) -> Vec<&Value> {
    let mut entries: Vec<&Value> = messages.values().collect();
    entries.sort_by(|a, b| {
        let ta = a.get("timestamp").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let tb = b.get("timestamp").and_then(|v| v.as_f64()).unwrap_or(0.0);
        ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}

/// Walks the selected leaf back to the root via `parentId`, recovering the
/// single active branch and discarding abandoned regenerations. Starts from
/// `history.currentId` when present, else from whichever message has no
/// `childrenIds` (a leaf). Returns `None` if no leaf/root chain resolves, so
/// the caller can fall back to a timestamp sort.
fn resolve_parent_chain<'a>(messages: &'a Map<String, Value>, current_id: Option<&str>) -> Option<Vec<&'a Value>> {
    let start_id = current_id
        .filter(|id| messages.contains_key(*id))
        .map(String::from)
        .or_else(|| {
            messages
                .iter()
                .find(|(_, m)| {
                    m.get("childrenIds")
                        .and_then(|c| c.as_array())
                        .map(|c| c.is_empty())
                        .unwrap_or(true)
                })
                .map(|(id, _)| id.clone())
        })?;

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start_id;

    loop {
        if !seen.insert(current.clone()) {
            break;
        }
        let Some(message) = messages.get(&current) else { break };
        chain.push(message);

        match message.get("parentId").and_then(|p| p.as_str()) {
            Some(parent_id) if messages.contains_key(parent_id) => current = parent_id.to_string(),
            _ => break,
        }
    }

    if chain.is_empty() {
        return None;
    }
    chain.reverse();
    Some(chain)
}

/// OpenWebUI timestamps appear in seconds, milliseconds, or nanoseconds
/// depending on export version; normalize by magnitude.
fn normalize_timestamp(raw: f64) -> Option<DateTime<Utc>> {
    let seconds = if raw > 1e17 {
        raw / 1e9
    } else if raw > 1e14 {
        raw / 1e6
    } else if raw > 1e11 {
        raw / 1e3
    } else {
        raw
    };
    DateTime::from_timestamp(seconds.trunc() as i64, ((seconds.fract()) * 1e9) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_openwebui_signature() {
        let data = json!({
            "chat": {"history": {"messages": {"m1": {"role": "user", "content": "hi", "timestamp": 1.0}}}}
        });
        assert!(OpenWebUiExtractor.detect(&data));
    }

    #[test]
    fn sorts_flattened_messages_by_timestamp() {
        let data = json!({
            "chat": {
                "title": "chat",
                "history": {"messages": {
                    "b": {"role": "assistant", "content": "second", "timestamp": 2.0},
                    "a": {"role": "user", "content": "first", "timestamp": 1.0},
                }}
            }
        });
        let (_, messages) = OpenWebUiExtractor.extract(&data).unwrap().remove(0);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn resolves_parent_child_chain_and_drops_abandoned_branches() {
        let data = json!({
            "chat": {
                "title": "chat",
                "history": {
                    "currentId": "c2",
                    "messages": {
                        "a": {"role": "user", "content": "first", "timestamp": 1.0, "parentId": null, "childrenIds": ["b", "b2"]},
                        "b": {"role": "assistant", "content": "second", "timestamp": 2.0, "parentId": "a", "childrenIds": ["c2"]},
                        "b2": {"role": "assistant", "content": "regenerated, abandoned", "timestamp": 3.0, "parentId": "a", "childrenIds": []},
                        "c2": {"role": "user", "content": "third", "timestamp": 4.0, "parentId": "b", "childrenIds": []},
                    }
                }
            }
        });
        let (_, messages) = OpenWebUiExtractor.extract(&data).unwrap().remove(0);
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(!contents.contains(&"regenerated, abandoned"));
    }

    #[test]
    fn normalizes_nanosecond_timestamps() {
        let ns = 1_700_000_000_000_000_000f64;
        let dt = normalize_timestamp(ns).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
