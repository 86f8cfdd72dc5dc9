//! YouTube watch-history extractor (Google Takeout export).
//!
//! Each watch event becomes a single user-role message; grounded in the
//! original `db/importers/youtube.py` extractor.

use super::{Extractor, ExtractedMessage, ExtractorMetadata};
use crate::error::Result;
use crate::models::message::Role;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::OnceLock;

pub struct YouTubeExtractor;

impl Extractor for YouTubeExtractor {
    fn key(&self) -> &'static str {
        "youtube"
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "YouTube",
            version: "1.0.0",
            description: "Extracts watch events from Google Takeout YouTube watch history.",
            supported_extensions: vec![".json"],
            auto_detect: true,
            file_based: false,
        }
    }

    fn detect(&self, data: &Value) -> bool {
        let Some(items) = data.as_array() else {
            return false;
        };
        items.first().map(|item| {
            item.get("title").is_some() && item.get("titleUrl").is_some() && item.get("time").is_some()
        }).unwrap_or(false)
    }

    fn extract(&self, data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>> {
        let Some(items) = data.as_array() else {
            return Ok(vec![(None, Vec::new())]);
        };

        let mut messages = Vec::new();

        for item in items {
            let title = item.get("title").and_then(|t| t.as_str()).unwrap_or("").trim();
            let title_url = item.get("titleUrl").and_then(|u| u.as_str()).unwrap_or("");
            let time_str = item.get("time").and_then(|t| t.as_str()).unwrap_or("");

            if title.is_empty() || title_url.is_empty() {
                continue;
            }

            let Some(video_id) = extract_video_id(title_url) else {
                continue;
            };

            let created_at = parse_iso8601(time_str);

            let (channel_name, channel_url) = item
                .get("subtitles")
                .and_then(|s| s.as_array())
                .and_then(|s| s.first())
                .map(|s| {
                    (
                        s.get("name").and_then(|n| n.as_str()).map(String::from),
                        s.get("url").and_then(|u| u.as_str()).map(String::from),
                    )
                })
                .unwrap_or((None, None));

            let mut content = format!("Watched: {title}");
            if let Some(name) = &channel_name {
                content.push_str(&format!(" by {name}"));
            }

            let mut metadata = json!({
                "video_id": video_id,
                "video_url": title_url,
                "transcript_status": "pending",
                "transcript": Value::Null,
                "summary": Value::Null,
            });
            if let Some(name) = channel_name {
                metadata["channel_name"] = json!(name);
            }
            if let Some(url) = channel_url {
                metadata["channel_url"] = json!(url);
            }

            messages.push(ExtractedMessage {
                role: Role::User,
                content,
                created_at,
                attachments: Vec::new(),
                extra_metadata: metadata,
            });
        }

        messages.sort_by_key(|m| m.created_at);

        Ok(vec![(None, messages)])
    }
}

fn video_id_patterns() -> &'static [regex::Regex] {
    static PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            regex::Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&?/]+)").unwrap(),
            regex::Regex::new(r"youtube\.com/embed/([^&?/]+)").unwrap(),
            regex::Regex::new(r"youtube\.com/v/([^&?/]+)").unwrap(),
        ]
    })
}

fn extract_video_id(url: &str) -> Option<String> {
    for pattern in video_id_patterns() {
        if let Some(captures) = pattern.captures(url) {
            return captures.get(1).map(|m| m.as_str().to_string());
        }
    }
    None
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_video_id_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=abc123&t=10s"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn extracts_video_id_from_short_url() {
        assert_eq!(extract_video_id("https://youtu.be/xyz789"), Some("xyz789".to_string()));
    }

    #[test]
    fn skips_items_without_resolvable_video_id() {
        let data = json!([{"title": "t", "titleUrl": "https://example.com/video", "time": "2024-01-01T00:00:00Z"}]);
        let (_, messages) = YouTubeExtractor.extract(&data).unwrap().remove(0);
        assert!(messages.is_empty());
    }

    #[test]
    fn sorts_ascending_by_watch_time() {
        let data = json!([
            {"title": "second", "titleUrl": "https://youtu.be/b", "time": "2024-01-02T00:00:00Z"},
            {"title": "first", "titleUrl": "https://youtu.be/a", "time": "2024-01-01T00:00:00Z"},
        ]);
        let (_, messages) = YouTubeExtractor.extract(&data).unwrap().remove(0);
        assert!(messages[0].content.contains("first"));
        assert!(messages[1].content.contains("second"));
    }
}
