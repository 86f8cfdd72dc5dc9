//! Presentation-adjacent formatting helpers that are not markup rendering:
//! conversation previews, assistant-name derivation, source-tag
//! normalisation, and relevance-score display (§9.1, carried over from the
//! original implementation's `ConversationFormatService`).

use crate::models::conversation::{Conversation, Source};
use crate::search::SearchResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn markdown_strip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\*\*|\*|`)").unwrap())
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Collapses whitespace, strips markdown emphasis/backticks, and truncates
/// to `max_len` chars at the last word boundary with an ellipsis (§6).
pub fn preview(text: &str, max_len: usize) -> String {
    let stripped = markdown_strip_pattern().replace_all(text, "");
    let collapsed = whitespace_pattern().replace_all(stripped.trim(), " ").to_string();

    if collapsed.chars().count() <= max_len {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(max_len).collect();
    match truncated.rfind(' ') {
        Some(boundary) if boundary > 0 => format!("{}…", &truncated[..boundary]),
        _ => format!("{}…", truncated),
    }
}

/// Normalises a raw source tag the way the original's adapter did: legacy
/// `"postgres"` storage tags fold to `"imported"`, `"gpt"` aliases to
/// `"chatgpt"` (§9.1).
pub fn normalize_source(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "postgres" => "imported".to_string(),
        "gpt" => "chatgpt".to_string(),
        other => other.to_string(),
    }
}

/// Derives a human-facing assistant name from the conversation's source tag,
/// falling back to inspecting the content for `**Claude said**` /
/// `**ChatGPT said**` markers, then "AI" (§6).
pub fn assistant_name(source: Option<Source>, sample_content: &str) -> String {
    match source {
        Some(Source::Claude) => "Claude".to_string(),
        Some(Source::Chatgpt) => "ChatGPT".to_string(),
        _ => {
            if sample_content.contains("**Claude said**") {
                "Claude".to_string()
            } else if sample_content.contains("**ChatGPT said**") {
                "ChatGPT".to_string()
            } else {
                "AI".to_string()
            }
        }
    }
}

/// Fixed 3-decimal relevance string, or `"N/A"` when absent, matching the
/// original's display convention (§9.1).
pub fn relevance(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.3}", s),
        None => "N/A".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationListEntry {
    pub id: uuid::Uuid,
    pub title: String,
    pub preview: String,
    pub date: chrono::DateTime<chrono::Utc>,
    pub source: Option<String>,
}

/// Shapes raw conversation rows plus a first-message sample into the
/// `{id,title,preview,date,source}` envelope the `list conversations`
/// operation returns (§6, §9.1).
pub fn conversation_list(conversations: &[(Conversation, Option<String>)], preview_len: usize) -> Vec<ConversationListEntry> {
    conversations
        .iter()
        .map(|(conv, first_message)| ConversationListEntry {
            id: conv.id,
            title: conv.title.clone(),
            preview: preview(first_message.as_deref().unwrap_or(""), preview_len),
            date: conv.updated_at,
            source: conv.source.map(|s| normalize_source(&s.to_string())),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub title: String,
    pub date: chrono::DateTime<chrono::Utc>,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Shapes `SearchResult`s into the `{title,date,content,metadata}` envelope
/// the `search` operation returns (§6), carrying relevance/distance in
/// `metadata` for callers that want the raw score.
pub fn search_results(results: &[SearchResult]) -> Vec<SearchResultEntry> {
    results
        .iter()
        .map(|r| SearchResultEntry {
            title: r.conversation_title.clone(),
            date: r.created_at,
            content: r.content.clone(),
            metadata: serde_json::json!({
                "message_id": r.message_id,
                "conversation_id": r.conversation_id,
                "role": r.role,
                "similarity": r.similarity,
                "combined_score": r.combined_score,
                "relevance": relevance(r.combined_score.or(r.similarity)),
                "distance": r.distance(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_at_word_boundary_with_ellipsis() {
        let text = "this is a fairly long message that should be truncated somewhere in the middle";
        let result = preview(text, 20);
        assert!(result.ends_with('…'));
        assert!(result.chars().count() <= 21);
    }

    #[test]
    fn preview_strips_markdown_emphasis_and_backticks() {
        let text = "**bold** and `code` and *italic*";
        let result = preview(text, 100);
        assert_eq!(result, "bold and code and italic");
    }

    #[test]
    fn normalize_source_folds_legacy_tags() {
        assert_eq!(normalize_source("postgres"), "imported");
        assert_eq!(normalize_source("GPT"), "chatgpt");
        assert_eq!(normalize_source("claude"), "claude");
    }

    #[test]
    fn assistant_name_falls_back_to_content_markers_then_ai() {
        assert_eq!(assistant_name(Some(Source::Claude), ""), "Claude");
        assert_eq!(assistant_name(None, "**ChatGPT said**: hi"), "ChatGPT");
        assert_eq!(assistant_name(None, "nothing special"), "AI");
    }

    #[test]
    fn relevance_formats_three_decimals_or_na() {
        assert_eq!(relevance(Some(0.5)), "0.500");
        assert_eq!(relevance(None), "N/A");
    }
}
