pub mod chatgpt;
pub mod claude;
pub mod cleaning;
pub mod docx;
pub mod openwebui;
pub mod youtube;

pub use cleaning::clean_message_content;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized message as produced by any extractor, before it becomes a
/// `NewMessage` for insertion (attachments and timestamp still need to be
/// folded into `MessageMetadata` by the importer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMessage {
    pub role: crate::models::message::Role,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub attachments: Vec<crate::models::message::Attachment>,
    pub extra_metadata: Value,
}

/// Metadata describing one extractor, mirroring what a runtime plugin
/// discovery pass would report: name, version, supported extensions and
/// capability flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub supported_extensions: Vec<&'static str>,
    pub auto_detect: bool,
    pub file_based: bool,
}

/// Shared contract for every chat-archive format. Each built-in extractor is
/// a variant dispatched through `FormatRegistry` rather than a dynamically
/// discovered module, but the registry still reports discovery/metadata/count
/// as three equal views over the same backing list.
pub trait Extractor: Send + Sync {
    fn key(&self) -> &'static str;
    fn metadata(&self) -> ExtractorMetadata;

    /// Detects whether `data` matches this extractor's format signature.
    fn detect(&self, data: &Value) -> bool;

    /// The archive's own identifier for this conversation (ChatGPT id,
    /// Claude uuid, OpenWebUI chat id), used as `DuplicateGuard`'s key.
    /// Formats with no natural conversation id (YouTube) return `None`;
    /// the importer falls back to the content hash in that case.
    fn origin_id(&self, _data: &Value) -> Option<String> {
        None
    }

    /// Flattens one archive's top-level conversations into
    /// `(title, messages)` pairs. A malformed conversation must not abort
    /// the whole archive: extractors return an empty message list for that
    /// conversation rather than erroring.
    fn extract(&self, data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>>;
}

pub struct FormatRegistry {
    extractors: Vec<Box<dyn Extractor>>,
    /// YouTube watch-history is handled outside the core registry (§8: the
    /// registry's discovery/metadata/count views always agree on exactly 4
    /// core extractors — chatgpt, claude, openwebui, docx). It still reports
    /// `auto_detect: true` in its own metadata; it just never takes part in
    /// `FormatRegistry`'s count or `detect()` lookup.
    youtube: Box<dyn Extractor>,
}

impl FormatRegistry {
    /// Builds the registry once at startup, in detection-priority order
    /// (§4.1: OpenWebUI must be tried before Claude/ChatGPT since it can
    /// also carry a `title` field).
    pub fn with_builtin_extractors() -> Self {
        Self {
            extractors: vec![
                Box::new(openwebui::OpenWebUiExtractor),
                Box::new(claude::ClaudeExtractor),
                Box::new(chatgpt::ChatGptExtractor),
                Box::new(docx::DocxExtractor),
            ],
            youtube: Box::new(youtube::YouTubeExtractor),
        }
    }

    /// The YouTube watch-history extractor, reached directly rather than
    /// through `get`/`detect` (§8, §9 supplement).
    pub fn youtube(&self) -> &dyn Extractor {
        self.youtube.as_ref()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn metadata(&self) -> Vec<ExtractorMetadata> {
        self.extractors.iter().map(|e| e.metadata()).collect()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.key()).collect()
    }

    /// Detects the format of one conversation value and returns the matching
    /// extractor's key, or `None` ("Unknown") if nothing matched.
    pub fn detect(&self, data: &Value) -> Option<&'static str> {
        self.extractors
            .iter()
            .find(|e| e.detect(data))
            .map(|e| e.key())
    }

    pub fn get(&self, key: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.key() == key)
            .map(|b| b.as_ref())
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin_extractors()
    }
}

/// Normalizes a top-level archive payload into a list of per-conversation
/// JSON values: a `{"conversations": [...]}` wrapper unwraps to its array,
/// a bare array is used as-is (§4.1 format detection).
pub fn normalize_conversation_list(archive: &Value) -> Vec<Value> {
    match archive {
        Value::Object(map) => map
            .get("conversations")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default(),
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_equal_counts_across_views() {
        let registry = FormatRegistry::with_builtin_extractors();
        assert_eq!(registry.len(), registry.metadata().len());
        assert_eq!(registry.len(), registry.keys().len());
    }

    #[test]
    fn exactly_four_core_extractors_are_always_discovered() {
        let registry = FormatRegistry::with_builtin_extractors();
        assert_eq!(registry.len(), 4);
        let mut keys = registry.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["chatgpt", "claude", "docx", "openwebui"]);
        assert_eq!(registry.youtube().key(), "youtube");
    }
}
