//! Per-conversation transactional import with duplicate detection.
//!
//! Grounded in the original `import_from_json`/`PostgresController` flow:
//! a duplicate-candidate map is built once up front, then each incoming
//! conversation is imported (or skipped) in its own transaction so one bad
//! conversation never poisons the batch.

use crate::{
    error::{Error, Result},
    extractors::{normalize_conversation_list, ExtractedMessage, Extractor, FormatRegistry},
    models::{
        conversation::{NewConversation, Source},
        job::GENERATE_EMBEDDING,
        message::{MessageMetadata, NewMessage},
    },
    queries, DbPool,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// SHA-256 hex digest of a conversation's joined message content, used as
/// the exact-duplicate fingerprint (§4.2).
pub fn content_hash(joined_content: &str) -> String {
    let digest = Sha256::digest(joined_content.as_bytes());
    hex::encode(digest)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub imported: u64,
    pub skipped_duplicate: u64,
    pub skipped_changed: u64,
    pub skipped_empty: u64,
}

impl ImportSummary {
    /// Human-readable completion message, mirroring the original's
    /// "all conversations already indexed" framing when nothing new landed
    /// (§4.2 bulk progress semantics).
    pub fn message(&self) -> String {
        if self.imported == 0 {
            if self.skipped_duplicate > 0 {
                return format!(
                    "All {} conversations already indexed (no new content)",
                    self.skipped_duplicate
                );
            }
            return "No valid conversations found to index".to_string();
        }

        let mut message = format!("Successfully imported {} conversations", self.imported);
        if self.skipped_duplicate > 0 {
            message.push_str(&format!(" (skipped {} duplicates)", self.skipped_duplicate));
        }
        message
    }
}

pub struct Importer<'a> {
    pool: &'a DbPool,
    registry: &'a FormatRegistry,
    embedding_model: String,
}

impl<'a> Importer<'a> {
    pub fn new(pool: &'a DbPool, registry: &'a FormatRegistry, embedding_model: impl Into<String>) -> Self {
        Self {
            pool,
            registry,
            embedding_model: embedding_model.into(),
        }
    }

    /// Imports an archive already parsed to JSON (ChatGPT/Claude/OpenWebUI/
    /// YouTube). All conversations in one archive share a single format: the
    /// YouTube watch-history extractor consumes the whole archive as one
    /// pseudo-conversation, everything else is a list of conversation
    /// objects sharing a format detected from the first item (§4.1).
    pub async fn import_archive(&self, data: &serde_json::Value, source: Source) -> Result<ImportSummary> {
        let youtube = self.registry.youtube();
        if youtube.detect(data) {
            return self.import_conversations(&[data.clone()], youtube, source).await;
        }

        let conversations = normalize_conversation_list(data);
        let Some(first) = conversations.first() else {
            return Err(Error::FormatDetection {
                tried: self.registry.keys().iter().map(|k| k.to_string()).collect(),
            });
        };
        let Some(extractor_key) = self.registry.detect(first) else {
            return Err(Error::FormatDetection {
                tried: self.registry.keys().iter().map(|k| k.to_string()).collect(),
            });
        };
        let extractor = self
            .registry
            .get(extractor_key)
            .expect("detect() returned a key absent from the registry");

        self.import_conversations(&conversations, extractor, source).await
    }

    /// Imports a single `.docx` file. DOCX has no JSON archive shape to
    /// auto-detect from and produces exactly one conversation per file, so it
    /// bypasses `registry.detect`/`import_conversations` and goes straight
    /// through the same duplicate-check + per-conversation transaction path
    /// via `import_one_conversation` (§4.1, §4.2).
    pub async fn import_docx_file(
        &self,
        bytes: &[u8],
        filename: &str,
        source: Source,
    ) -> Result<ImportSummary> {
        let result = crate::extractors::docx::extract_from_bytes(bytes, filename)?;
        let messages: Vec<ExtractedMessage> = result
            .messages
            .into_iter()
            .map(|(role, content, created_at)| ExtractedMessage {
                role,
                content,
                created_at,
                attachments: Vec::new(),
                extra_metadata: serde_json::Value::Null,
            })
            .collect();

        let mut summary = ImportSummary::default();
        if messages.is_empty() {
            summary.skipped_empty += 1;
            return Ok(summary);
        }

        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        let existing = queries::conversations::load_origin_hash_map(&mut conn).await?;
        drop(conn);

        let joined = messages
            .iter()
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let candidate_hash = content_hash(&joined);
        let origin_id = format!("docx:{filename}");

        if let Some((existing_hash, _)) = existing.get(&origin_id) {
            if *existing_hash == candidate_hash {
                summary.skipped_duplicate += 1;
                info!(%origin_id, "skipping duplicate docx import, content unchanged");
            } else {
                summary.skipped_changed += 1;
                info!(%origin_id, "docx exists with different content, skipping (changed content, not yet supported)");
            }
            return Ok(summary);
        }

        if self
            .import_one_conversation(result.title, messages, source, &origin_id)
            .await?
        {
            summary.imported += 1;
        } else {
            summary.skipped_empty += 1;
            info!(%origin_id, "all extracted messages were empty, discarding conversation");
        }
        Ok(summary)
    }

    async fn import_conversations(
        &self,
        conversations: &[serde_json::Value],
        extractor: &dyn Extractor,
        source: Source,
    ) -> Result<ImportSummary> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        let existing = queries::conversations::load_origin_hash_map(&mut conn).await?;
        drop(conn);

        let mut summary = ImportSummary::default();

        for conv_data in conversations {
            let (title, messages) = match extractor.extract(conv_data) {
                Ok(mut pairs) if !pairs.is_empty() => pairs.remove(0),
                Ok(_) => continue,
                Err(err) => {
                    warn!(error = %err, "extractor failed for one conversation, skipping");
                    continue;
                }
            };

            if messages.is_empty() {
                summary.skipped_empty += 1;
                continue;
            }

            let joined = messages
                .iter()
                .map(|m| m.content.trim())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            let candidate_hash = content_hash(&joined);
            let origin_id = extractor.origin_id(conv_data).unwrap_or_else(|| candidate_hash.clone());

            if let Some((existing_hash, _)) = existing.get(&origin_id) {
                if *existing_hash == candidate_hash {
                    summary.skipped_duplicate += 1;
                    info!(%origin_id, "skipping duplicate conversation, content unchanged");
                    continue;
                }
                summary.skipped_changed += 1;
                info!(%origin_id, "conversation exists with different content, skipping (changed content, not yet supported)");
                continue;
            }

            match self
                .import_one_conversation(title, messages, source, &origin_id)
                .await
            {
                Ok(true) => summary.imported += 1,
                Ok(false) => {
                    summary.skipped_empty += 1;
                    info!(%origin_id, "all extracted messages were empty, discarding conversation");
                }
                Err(err) => {
                    warn!(%origin_id, error = %err, "failed to import conversation, skipping");
                }
            }
        }

        Ok(summary)
    }

    /// Imports one conversation's messages inside its own transaction.
    /// Returns `Ok(false)` without committing if every message turned out to
    /// have empty content once attachments were stripped: a `Conversation`
    /// row must never exist with zero `Message` rows (§3, §8).
    async fn import_one_conversation(
        &self,
        title: Option<String>,
        messages: Vec<ExtractedMessage>,
        source: Source,
        origin_id: &str,
    ) -> Result<bool> {
        let (earliest, latest) = derive_conversation_bounds(&messages);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        let conversation = queries::conversations::create(
            &mut tx,
            NewConversation {
                title: title.unwrap_or_else(|| "Untitled Conversation".to_string()),
                source: Some(source),
                created_at: earliest.unwrap_or(now),
                updated_at: latest.unwrap_or(now),
            },
        )
        .await?;

        let mut inserted = 0u64;

        for (index, extracted) in messages.into_iter().enumerate() {
            let content = extracted.content.trim();
            if content.is_empty() {
                continue;
            }

            let metadata = MessageMetadata {
                source: Some(source.to_string()),
                original_conversation_id: Some(origin_id.to_string()),
                attachments: extracted.attachments,
            };

            let created_at = extracted.created_at.unwrap_or_else(|| {
                earliest.unwrap_or(now) + chrono::Duration::milliseconds(index as i64)
            });

            let new_message = NewMessage {
                conversation_id: conversation.id,
                role: extracted.role,
                content: content.to_string(),
                created_at,
                metadata,
            };

            let message = queries::messages::create(&mut tx, new_message).await?;

            queries::jobs::enqueue(
                &mut tx,
                GENERATE_EMBEDDING,
                json!({
                    "message_id": message.id,
                    "conversation_id": conversation.id,
                    "content": message.content,
                    "model": self.embedding_model,
                }),
                5,
            )
            .await?;

            inserted += 1;
        }

        if inserted == 0 {
            tx.rollback().await.map_err(Error::Sqlx)?;
            return Ok(false);
        }

        tx.commit().await.map_err(Error::Sqlx)?;
        Ok(true)
    }
}

/// Earliest/latest timestamps across a conversation's messages, used as the
/// conversation row's created_at/updated_at when the archive omits
/// conversation-level timestamps (§4.2).
fn derive_conversation_bounds(
    messages: &[ExtractedMessage],
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut earliest = None;
    let mut latest = None;
    for message in messages {
        if let Some(ts) = message.created_at {
            earliest = Some(earliest.map_or(ts, |e: DateTime<Utc>| e.min(ts)));
            latest = Some(latest.map_or(ts, |l: DateTime<Utc>| l.max(ts)));
        }
    }
    (earliest, latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_for_identical_input() {
        let a = content_hash("hello\n\nworld");
        let b = content_hash("hello\n\nworld");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_for_changed_content() {
        let a = content_hash("hello\n\nworld");
        let b = content_hash("hello\n\nworld!");
        assert_ne!(a, b);
    }

    #[test]
    fn summary_message_reports_all_indexed_when_nothing_new() {
        let summary = ImportSummary {
            imported: 0,
            skipped_duplicate: 3,
            skipped_changed: 0,
            skipped_empty: 0,
        };
        assert_eq!(summary.message(), "All 3 conversations already indexed (no new content)");
    }
}
