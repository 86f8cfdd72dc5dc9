//! Search over imported messages: full-text, vector, and a hybrid fusion of
//! the two, with an `auto` mode that degrades to FTS-only when the corpus
//! has no embeddings yet (§4.5).

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::models::message::Role;
use crate::providers::Embedder;
use crate::queries::{embeddings, messages};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Auto,
    Fts,
    Semantic,
    Hybrid,
}

/// Inclusive `[from, to]` filter applied to `created_at` after ranking
/// candidates are gathered, before the final cut to `k` (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    fn matches(&self, at: DateTime<Utc>) -> bool {
        self.from.map(|f| at >= f).unwrap_or(true) && self.to.map(|t| at <= t).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_title: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub similarity: Option<f64>,
    pub combined_score: Option<f64>,
}

impl SearchResult {
    /// `distance = 1 - similarity` when available, else `1 - combined_score`,
    /// else the neutral midpoint `0.5`, matching legacy ChromaDB-style
    /// consumers that expect "lower is better" (§4.5).
    pub fn distance(&self) -> f64 {
        if let Some(similarity) = self.similarity {
            1.0 - similarity
        } else if let Some(score) = self.combined_score {
            1.0 - score
        } else {
            0.5
        }
    }
}

pub struct SearchService {
    pool: crate::DbPool,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(pool: crate::DbPool, embedder: Arc<dyn Embedder>, config: SearchConfig) -> Self {
        Self { pool, embedder, config }
    }

    pub async fn search(
        &self,
        query: &str,
        k: i64,
        search_type: SearchType,
        date_range: Option<DateRange>,
    ) -> Result<Vec<SearchResult>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;

        let effective_type = match search_type {
            SearchType::Auto => {
                if embeddings::any_exist(&mut conn).await? {
                    SearchType::Hybrid
                } else {
                    SearchType::Fts
                }
            }
            other => other,
        };

        let mut results = match effective_type {
            SearchType::Fts => self.search_fts(&mut conn, query, k).await?,
            SearchType::Semantic => self.search_semantic(&mut conn, query, k).await?,
            SearchType::Hybrid => {
                if embeddings::any_exist(&mut conn).await? {
                    self.search_hybrid(&mut conn, query, k).await?
                } else {
                    self.search_fts(&mut conn, query, k).await?
                }
            }
            SearchType::Auto => unreachable!("resolved above"),
        };

        if let Some(range) = date_range {
            results.retain(|r| range.matches(r.created_at));
        }

        results.truncate(k as usize);
        Ok(results)
    }

    async fn search_fts(&self, conn: &mut crate::DbConn, query: &str, k: i64) -> Result<Vec<SearchResult>> {
        let hits = messages::search_full_text(conn, query, k, None).await?;
        let ids: Vec<Uuid> = hits.iter().map(|(m, _)| m.id).collect();
        let titles = self.title_map(conn, &ids).await?;

        Ok(hits
            .into_iter()
            .map(|(m, rank)| SearchResult {
                conversation_title: titles.get(&m.conversation_id).cloned().unwrap_or_default(),
                message_id: m.id,
                conversation_id: m.conversation_id,
                role: m.role,
                content: m.content,
                created_at: m.created_at,
                similarity: None,
                combined_score: Some(rank),
            })
            .collect())
    }

    async fn search_semantic(&self, conn: &mut crate::DbConn, query: &str, k: i64) -> Result<Vec<SearchResult>> {
        let query_vector = self
            .embedder
            .embed_batch(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("embedder returned no vector for query".into()))?;

        let matches = embeddings::nearest(conn, query_vector, self.embedder.model(), k).await?;
        let ids: Vec<Uuid> = matches.iter().map(|m| m.message_id).collect();
        let loaded = messages::get_with_conversation_title(conn, &ids).await?;
        let by_id: HashMap<Uuid, (crate::models::Message, String)> =
            loaded.into_iter().map(|(m, t)| (m.id, (m, t))).collect();

        Ok(matches
            .into_iter()
            .filter_map(|vm| {
                let (m, title) = by_id.get(&vm.message_id)?;
                Some(SearchResult {
                    message_id: m.id,
                    conversation_id: m.conversation_id,
                    conversation_title: title.clone(),
                    role: m.role,
                    content: m.content.clone(),
                    created_at: m.created_at,
                    similarity: Some(vm.similarity),
                    combined_score: None,
                })
            })
            .collect())
    }

    /// Runs FTS and vector search in parallel candidate sets, then fuses
    /// scores via `w_fts * norm(rank) + w_vec * similarity` (§4.5).
    async fn search_hybrid(&self, conn: &mut crate::DbConn, query: &str, k: i64) -> Result<Vec<SearchResult>> {
        let overfetch = (k * self.config.overfetch_multiplier).max(k);

        let fts_hits = messages::search_full_text(conn, query, overfetch, None).await?;

        let query_vector = self
            .embedder
            .embed_batch(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("embedder returned no vector for query".into()))?;
        let vec_hits = embeddings::nearest(conn, query_vector, self.embedder.model(), overfetch).await?;

        let max_rank = fts_hits.iter().map(|(_, r)| *r).fold(f64::MIN, f64::max);
        let min_rank = fts_hits.iter().map(|(_, r)| *r).fold(f64::MAX, f64::min);
        let rank_span = (max_rank - min_rank).max(f64::EPSILON);

        let mut fused: HashMap<Uuid, (Option<f64>, f64)> = HashMap::new();
        for (m, rank) in &fts_hits {
            let normalized = (*rank - min_rank) / rank_span;
            fused.insert(m.id, (None, self.config.w_fts * normalized));
        }
        for vm in &vec_hits {
            let entry = fused.entry(vm.message_id).or_insert((None, 0.0));
            entry.0 = Some(vm.similarity);
            entry.1 += self.config.w_vec * vm.similarity;
        }

        let ids: Vec<Uuid> = fused.keys().copied().collect();
        let loaded = messages::get_with_conversation_title(conn, &ids).await?;

        let mut results: Vec<SearchResult> = loaded
            .into_iter()
            .filter_map(|(m, title)| {
                let (similarity, combined_score) = *fused.get(&m.id)?;
                Some(SearchResult {
                    message_id: m.id,
                    conversation_id: m.conversation_id,
                    conversation_title: title,
                    role: m.role,
                    content: m.content,
                    created_at: m.created_at,
                    similarity,
                    combined_score: Some(combined_score),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.combined_score
                .unwrap_or(0.0)
                .partial_cmp(&a.combined_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }

    async fn title_map(&self, conn: &mut crate::DbConn, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        let loaded = messages::get_with_conversation_title(conn, ids).await?;
        Ok(loaded.into_iter().map(|(m, title)| (m.conversation_id, title)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_matches_inclusive_bounds() {
        let from = "2024-01-01T00:00:00Z".parse().unwrap();
        let to = "2024-12-31T23:59:59Z".parse().unwrap();
        let range = DateRange { from: Some(from), to: Some(to) };

        assert!(range.matches(from));
        assert!(range.matches(to));
        assert!(!range.matches("2023-12-31T00:00:00Z".parse().unwrap()));
        assert!(!range.matches("2025-01-01T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn distance_contract_prefers_similarity_then_combined_then_midpoint() {
        let base = SearchResult {
            message_id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            conversation_title: String::new(),
            role: Role::User,
            content: String::new(),
            created_at: Utc::now(),
            similarity: None,
            combined_score: None,
        };

        assert_eq!(base.distance(), 0.5);

        let with_combined = SearchResult { combined_score: Some(0.8), ..base.clone() };
        assert!((with_combined.distance() - 0.2).abs() < 1e-9);

        let with_similarity = SearchResult { similarity: Some(0.9), combined_score: Some(0.8), ..base };
        assert!((with_similarity.distance() - 0.1).abs() < 1e-9);
    }
}
