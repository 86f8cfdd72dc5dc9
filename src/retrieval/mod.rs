//! Contextual retrieval: turns a handful of matched messages into
//! token-budgeted context windows (matched message + neighbours) suitable
//! for feeding a RAG prompt (§4.6).

use crate::config::RagConfig;
use crate::error::{Error, Result, ValidationErrors};
use crate::models::message::Role;
use crate::queries::messages;
use crate::search::{SearchResult, SearchService, SearchType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub const CTX_START: &str = "[CTX_START]";
pub const CTX_END: &str = "[CTX_END]";
pub const MATCH_START: &str = "[MATCH]";
pub const MATCH_END: &str = "[/MATCH]";

/// Effective settings for one retrieval call, echoed back on each window so
/// callers can see what was actually applied (§4.6 step 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalParams {
    pub top_k_windows: i64,
    pub context_window: i64,
    pub asymmetric_before: Option<i64>,
    pub asymmetric_after: Option<i64>,
    pub adaptive_context: bool,
    pub deduplicate: bool,
    pub max_tokens: Option<i64>,
    pub include_markers: bool,
    pub proximity_decay_lambda: f64,
    pub apply_recency_bonus: bool,
}

impl RetrievalParams {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            top_k_windows: config.default_top_k_windows,
            context_window: config.default_context_window,
            asymmetric_before: None,
            asymmetric_after: None,
            adaptive_context: true,
            deduplicate: true,
            max_tokens: None,
            include_markers: true,
            proximity_decay_lambda: config.proximity_decay_lambda,
            apply_recency_bonus: false,
        }
    }

    fn before(&self) -> i64 {
        self.asymmetric_before.unwrap_or(self.context_window)
    }

    fn after(&self) -> i64 {
        self.asymmetric_after.unwrap_or(self.context_window)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindow {
    pub window_id: Uuid,
    pub conversation_id: Uuid,
    pub matched_message_id: Uuid,
    pub content: String,
    pub window_size: usize,
    pub match_position: usize,
    pub before_count: usize,
    pub after_count: usize,
    pub base_score: f64,
    pub aggregated_score: f64,
    pub roles: Vec<Role>,
    pub token_estimate: i64,
    pub retrieval_params: RetrievalParams,
}

struct WorkingWindow {
    messages: Vec<crate::models::Message>,
    match_position: usize,
    conversation_id: Uuid,
    matched_message_id: Uuid,
    base_score: f64,
    aggregated_score: f64,
}

pub struct ContextualRetrieval {
    search: SearchService,
    config: RagConfig,
}

impl ContextualRetrieval {
    pub fn new(search: SearchService, config: RagConfig) -> Self {
        Self { search, config }
    }

    pub async fn retrieve(
        &self,
        pool: &crate::DbPool,
        query: &str,
        params: RetrievalParams,
    ) -> Result<Vec<ContextWindow>> {
        self.validate(&params)?;

        let overfetch = (params.top_k_windows * self.config.overfetch_factor).max(params.top_k_windows);
        let seeds = self
            .search
            .search(query, overfetch, SearchType::Hybrid, None)
            .await?;

        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = pool.acquire().await.map_err(Error::Sqlx)?;
        let mut windows = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            windows.push(self.expand_window(&mut conn, seed, &params).await?);
        }
        drop(conn);

        if params.adaptive_context {
            shrink_overlaps(&mut windows);
        }

        self.score_windows(&mut windows, &seeds, &params);

        windows.sort_by(|a, b| b.aggregated_score.partial_cmp(&a.aggregated_score).unwrap_or(std::cmp::Ordering::Equal));

        let mut windows = if params.deduplicate {
            deduplicate(windows)
        } else {
            windows
        };

        windows.sort_by(|a, b| b.aggregated_score.partial_cmp(&a.aggregated_score).unwrap_or(std::cmp::Ordering::Equal));
        windows.truncate(params.top_k_windows as usize);

        let finished = windows
            .into_iter()
            .map(|w| self.finish_window(w, &params))
            .collect::<Vec<_>>();

        Ok(apply_token_budget(finished, &params, self.config.chars_per_token))
    }

    fn validate(&self, params: &RetrievalParams) -> Result<()> {
        let max = self.config.max_window_size;
        let dims = [
            ("context_window", params.context_window),
            ("asymmetric_before", params.asymmetric_before.unwrap_or(0)),
            ("asymmetric_after", params.asymmetric_after.unwrap_or(0)),
        ];
        for (field, value) in dims {
            if value > max {
                return Err(Error::Validation(ValidationErrors::Single {
                    field: field.to_string(),
                    message: format!("must not exceed {max}"),
                }));
            }
        }
        Ok(())
    }

    async fn expand_window(
        &self,
        conn: &mut crate::DbConn,
        seed: &SearchResult,
        params: &RetrievalParams,
    ) -> Result<WorkingWindow> {
        let (before, after) = messages::get_neighbours(
            conn,
            seed.conversation_id,
            seed.created_at,
            seed.message_id,
            params.before(),
            params.after(),
        )
        .await?;

        let match_position = before.len();
        let seed_message = crate::models::Message {
            id: seed.message_id,
            conversation_id: seed.conversation_id,
            role: seed.role,
            content: seed.content.clone(),
            created_at: seed.created_at,
            metadata: serde_json::Value::Null,
        };

        let mut all = before;
        all.push(seed_message);
        all.extend(after);

        let base_score = seed.combined_score.or(seed.similarity).unwrap_or(0.0);

        Ok(WorkingWindow {
            messages: all,
            match_position,
            conversation_id: seed.conversation_id,
            matched_message_id: seed.message_id,
            base_score,
            aggregated_score: base_score,
        })
    }

    /// Aggregate scoring: `base_score + neighbour_weight * sum(base_score *
    /// exp(-λ|d|))` for d != 0, plus an optional recency bonus (§4.6 step 4).
    fn score_windows(&self, windows: &mut [WorkingWindow], seeds: &[SearchResult], params: &RetrievalParams) {
        let latest = seeds.iter().map(|s| s.created_at).max();
        let earliest = seeds.iter().map(|s| s.created_at).min();
        let span_seconds = match (earliest, latest) {
            (Some(e), Some(l)) => (l - e).num_seconds().max(1) as f64,
            _ => 1.0,
        };

        for window in windows.iter_mut() {
            let neighbour_sum: f64 = (0..window.messages.len())
                .filter(|&i| i != window.match_position)
                .map(|i| {
                    let d = (i as i64 - window.match_position as i64).unsigned_abs() as f64;
                    window.base_score * (-params.proximity_decay_lambda * d).exp()
                })
                .sum();

            let mut score = window.base_score + self.config.neighbour_weight * neighbour_sum;

            if params.apply_recency_bonus {
                if let (Some(e), Some(seed_at)) = (
                    earliest,
                    window.messages.get(window.match_position).map(|m| m.created_at),
                ) {
                    let recency = (seed_at - e).num_seconds().max(0) as f64 / span_seconds;
                    score += 0.05 * recency;
                }
            }

            window.aggregated_score = score;
        }
    }

    fn finish_window(&self, window: WorkingWindow, params: &RetrievalParams) -> ContextWindow {
        let before_count = window.match_position;
        let after_count = window.messages.len() - window.match_position - 1;
        let roles = window.messages.iter().map(|m| m.role).collect();

        let content = render_window_content(&window.messages, window.match_position, params.include_markers);

        ContextWindow {
            window_id: Uuid::new_v4(),
            conversation_id: window.conversation_id,
            matched_message_id: window.matched_message_id,
            content,
            window_size: window.messages.len(),
            match_position: window.match_position,
            before_count,
            after_count,
            base_score: window.base_score,
            aggregated_score: window.aggregated_score,
            roles,
            token_estimate: 0,
            retrieval_params: params.clone(),
        }
    }
}

fn render_window_content(messages: &[crate::models::Message], match_position: usize, include_markers: bool) -> String {
    let rendered: Vec<String> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if include_markers && i == match_position {
                format!("{MATCH_START}{}{MATCH_END}", m.content)
            } else {
                m.content.clone()
            }
        })
        .collect();

    let body = rendered.join("\n\n");
    if include_markers {
        format!("{CTX_START}\n{body}\n{CTX_END}")
    } else {
        body
    }
}

/// Shrinks a lower-scored window's neighbour spans toward the overlap when
/// it shares a conversation with a higher-scored window, never expanding
/// either side (§4.6 step 3). Windows are compared by `base_score` since
/// aggregate scores aren't computed yet at this point in the pipeline.
fn shrink_overlaps(windows: &mut [WorkingWindow]) {
    let mut order: Vec<usize> = (0..windows.len()).collect();
    order.sort_by(|&a, &b| {
        windows[b]
            .base_score
            .partial_cmp(&windows[a].base_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for idx in 0..order.len() {
        let i = order[idx];
        for &j in &order[..idx] {
            if windows[i].conversation_id != windows[j].conversation_id {
                continue;
            }
            let (span_i_start, span_i_end) = message_id_bounds(&windows[i]);
            let (span_j_start, span_j_end) = message_id_bounds(&windows[j]);
            if span_i_end < span_j_start || span_j_end < span_i_start {
                continue;
            }

            let higher_ids: HashSet<Uuid> = windows[j].messages.iter().map(|m| m.id).collect();
            shrink_to_disjoint(&mut windows[i], &higher_ids);
        }
    }
}

fn message_id_bounds(window: &WorkingWindow) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let first = window.messages.first().map(|m| m.created_at).unwrap_or_else(Utc::now);
    let last = window.messages.last().map(|m| m.created_at).unwrap_or_else(Utc::now);
    (first, last)
}

fn shrink_to_disjoint(window: &mut WorkingWindow, taken: &HashSet<Uuid>) {
    while window.match_position > 0 && taken.contains(&window.messages[0].id) {
        window.messages.remove(0);
        window.match_position -= 1;
    }
    while window.messages.len() > window.match_position + 1
        && taken.contains(&window.messages.last().unwrap().id)
    {
        window.messages.pop();
    }
}

/// Merges windows sharing any message id; the merged window keeps the
/// higher aggregated_score and the union of messages, re-anchored on the
/// higher-scored window's match (§4.6 step 5).
fn deduplicate(windows: Vec<WorkingWindow>) -> Vec<WorkingWindow> {
    let mut merged: Vec<WorkingWindow> = Vec::new();

    'outer: for window in windows {
        let incoming_ids: HashSet<Uuid> = window.messages.iter().map(|m| m.id).collect();
        for existing in merged.iter_mut() {
            let existing_ids: HashSet<Uuid> = existing.messages.iter().map(|m| m.id).collect();
            if incoming_ids.is_disjoint(&existing_ids) {
                continue;
            }
            if window.aggregated_score > existing.aggregated_score {
                let mut union_ids = existing_ids;
                union_ids.extend(incoming_ids);
                let mut all: Vec<crate::models::Message> =
                    window.messages.into_iter().chain(existing.messages.drain(..)).collect();
                all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                all.dedup_by_key(|m| m.id);
                let match_position = all.iter().position(|m| m.id == window.matched_message_id).unwrap_or(0);
                existing.messages = all;
                existing.match_position = match_position;
                existing.matched_message_id = window.matched_message_id;
                existing.base_score = window.base_score;
                existing.aggregated_score = window.aggregated_score;
            } else {
                let mut all: Vec<crate::models::Message> =
                    existing.messages.drain(..).chain(window.messages).collect();
                all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                all.dedup_by_key(|m| m.id);
                let match_position = all
                    .iter()
                    .position(|m| m.id == existing.matched_message_id)
                    .unwrap_or(0);
                existing.messages = all;
                existing.match_position = match_position;
            }
            continue 'outer;
        }
        merged.push(window);
    }

    merged
}

/// Greedily includes windows in descending score order, trimming trailing
/// neighbour messages before dropping a whole window, until `max_tokens`
/// is exhausted (§4.6 step 6, ~chars_per_token heuristic).
fn apply_token_budget(
    mut windows: Vec<ContextWindow>,
    params: &RetrievalParams,
    chars_per_token: f64,
) -> Vec<ContextWindow> {
    for window in windows.iter_mut() {
        window.token_estimate = (window.content.len() as f64 / chars_per_token).ceil() as i64;
    }

    let Some(budget) = params.max_tokens else {
        return windows;
    };

    let mut remaining = budget;
    let mut kept = Vec::with_capacity(windows.len());

    for mut window in windows {
        if remaining <= 0 {
            break;
        }
        if window.token_estimate <= remaining {
            remaining -= window.token_estimate;
            kept.push(window);
            continue;
        }

        while window.token_estimate > remaining && window.window_size > 1 {
            if window.after_count > 0 {
                trim_trailing(&mut window, false);
            } else if window.before_count > 0 {
                trim_trailing(&mut window, true);
            } else {
                break;
            }
            window.token_estimate = (window.content.len() as f64 / chars_per_token).ceil() as i64;
        }

        if window.token_estimate <= remaining {
            remaining -= window.token_estimate;
            kept.push(window);
        }
    }

    kept
}

fn trim_trailing(window: &mut ContextWindow, from_start: bool) {
    let lines: Vec<&str> = window.content.split("\n\n").collect();
    if lines.len() <= 1 {
        return;
    }
    let trimmed: Vec<&str> = if from_start {
        lines[1..].to_vec()
    } else {
        lines[..lines.len() - 1].to_vec()
    };
    window.content = trimmed.join("\n\n");
    window.window_size = window.window_size.saturating_sub(1);
    if from_start {
        window.before_count = window.before_count.saturating_sub(1);
        window.match_position = window.match_position.saturating_sub(1);
    } else {
        window.after_count = window.after_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_params_default_from_config_echoes_lambda_and_topk() {
        let config = RagConfig::default();
        let params = RetrievalParams::from_config(&config);
        assert_eq!(params.top_k_windows, config.default_top_k_windows);
        assert!((params.proximity_decay_lambda - config.proximity_decay_lambda).abs() < 1e-9);
    }

    #[test]
    fn before_after_fall_back_to_symmetric_context_window() {
        let params = RetrievalParams {
            top_k_windows: 5,
            context_window: 3,
            asymmetric_before: None,
            asymmetric_after: None,
            adaptive_context: true,
            deduplicate: true,
            max_tokens: None,
            include_markers: true,
            proximity_decay_lambda: 0.5,
            apply_recency_bonus: false,
        };
        assert_eq!(params.before(), 3);
        assert_eq!(params.after(), 3);
    }

    #[test]
    fn render_window_content_wraps_match_and_ctx_markers() {
        let now: DateTime<Utc> = Utc::now();
        let messages = vec![
            crate::models::Message {
                id: Uuid::new_v4(),
                conversation_id: Uuid::new_v4(),
                role: Role::User,
                content: "before".into(),
                created_at: now,
                metadata: serde_json::Value::Null,
            },
            crate::models::Message {
                id: Uuid::new_v4(),
                conversation_id: Uuid::new_v4(),
                role: Role::Assistant,
                content: "seed".into(),
                created_at: now,
                metadata: serde_json::Value::Null,
            },
        ];
        let content = render_window_content(&messages, 1, true);
        assert!(content.starts_with(CTX_START));
        assert!(content.ends_with(CTX_END));
        assert!(content.contains(&format!("{MATCH_START}seed{MATCH_END}")));
    }
}
