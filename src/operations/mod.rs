//! The transport-agnostic operations table from §6: plain async functions a
//! thin HTTP layer (external to this crate) can mount directly. Each returns
//! `Result<T>` using the crate's own `Error` type; an external web framework
//! maps `Error::status_code()` to its response.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{self, ConversationListEntry, SearchResultEntry};
use crate::models::conversation::Source;
use crate::models::message::Role;
use crate::queries::{conversations, embeddings, messages};
use crate::retrieval::{ContextWindow, RetrievalParams};
use crate::search::{DateRange, SearchType};
use crate::AppContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<ConversationListEntry>,
    pub pagination: Pagination,
}

const DEFAULT_PREVIEW_LEN: usize = 120;

/// `list conversations` (§6): returns the newest-first page, each entry
/// shaped by [`format::conversation_list`].
pub async fn list_conversations(ctx: &AppContext, page: i64, limit: i64) -> Result<ListConversationsResponse> {
    let page = page.max(1);
    let limit = limit.clamp(1, 200);
    let offset = (page - 1) * limit;

    let mut conn = ctx.pool.acquire().await.map_err(Error::Sqlx)?;
    let convs = conversations::get_all(&mut conn, limit, offset).await?;
    let total = conversations::count(&mut conn).await?;

    let mut with_preview = Vec::with_capacity(convs.len());
    for conv in convs {
        let first = messages::get_by_conversation(&mut conn, conv.id)
            .await?
            .into_iter()
            .next()
            .map(|m| m.content);
        with_preview.push((conv, first));
    }

    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    Ok(ListConversationsResponse {
        conversations: format::conversation_list(&with_preview, DEFAULT_PREVIEW_LEN),
        pagination: Pagination { page, limit, total, total_pages },
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub title: String,
    pub source: Option<Source>,
    pub date: chrono::DateTime<chrono::Utc>,
    pub assistant_name: String,
    pub messages: Vec<MessageView>,
}

/// `get conversation` (§6): full message list plus a derived
/// `assistant_name` (§6).
pub async fn get_conversation(ctx: &AppContext, id: Uuid) -> Result<Option<ConversationDetail>> {
    let mut conn = ctx.pool.acquire().await.map_err(Error::Sqlx)?;
    let Some(conv) = conversations::get_by_id(&mut conn, id).await? else {
        return Ok(None);
    };
    let rows = messages::get_by_conversation(&mut conn, id).await?;

    let sample = rows
        .iter()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    let assistant_name = format::assistant_name(conv.source, sample);

    Ok(Some(ConversationDetail {
        id: conv.id,
        title: conv.title,
        source: conv.source,
        date: conv.updated_at,
        assistant_name,
        messages: rows
            .into_iter()
            .map(|m| MessageView { role: m.role, content: m.content, created_at: m.created_at })
            .collect(),
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultEntry>,
}

/// `search` (§6). `search_type` is resolved through [`SearchService`] per
/// §4.5 (auto-degradation to FTS when no embeddings exist).
pub async fn search(
    ctx: &AppContext,
    config: &Config,
    query: &str,
    n: i64,
    search_type: SearchType,
    date_range: Option<DateRange>,
) -> Result<SearchResponse> {
    let service = ctx.search_service(config);
    let results = service.search(query, n, search_type, date_range).await?;

    Ok(SearchResponse { query: query.to_string(), results: format::search_results(&results) })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQueryResponse {
    pub query: String,
    pub search_type: String,
    pub results: Vec<ContextWindow>,
}

/// `rag query` (§6): contextual retrieval windows around the top hybrid
/// matches (§4.6).
pub async fn rag_query(
    ctx: &AppContext,
    config: &Config,
    query: &str,
    params: RetrievalParams,
) -> Result<RagQueryResponse> {
    let retrieval = ctx.contextual_retrieval(config);
    let results = retrieval.retrieve(&ctx.pool, query, params).await?;

    Ok(RagQueryResponse { query: query.to_string(), search_type: "hybrid".to_string(), results })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub status: String,
    pub document_count: i64,
    pub embedding_model: String,
    pub collection_name: String,
    /// Conversation count per normalised source tag (§9.1 `calculate_source_breakdown`).
    pub by_source: std::collections::HashMap<String, i64>,
    pub embedding_coverage_pct: f64,
}

/// `stats` (§6), with the per-source breakdown and embedding coverage
/// carried over from the original implementation (§9.1).
pub async fn stats(ctx: &AppContext) -> Result<StatsResponse> {
    let mut conn = ctx.pool.acquire().await.map_err(Error::Sqlx)?;
    let conv_stats = conversations::get_stats(&mut conn).await?;
    let coverage = embeddings::get_coverage_stats(&mut conn, ctx.embedder.model()).await?;

    Ok(StatsResponse {
        status: "ok".to_string(),
        document_count: conv_stats.total_messages,
        embedding_model: ctx.embedder.model().to_string(),
        collection_name: "messages".to_string(),
        by_source: conv_stats.by_source,
        embedding_coverage_pct: coverage.coverage_pct,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
    pub message: String,
}

/// `clear` (§6): deletes every conversation (messages/embeddings cascade).
pub async fn clear(ctx: &AppContext) -> Result<ClearResponse> {
    let mut conn = ctx.pool.acquire().await.map_err(Error::Sqlx)?;
    let deleted = conversations::delete_all(&mut conn).await?;

    Ok(ClearResponse {
        status: "ok".to_string(),
        message: format!("cleared {deleted} conversations"),
    })
}
