use crate::{
    error::{Error, Result},
    models::message::{Message, MessageStats, NewMessage, Role},
    DbConn,
};
use uuid::Uuid;

/// Inserts a message. `metadata.original_conversation_id` is mirrored into the
/// generated `origin_id` column so `DuplicateGuard` can index on it directly.
pub async fn create(conn: &mut DbConn, new_msg: NewMessage) -> Result<Message> {
    let metadata = serde_json::to_value(&new_msg.metadata).map_err(Error::Json)?;

    let msg = sqlx::query_as!(
        Message,
        r#"
        INSERT INTO messages (conversation_id, role, content, created_at, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, conversation_id, role as "role: Role", content, created_at, metadata
        "#,
        new_msg.conversation_id,
        new_msg.role as Role,
        new_msg.content,
        new_msg.created_at,
        metadata,
    )
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(msg)
}

pub async fn get_by_conversation(conn: &mut DbConn, conversation_id: Uuid) -> Result<Vec<Message>> {
    let rows = sqlx::query_as!(
        Message,
        r#"
        SELECT id, conversation_id, role as "role: Role", content, created_at, metadata
        FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
        conversation_id,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows)
}

/// Loads up to `before` messages strictly preceding `anchor_created_at` and up
/// to `after` messages strictly following it, within one conversation,
/// clipped at conversation boundaries (§4.6 step 2).
pub async fn get_neighbours(
    conn: &mut DbConn,
    conversation_id: Uuid,
    anchor_created_at: chrono::DateTime<chrono::Utc>,
    anchor_id: Uuid,
    before: i64,
    after: i64,
) -> Result<(Vec<Message>, Vec<Message>)> {
    let before_rows = sqlx::query_as!(
        Message,
        r#"
        SELECT id, conversation_id, role as "role: Role", content, created_at, metadata
        FROM messages
        WHERE conversation_id = $1
          AND (created_at, id) < ($2, $3)
        ORDER BY created_at DESC, id DESC
        LIMIT $4
        "#,
        conversation_id,
        anchor_created_at,
        anchor_id,
        before,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;

    let after_rows = sqlx::query_as!(
        Message,
        r#"
        SELECT id, conversation_id, role as "role: Role", content, created_at, metadata
        FROM messages
        WHERE conversation_id = $1
          AND (created_at, id) > ($2, $3)
        ORDER BY created_at ASC, id ASC
        LIMIT $4
        "#,
        conversation_id,
        anchor_created_at,
        anchor_id,
        after,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;

    let mut before_rows = before_rows;
    before_rows.reverse();
    Ok((before_rows, after_rows))
}

/// Full-text search using the generated `tsvector` column and `ts_rank_cd`
/// (§4.5 FTS mode, §9 ranking-scale decision).
pub async fn search_full_text(
    conn: &mut DbConn,
    query: &str,
    limit: i64,
    conversation_id: Option<Uuid>,
) -> Result<Vec<(Message, f64)>> {
    let rows = sqlx::query!(
        r#"
        SELECT
            id, conversation_id, role as "role: Role", content, created_at, metadata,
            ts_rank_cd(search_vector, websearch_to_tsquery('english', $1)) as "rank!: f64"
        FROM messages
        WHERE search_vector @@ websearch_to_tsquery('english', $1)
          AND ($3::uuid IS NULL OR conversation_id = $3)
        ORDER BY rank DESC
        LIMIT $2
        "#,
        query,
        limit,
        conversation_id,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                Message {
                    id: r.id,
                    conversation_id: r.conversation_id,
                    role: r.role,
                    content: r.content,
                    created_at: r.created_at,
                    metadata: r.metadata,
                },
                r.rank,
            )
        })
        .collect())
}

/// Trigram fuzzy search over content, used as a fallback lookup path (§4.3).
pub async fn search_trigram(conn: &mut DbConn, query: &str, limit: i64) -> Result<Vec<Message>> {
    let rows = sqlx::query_as!(
        Message,
        r#"
        SELECT id, conversation_id, role as "role: Role", content, created_at, metadata
        FROM messages
        WHERE content % $1
        ORDER BY similarity(content, $1) DESC
        LIMIT $2
        "#,
        query,
        limit,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows)
}

/// Loads messages by id together with their owning conversation's title,
/// for assembling `SearchResult`/`ContextWindow` records that need both
/// (§4.5, §4.6). Order is unspecified; callers re-sort by id.
pub async fn get_with_conversation_title(
    conn: &mut DbConn,
    ids: &[Uuid],
) -> Result<Vec<(Message, String)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query!(
        r#"
        SELECT
            m.id, m.conversation_id, m.role as "role: Role", m.content, m.created_at, m.metadata,
            c.title as "conversation_title!"
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        WHERE m.id = ANY($1)
        "#,
        ids,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                Message {
                    id: r.id,
                    conversation_id: r.conversation_id,
                    role: r.role,
                    content: r.content,
                    created_at: r.created_at,
                    metadata: r.metadata,
                },
                r.conversation_title,
            )
        })
        .collect())
}

pub async fn get_message_stats(conn: &mut DbConn) -> Result<MessageStats> {
    let total = sqlx::query!("SELECT COUNT(*) as count FROM messages")
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Sqlx)?
        .count
        .unwrap_or(0);

    let by_role_rows = sqlx::query!(
        r#"SELECT role as "role!", COUNT(*) as "count!" FROM messages GROUP BY role"#
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;
    let by_role = by_role_rows.into_iter().map(|r| (r.role, r.count)).collect();

    let embedded = sqlx::query!("SELECT COUNT(*) as count FROM message_embeddings")
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Sqlx)?
        .count
        .unwrap_or(0);

    let created_last_24h = sqlx::query!(
        "SELECT COUNT(*) as count FROM messages WHERE created_at > NOW() - INTERVAL '24 hours'"
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Sqlx)?
    .count
    .unwrap_or(0);

    let coverage_pct = if total > 0 {
        (embedded as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    Ok(MessageStats {
        total,
        by_role,
        embedding_coverage_pct: coverage_pct,
        created_last_24h,
    })
}
