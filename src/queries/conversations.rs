use crate::{
    error::{Error, Result},
    models::conversation::{Conversation, ConversationStats, NewConversation, Source},
    DbConn,
};
use uuid::Uuid;

/// Inserts a new conversation row. Called once per incoming conversation by
/// the importer, inside that conversation's own transaction.
pub async fn create(conn: &mut DbConn, new_conv: NewConversation) -> Result<Conversation> {
    let conv = sqlx::query_as!(
        Conversation,
        r#"
        INSERT INTO conversations (title, source, created_at, updated_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, source as "source: Source", created_at, updated_at
        "#,
        new_conv.title,
        new_conv.source as Option<Source>,
        new_conv.created_at,
        new_conv.updated_at,
    )
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(conv)
}

pub async fn get_by_id(conn: &mut DbConn, id: Uuid) -> Result<Option<Conversation>> {
    let conv = sqlx::query_as!(
        Conversation,
        r#"
        SELECT id, title, source as "source: Source", created_at, updated_at
        FROM conversations
        WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(conv)
}

pub async fn get_all(conn: &mut DbConn, limit: i64, offset: i64) -> Result<Vec<Conversation>> {
    let convs = sqlx::query_as!(
        Conversation,
        r#"
        SELECT id, title, source as "source: Source", created_at, updated_at
        FROM conversations
        ORDER BY updated_at DESC
        LIMIT $1 OFFSET $2
        "#,
        limit,
        offset,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(convs)
}

pub async fn count(conn: &mut DbConn) -> Result<i64> {
    let row = sqlx::query!("SELECT COUNT(*) as count FROM conversations")
        .fetch_one(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(row.count.unwrap_or(0))
}

/// Aggregate counters used by the `stats` operation in §6, including the
/// per-source breakdown carried over from the original implementation's
/// `calculate_source_breakdown` (§9.1).
pub async fn get_stats(conn: &mut DbConn) -> Result<ConversationStats> {
    let total_conversations = count(&mut *conn).await?;

    let total_messages = sqlx::query!("SELECT COUNT(*) as count FROM messages")
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Sqlx)?
        .count
        .unwrap_or(0);

    let rows = sqlx::query!(
        r#"
        SELECT COALESCE(source, 'unknown') as "source!", COUNT(*) as "count!"
        FROM conversations
        GROUP BY source
        "#
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;

    let by_source = rows.into_iter().map(|r| (r.source, r.count)).collect();

    Ok(ConversationStats {
        total_conversations,
        total_messages,
        by_source,
    })
}

/// Deletes a conversation; `messages`, `message_embeddings` cascade via FK (§4.3).
pub async fn delete(conn: &mut DbConn, id: Uuid) -> Result<()> {
    sqlx::query!("DELETE FROM conversations WHERE id = $1", id)
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(())
}

/// Deletes every conversation (and, by cascade, every message and
/// embedding); backs the `clear` operation in §6.
pub async fn delete_all(conn: &mut DbConn) -> Result<u64> {
    let result = sqlx::query!("DELETE FROM conversations")
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(result.rows_affected())
}

/// Builds the `origin_id -> (content_hash, internal_id)` map the
/// `DuplicateGuard` needs (§4.2), by reading each conversation's first
/// message metadata for `original_conversation_id` and recomputing its
/// content hash.
pub async fn load_origin_hash_map(
    conn: &mut DbConn,
) -> Result<std::collections::HashMap<String, (String, Uuid)>> {
    let rows = sqlx::query!(
        r#"
        SELECT conversation_id, origin_id as "origin_id!", content, created_at
        FROM messages
        WHERE origin_id IS NOT NULL
        ORDER BY conversation_id, created_at ASC, id ASC
        "#
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;

    let mut grouped: std::collections::HashMap<Uuid, (String, Vec<String>)> =
        std::collections::HashMap::new();
    for row in rows {
        let entry = grouped
            .entry(row.conversation_id)
            .or_insert_with(|| (row.origin_id.clone(), Vec::new()));
        entry.1.push(row.content.trim().to_string());
    }

    let mut out = std::collections::HashMap::new();
    for (conv_id, (origin_id, contents)) in grouped {
        let hash = crate::importer::content_hash(&contents.join("\n\n"));
        out.insert(origin_id, (hash, conv_id));
    }

    Ok(out)
}
