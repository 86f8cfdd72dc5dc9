use crate::{
    error::{Error, Result},
    models::embedding::{EmbeddingCoverage, VectorMatch},
    DbConn,
};
use pgvector::Vector;
use uuid::Uuid;

/// Inserts or replaces the embedding for (message_id, model), preserving the
/// "at most one embedding per (message, model)" invariant (§3) via the
/// unique constraint backing this upsert.
pub async fn upsert_for_message(
    conn: &mut DbConn,
    message_id: Uuid,
    model: &str,
    vector: Vector,
) -> Result<()> {
    sqlx::query!(
        r#"
        INSERT INTO message_embeddings (message_id, model, embedding, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (message_id, model) DO UPDATE
        SET embedding = EXCLUDED.embedding, created_at = EXCLUDED.created_at
        "#,
        message_id,
        model,
        vector as _,
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

pub async fn get_for_message(
    conn: &mut DbConn,
    message_id: Uuid,
    model: &str,
) -> Result<Option<Vector>> {
    let row = sqlx::query!(
        r#"SELECT embedding as "embedding: Vector" FROM message_embeddings WHERE message_id = $1 AND model = $2"#,
        message_id,
        model,
    )
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(row.and_then(|r| r.embedding))
}

/// Whether any embedding at all exists in the corpus; used by `search_type=auto`
/// and by hybrid search's FTS-only degradation (§4.5).
pub async fn any_exist(conn: &mut DbConn) -> Result<bool> {
    let row = sqlx::query!("SELECT EXISTS(SELECT 1 FROM message_embeddings) as \"exists!\"")
        .fetch_one(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(row.exists)
}

pub async fn get_coverage_stats(conn: &mut DbConn, model: &str) -> Result<EmbeddingCoverage> {
    let total_messages = sqlx::query!("SELECT COUNT(*) as count FROM messages")
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Sqlx)?
        .count
        .unwrap_or(0);

    let embedded_messages = sqlx::query!(
        "SELECT COUNT(*) as count FROM message_embeddings WHERE model = $1",
        model,
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Sqlx)?
    .count
    .unwrap_or(0);

    let coverage_pct = if total_messages > 0 {
        (embedded_messages as f64 / total_messages as f64) * 100.0
    } else {
        0.0
    };

    Ok(EmbeddingCoverage {
        embedded_messages,
        total_messages,
        coverage_pct,
    })
}

/// k-NN over the embeddings table for one model, cosine similarity expressed
/// as `1 - (embedding <=> query)` (pgvector's `<=>` is cosine *distance*),
/// the same convention the host stack uses for its own `semantic_search`.
pub async fn nearest(
    conn: &mut DbConn,
    query_vector: Vector,
    model: &str,
    k: i64,
) -> Result<Vec<VectorMatch>> {
    let rows = sqlx::query!(
        r#"
        SELECT message_id, (1 - (embedding <=> $1)) as "similarity!: f64"
        FROM message_embeddings
        WHERE model = $2
        ORDER BY embedding <=> $1
        LIMIT $3
        "#,
        query_vector as _,
        model,
        k,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows
        .into_iter()
        .map(|r| VectorMatch {
            message_id: r.message_id,
            similarity: r.similarity,
        })
        .collect())
}
