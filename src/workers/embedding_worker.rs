use crate::config::JobQueueConfig;
use crate::error::Error;
use crate::models::job::GenerateEmbeddingPayload;
use crate::providers::Embedder;
use crate::queries::jobs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Background worker draining the `generate_embedding` job queue: dequeues
/// a batch, calls the embedder once for the whole batch, and upserts each
/// resulting vector. Runs until `shutdown_rx` fires.
pub async fn embedding_worker(
    pool: sqlx::PgPool,
    embedder: Arc<dyn Embedder>,
    config: JobQueueConfig,
    owner: String,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut poll_interval = interval(Duration::from_secs(config.poll_interval_seconds));

    info!(owner = %owner, "[EmbeddingWorker] started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(owner = %owner, "[EmbeddingWorker] shutting down");
                break;
            }
            _ = poll_interval.tick() => {
                drain_embedding_queue(&pool, embedder.as_ref(), &config, &owner).await;
            }
        }
    }

    info!(owner = %owner, "[EmbeddingWorker] stopped");
}

/// Drains the queue by processing batches until empty or a batch errors.
async fn drain_embedding_queue(
    pool: &sqlx::PgPool,
    embedder: &dyn Embedder,
    config: &JobQueueConfig,
    owner: &str,
) {
    loop {
        match process_embedding_batch(pool, embedder, config, owner).await {
            Ok(0) => break,
            Ok(count) => info!(count, "[EmbeddingWorker] processed batch"),
            Err(e) => {
                warn!(error = %e, "[EmbeddingWorker] error processing batch");
                break;
            }
        }
    }
}

/// Dequeues up to `batch_size` jobs, embeds their contents in one call, and
/// upserts/marks each job according to its outcome (§4.4).
async fn process_embedding_batch(
    pool: &sqlx::PgPool,
    embedder: &dyn Embedder,
    config: &JobQueueConfig,
    owner: &str,
) -> crate::error::Result<usize> {
    let mut conn = pool.acquire().await.map_err(Error::Sqlx)?;
    let leased = jobs::dequeue_next(
        &mut conn,
        crate::models::job::GENERATE_EMBEDDING,
        embedder.batch_size() as i64,
        config.lease_duration_seconds,
        owner,
    )
    .await?;
    drop(conn);

    if leased.is_empty() {
        return Ok(0);
    }

    let payloads: Vec<Option<GenerateEmbeddingPayload>> = leased
        .iter()
        .map(|job| serde_json::from_value(job.payload.clone()).ok())
        .collect();

    let texts: Vec<String> = payloads
        .iter()
        .map(|p| p.as_ref().map(|p| p.content.clone()).unwrap_or_default())
        .collect();

    let embed_result = embedder.embed_batch(&texts).await;

    let mut conn = pool.acquire().await.map_err(Error::Sqlx)?;
    let count = leased.len();

    match embed_result {
        Ok(vectors) if vectors.len() == leased.len() => {
            for ((job, payload), vector) in leased.iter().zip(payloads.iter()).zip(vectors.into_iter()) {
                let Some(payload) = payload else {
                    jobs::mark_failed(&mut conn, job.id, "malformed job payload", true, chrono::Duration::zero())
                        .await?;
                    continue;
                };
                match crate::queries::embeddings::upsert_for_message(
                    &mut conn,
                    payload.message_id,
                    &payload.model,
                    vector,
                )
                .await
                {
                    Ok(()) => {
                        if let Err(inner) = jobs::mark_completed(&mut conn, job.id).await {
                            error!(job_id = %job.id, error = %inner, "failed to record job completion");
                        }
                    }
                    Err(err) => {
                        // e.g. the message was deleted after the job was enqueued: the
                        // message_id FK can never resolve, so retrying would just fail again.
                        if let Err(inner) =
                            jobs::mark_failed(&mut conn, job.id, &err.to_string(), true, chrono::Duration::zero())
                                .await
                        {
                            error!(job_id = %job.id, error = %inner, "failed to record job failure");
                        }
                    }
                }
            }
        }
        Ok(_) => {
            for job in &leased {
                jobs::mark_failed(
                    &mut conn,
                    job.id,
                    "embedder returned a mismatched batch size",
                    false,
                    jobs::backoff_for_attempt(job.attempts, config.backoff_base_seconds, config.backoff_max_seconds),
                )
                .await?;
            }
        }
        Err(err) => {
            let permanent = matches!(err, Error::PermanentBackend(_));
            for job in &leased {
                let backoff =
                    jobs::backoff_for_attempt(job.attempts, config.backoff_base_seconds, config.backoff_max_seconds);
                if let Err(inner) =
                    jobs::mark_failed(&mut conn, job.id, &err.to_string(), permanent, backoff).await
                {
                    error!(job_id = %job.id, error = %inner, "failed to record job failure");
                }
            }
        }
    }

    Ok(count)
}
