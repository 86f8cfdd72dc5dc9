use crate::{
    error::{Error, Result},
    models::job::{Job, JobStatus, QueueStats},
    DbConn,
};
use rand::Rng;
use uuid::Uuid;

/// Enqueues a job, available immediately.
pub async fn enqueue(
    conn: &mut DbConn,
    kind: &str,
    payload: serde_json::Value,
    max_attempts: i32,
) -> Result<Job> {
    let job = sqlx::query_as!(
        Job,
        r#"
        INSERT INTO jobs (kind, payload, status, attempts, max_attempts, available_at, created_at)
        VALUES ($1, $2, 'pending', 0, $3, NOW(), NOW())
        RETURNING
            id, kind, payload, status as "status: JobStatus", attempts, max_attempts,
            lease_owner, lease_expires_at, last_error, created_at, available_at
        "#,
        kind,
        payload,
        max_attempts,
    )
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(job)
}

/// Atomically claims up to `limit` ready jobs of the given kinds for `owner`.
///
/// Uses `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent dequeues never
/// double-lease the same row (§4.4): each worker's transaction only ever
/// sees rows no other in-flight transaction has already locked.
pub async fn dequeue_next(
    conn: &mut DbConn,
    kind: &str,
    limit: i64,
    lease_duration_seconds: i64,
    owner: &str,
) -> Result<Vec<Job>> {
    let mut tx = conn.begin().await.map_err(Error::Sqlx)?;

    let candidates = sqlx::query!(
        r#"
        SELECT id
        FROM jobs
        WHERE kind = $1
          AND status = 'pending'
          AND available_at <= NOW()
        ORDER BY available_at ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
        kind,
        limit,
    )
    .fetch_all(&mut *tx)
    .await
    .map_err(Error::Sqlx)?;

    if candidates.is_empty() {
        tx.commit().await.map_err(Error::Sqlx)?;
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = candidates.into_iter().map(|r| r.id).collect();

    let leased = sqlx::query_as!(
        Job,
        r#"
        UPDATE jobs
        SET status = 'leased',
            lease_owner = $2,
            lease_expires_at = NOW() + ($3 || ' seconds')::interval,
            attempts = attempts + 1
        WHERE id = ANY($1)
        RETURNING
            id, kind, payload, status as "status: JobStatus", attempts, max_attempts,
            lease_owner, lease_expires_at, last_error, created_at, available_at
        "#,
        &ids,
        owner,
        lease_duration_seconds.to_string(),
    )
    .fetch_all(&mut *tx)
    .await
    .map_err(Error::Sqlx)?;

    tx.commit().await.map_err(Error::Sqlx)?;
    Ok(leased)
}

/// Extends a leased job's expiry; called by the worker for batches that
/// outrun a single heartbeat interval (§4.4 step 4).
pub async fn heartbeat(
    conn: &mut DbConn,
    job_id: Uuid,
    owner: &str,
    lease_duration_seconds: i64,
) -> Result<()> {
    sqlx::query!(
        r#"
        UPDATE jobs
        SET lease_expires_at = NOW() + ($3 || ' seconds')::interval
        WHERE id = $1 AND lease_owner = $2 AND status = 'leased'
        "#,
        job_id,
        owner,
        lease_duration_seconds.to_string(),
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

pub async fn mark_completed(conn: &mut DbConn, job_id: Uuid) -> Result<()> {
    sqlx::query!(
        r#"
        UPDATE jobs
        SET status = 'completed', lease_owner = NULL, lease_expires_at = NULL
        WHERE id = $1
        "#,
        job_id,
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

/// Marks a job failed. If `permanent` or attempts have exhausted
/// `max_attempts`, the job is terminally `failed`; otherwise it returns to
/// `pending` with exponential backoff (§4.4).
pub async fn mark_failed(
    conn: &mut DbConn,
    job_id: Uuid,
    error: &str,
    permanent: bool,
    backoff: chrono::Duration,
) -> Result<()> {
    if permanent {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, lease_owner = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
            job_id,
            error,
        )
        .execute(&mut *conn)
        .await
        .map_err(Error::Sqlx)?;
        return Ok(());
    }

    sqlx::query!(
        r#"
        UPDATE jobs
        SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
            last_error = $2,
            lease_owner = NULL,
            lease_expires_at = NULL,
            available_at = NOW() + ($3 || ' seconds')::interval
        WHERE id = $1
        "#,
        job_id,
        error,
        backoff.num_seconds().to_string(),
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

pub async fn get_pending_jobs(conn: &mut DbConn, kind: &str, limit: i64) -> Result<Vec<Job>> {
    let jobs = sqlx::query_as!(
        Job,
        r#"
        SELECT
            id, kind, payload, status as "status: JobStatus", attempts, max_attempts,
            lease_owner, lease_expires_at, last_error, created_at, available_at
        FROM jobs
        WHERE kind = $1 AND status = 'pending'
        ORDER BY available_at ASC
        LIMIT $2
        "#,
        kind,
        limit,
    )
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(jobs)
}

pub async fn get_queue_stats(conn: &mut DbConn, kind: &str) -> Result<QueueStats> {
    let row = sqlx::query!(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'pending') as "pending!",
            COUNT(*) FILTER (WHERE status = 'leased') as "leased!",
            COUNT(*) FILTER (WHERE status = 'completed') as "completed!",
            COUNT(*) FILTER (WHERE status = 'failed') as "failed!"
        FROM jobs
        WHERE kind = $1
        "#,
        kind,
    )
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(QueueStats {
        pending: row.pending,
        leased: row.leased,
        completed: row.completed,
        failed: row.failed,
    })
}

/// Periodic sweep: any `leased` row whose lease has expired returns to
/// `pending` (§4.4, §8 boundary "worker lease recovery"). Returns the count
/// reclaimed.
pub async fn reclaim_expired_leases(conn: &mut DbConn) -> Result<u64> {
    let result = sqlx::query!(
        r#"
        UPDATE jobs
        SET status = 'pending', lease_owner = NULL, lease_expires_at = NULL
        WHERE status = 'leased' AND lease_expires_at < NOW()
        "#
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(result.rows_affected())
}

/// Exponential backoff with a cap; jitter avoids thundering-herd retries (§4.4).
pub fn backoff_for_attempt(attempt: i32, base_seconds: i64, max_seconds: i64) -> chrono::Duration {
    let exp = base_seconds.saturating_mul(1i64 << attempt.clamp(0, 20).min(30));
    let capped = exp.min(max_seconds).max(base_seconds);
    let jitter = (capped as f64 * 0.1 * rand::rng().random_range(0.0..1.0)) as i64;
    chrono::Duration::seconds(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotone_and_capped() {
        let b1 = backoff_for_attempt(1, 2, 600);
        let b2 = backoff_for_attempt(2, 2, 600);
        let b10 = backoff_for_attempt(10, 2, 600);
        assert!(b2.num_seconds() >= b1.num_seconds());
        assert!(b10.num_seconds() <= 660); // capped + jitter allowance
    }
}
