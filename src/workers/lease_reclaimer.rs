use crate::error::Error;
use crate::queries::jobs;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

/// Periodic sweep reclaiming leased jobs whose lease has expired, returning
/// them to `pending` so another worker can pick them up (§4.4).
pub async fn lease_reclaimer(
    pool: sqlx::PgPool,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut reclaim_interval = interval(Duration::from_secs(interval_seconds));

    info!("[LeaseReclaimer] started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[LeaseReclaimer] shutting down");
                break;
            }
            _ = reclaim_interval.tick() => {
                match reclaim_once(&pool).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "[LeaseReclaimer] reclaimed expired leases"),
                    Err(e) => warn!(error = %e, "[LeaseReclaimer] sweep failed"),
                }
            }
        }
    }

    info!("[LeaseReclaimer] stopped");
}

async fn reclaim_once(pool: &sqlx::PgPool) -> crate::error::Result<u64> {
    let mut conn = pool.acquire().await.map_err(Error::Sqlx)?;
    jobs::reclaim_expired_leases(&mut conn).await
}
