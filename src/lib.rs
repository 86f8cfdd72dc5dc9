pub mod config;
pub mod database;
pub mod error;
pub mod extractors;
pub mod format;
pub mod importer;
pub mod models;
pub mod operations;
pub mod providers;
pub mod queries;
pub mod retrieval;
pub mod search;
pub mod workers;

pub use config::Config;
pub use database::{DbConn, DbPool};
pub use error::{Error, Result, ValidationErrors};
pub use extractors::FormatRegistry;
pub use importer::{ImportSummary, Importer};
pub use providers::{Embedder, OpenAiCompatibleEmbedder};
pub use retrieval::{ContextWindow, ContextualRetrieval, RetrievalParams};
pub use search::{SearchResult, SearchService, SearchType};
pub use workers::{embedding_worker, lease_reclaimer};

use std::sync::Arc;

/// Load configuration from environment variables.
pub fn load_config() -> Result<Config> {
    Ok(Config::load()?)
}

/// Initialize tracing subscriber with environment filter.
///
/// Reads `RUST_LOG`; defaults to "info" when unset.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Everything the process needs to run the worker fleet and serve search
/// requests: the pool, the format registry, and the embedder, all sharable
/// across tasks.
#[derive(Clone)]
pub struct AppContext {
    pub pool: DbPool,
    pub registry: Arc<FormatRegistry>,
    pub embedder: Arc<dyn Embedder>,
}

impl AppContext {
    pub async fn connect(config: &Config) -> Result<Self> {
        use secrecy::ExposeSecret;

        let pool = DbPool::connect(config.database.connection_string().expose_secret())
            .await
            .map_err(|e| Error::Internal(format!("failed to connect to database: {e}")))?;

        let registry = Arc::new(FormatRegistry::with_builtin_extractors());
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiCompatibleEmbedder::new(&config.embedder));

        Ok(Self { pool, registry, embedder })
    }

    pub fn importer(&self) -> Importer<'_> {
        Importer::new(&self.pool, &self.registry, self.embedder.model().to_string())
    }

    pub fn search_service(&self, config: &Config) -> SearchService {
        SearchService::new(self.pool.clone(), self.embedder.clone(), config.search.clone())
    }

    pub fn contextual_retrieval(&self, config: &Config) -> ContextualRetrieval {
        ContextualRetrieval::new(self.search_service(config), config.rag.clone())
    }
}

/// Spawns the embedding worker pool and the lease reclaimer as tokio tasks
/// sharing one `broadcast` shutdown signal, matching the host stack's own
/// worker-spawning shape (one task per background concern, each handed a
/// pool clone and a subscriber). Returns once `shutdown_rx` fires and every
/// task has observed it.
pub async fn run_workers(
    config: &Config,
    context: &AppContext,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let (workers_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let mut handles = Vec::new();
    for i in 0..config.job_queue.worker_concurrency.max(1) {
        let pool = context.pool.clone();
        let embedder = context.embedder.clone();
        let job_queue_config = config.job_queue.clone();
        let owner = format!("embedding-worker-{i}");
        let rx = workers_tx.subscribe();
        handles.push(tokio::spawn(async move {
            embedding_worker(pool, embedder, job_queue_config, owner, rx).await;
        }));
    }

    {
        let pool = context.pool.clone();
        let interval_seconds = config.job_queue.reclaim_interval_seconds;
        let rx = workers_tx.subscribe();
        handles.push(tokio::spawn(async move {
            lease_reclaimer(pool, interval_seconds, rx).await;
        }));
    }

    let _ = shutdown_rx.recv().await;
    tracing::info!("shutdown signal received, stopping worker fleet");
    let _ = workers_tx.send(());

    for handle in handles {
        let _ = handle.await;
    }
}
