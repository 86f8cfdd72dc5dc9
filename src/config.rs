use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embedder: EmbedderConfig,
    pub job_queue: JobQueueConfig,
    pub rag: RagConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub user: String,
    #[serde(skip_serializing)]
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Maximum pooled connections (request handlers + workers share this pool).
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            // Override with environment variables using a `CHATVAULT` prefix and `__` separator
            // e.g., CHATVAULT__DATABASE__USER="my_user" or CHATVAULT__EMBEDDER__API_KEY=...
            .add_source(
                config::Environment::with_prefix("CHATVAULT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }
}

impl DatabaseConfig {
    /// Constructs the database connection string.
    pub fn connection_string(&self) -> SecretString {
        SecretString::from(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        ))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string().into(),
            host: "localhost".to_string(),
            port: 5432,
            database: "chatvault".to_string(),
            max_connections: 10,
        }
    }
}

/// Configuration for the replaceable embedding provider (see `providers::embedder`).
#[derive(Clone, Deserialize, Serialize)]
pub struct EmbedderConfig {
    /// Model identifier passed to the provider, e.g. "text-embedding-3-small".
    pub model: String,
    /// Fixed vector dimension this model produces; validated against stored embeddings.
    pub dimension: usize,
    /// Base URL of an OpenAI-compatible embeddings endpoint.
    pub base_url: String,
    /// API key for the embedding provider.
    #[serde(skip_serializing)]
    pub api_key: SecretString,
    /// Maximum number of message contents sent per batched embed call.
    pub batch_size: usize,
}

impl fmt::Debug for EmbedderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedderConfig")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 384,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::from(String::new()),
            batch_size: 32,
        }
    }
}

/// Configuration for the durable job queue and its embedding workers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobQueueConfig {
    /// Maximum delivery attempts before a job is marked permanently failed.
    pub max_attempts: i32,
    /// How long a leased job is held before its lease is reclaimable.
    pub lease_duration_seconds: i64,
    /// How often a worker polls for new work when idle.
    pub poll_interval_seconds: u64,
    /// How often the lease-reclaimer sweep runs.
    pub reclaim_interval_seconds: u64,
    /// Number of concurrent embedding worker tasks to spawn.
    pub worker_concurrency: usize,
    /// Base for the exponential backoff applied on transient job failure, in seconds.
    pub backoff_base_seconds: i64,
    /// Backoff cap, in seconds.
    pub backoff_max_seconds: i64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lease_duration_seconds: 300,
            poll_interval_seconds: 5,
            reclaim_interval_seconds: 60,
            worker_concurrency: 2,
            backoff_base_seconds: 2,
            backoff_max_seconds: 600,
        }
    }
}

/// Default score-fusion weights and overfetch factors for search/retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub w_fts: f64,
    pub w_vec: f64,
    /// Multiplier applied to `k` for each of the FTS/vector candidate sets in hybrid search.
    pub overfetch_multiplier: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            w_fts: 0.4,
            w_vec: 0.6,
            overfetch_multiplier: 4,
        }
    }
}

/// Defaults and hard caps for contextual retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RagConfig {
    pub default_context_window: i64,
    pub max_window_size: i64,
    pub default_top_k_windows: i64,
    pub overfetch_factor: i64,
    pub proximity_decay_lambda: f64,
    pub neighbour_weight: f64,
    /// Characters-per-token heuristic used for `max_tokens` budgeting (documented in §4.6/§9).
    pub chars_per_token: f64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_context_window: 2,
            max_window_size: 20,
            default_top_k_windows: 5,
            overfetch_factor: 3,
            proximity_decay_lambda: 0.5,
            neighbour_weight: 0.15,
            chars_per_token: 4.0,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "error serializing config"),
        }
    }
}
