use chatvault::load_config;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Once;

static INIT: Once = Once::new();

async fn connect() -> PgPool {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
    });

    let config = load_config().expect("failed to load config");
    let pool = PgPool::connect(config.database.connection_string().expose_secret())
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

/// Isolated test database handle. Conversations (and, by cascade, their
/// messages/embeddings) created by a test are tagged with `test_prefix()`
/// in their title, and removed when the handle drops.
pub struct TestDb {
    pub pool: PgPool,
    test_prefix: String,
}

impl TestDb {
    /// `test_name` should be the test function's own name, so stray data
    /// from a crashed prior run is cleaned up before the test starts and
    /// parallel tests never collide.
    pub async fn new(test_name: &str) -> Self {
        let pool = connect().await;
        let test_prefix = format!("test_{test_name}");

        Self::cleanup_prefix(&pool, &test_prefix).await;

        Self { pool, test_prefix }
    }

    pub fn test_prefix(&self) -> &str {
        &self.test_prefix
    }

    pub fn tagged_title(&self, suffix: &str) -> String {
        format!("{}_{}", self.test_prefix, suffix)
    }

    pub async fn get_connection(&self) -> sqlx::pool::PoolConnection<sqlx::Postgres> {
        self.pool.acquire().await.expect("failed to acquire connection")
    }

    async fn cleanup_prefix(pool: &PgPool, prefix: &str) {
        sqlx::query("DELETE FROM conversations WHERE title LIKE $1")
            .bind(format!("{prefix}%"))
            .execute(pool)
            .await
            .expect("failed to clean up test conversations");
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let prefix = self.test_prefix.clone();
        tokio::spawn(async move {
            let _ = sqlx::query("DELETE FROM conversations WHERE title LIKE $1")
                .bind(format!("{prefix}%"))
                .execute(&pool)
                .await;
        });
    }
}
