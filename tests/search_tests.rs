mod common;

use chatvector_test_support::NeverCalledEmbedder;
use chatvault::config::SearchConfig;
use chatvault::models::conversation::{NewConversation, Source};
use chatvault::models::message::{MessageMetadata, NewMessage, Role};
use chatvault::queries;
use chatvault::search::{SearchService, SearchType};
use common::TestDb;
use std::sync::Arc;

mod chatvector_test_support {
    use async_trait::async_trait;
    use chatvault::error::Result;
    use chatvault::Embedder;
    use pgvector::Vector;

    /// Proves hybrid/fts search paths that should never touch the embedder
    /// actually don't.
    pub struct NeverCalledEmbedder;

    #[async_trait]
    impl Embedder for NeverCalledEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vector>> {
            panic!("embedder should not be called for a plain FTS search");
        }

        fn model(&self) -> &str {
            "never-called"
        }

        fn dimension(&self) -> usize {
            384
        }

        fn batch_size(&self) -> usize {
            16
        }
    }
}

async fn seed_conversation(
    test_db: &TestDb,
    title: &str,
    bodies: &[(Role, &str)],
) -> uuid::Uuid {
    let mut conn = test_db.get_connection().await;
    let now = chrono::Utc::now();

    let conversation = queries::conversations::create(
        &mut conn,
        NewConversation {
            title: title.to_string(),
            source: Some(Source::Chatgpt),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .unwrap();

    for (i, (role, content)) in bodies.iter().enumerate() {
        queries::messages::create(
            &mut conn,
            NewMessage {
                conversation_id: conversation.id,
                role: *role,
                content: content.to_string(),
                created_at: now + chrono::Duration::seconds(i as i64),
                metadata: MessageMetadata::default(),
            },
        )
        .await
        .unwrap();
    }

    conversation.id
}

#[tokio::test]
async fn fts_search_finds_lexical_match_without_calling_embedder() {
    let test_db = TestDb::new("fts_search_finds_lexical_match_without_calling_embedder").await;
    let title = test_db.tagged_title("rust-ownership");
    seed_conversation(
        &test_db,
        &title,
        &[
            (Role::User, "can you explain rust ownership and borrowing"),
            (Role::Assistant, "ownership tracks which variable is responsible for freeing memory"),
        ],
    )
    .await;

    let service = SearchService::new(test_db.pool.clone(), Arc::new(NeverCalledEmbedder), SearchConfig::default());
    let response = service.search("ownership borrowing", 10, SearchType::Fts, None).await.unwrap();

    assert!(response.iter().any(|r| r.content.contains("ownership tracks")));
}

#[tokio::test]
async fn auto_mode_degrades_to_fts_when_no_embeddings_exist() {
    let test_db = TestDb::new("auto_mode_degrades_to_fts_when_no_embeddings_exist").await;
    let title = test_db.tagged_title("postgres-indexes");
    seed_conversation(
        &test_db,
        &title,
        &[(Role::User, "how do postgres gin indexes work for full text search")],
    )
    .await;

    let service = SearchService::new(test_db.pool.clone(), Arc::new(NeverCalledEmbedder), SearchConfig::default());
    let response = service.search("gin indexes postgres", 10, SearchType::Auto, None).await.unwrap();

    assert!(!response.is_empty());
    assert!(response.iter().all(|r| r.similarity.is_none()), "no embeddings exist, so similarity must be absent");
}

#[tokio::test]
async fn date_range_filter_excludes_messages_outside_the_window() {
    let test_db = TestDb::new("date_range_filter_excludes_messages_outside_the_window").await;
    let title = test_db.tagged_title("old-and-new");

    let mut conn = test_db.get_connection().await;
    let old_time = "2020-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap();
    let new_time = chrono::Utc::now();

    let conversation = queries::conversations::create(
        &mut conn,
        NewConversation {
            title: title.clone(),
            source: Some(Source::Chatgpt),
            created_at: old_time,
            updated_at: new_time,
        },
    )
    .await
    .unwrap();

    queries::messages::create(
        &mut conn,
        NewMessage {
            conversation_id: conversation.id,
            role: Role::User,
            content: "archived discussion about kubernetes networking".to_string(),
            created_at: old_time,
            metadata: MessageMetadata::default(),
        },
    )
    .await
    .unwrap();

    queries::messages::create(
        &mut conn,
        NewMessage {
            conversation_id: conversation.id,
            role: Role::User,
            content: "fresh discussion about kubernetes networking".to_string(),
            created_at: new_time,
            metadata: MessageMetadata::default(),
        },
    )
    .await
    .unwrap();

    let service = SearchService::new(test_db.pool.clone(), Arc::new(NeverCalledEmbedder), SearchConfig::default());
    let range = chatvault::search::DateRange { from: Some(new_time - chrono::Duration::minutes(1)), to: None };
    let response = service
        .search("kubernetes networking", 10, SearchType::Fts, Some(range))
        .await
        .unwrap();

    assert!(response.iter().all(|r| r.content.starts_with("fresh")));
}
