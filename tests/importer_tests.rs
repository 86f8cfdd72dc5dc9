mod common;

use chatvault::extractors::FormatRegistry;
use chatvault::models::conversation::Source;
use chatvault::queries;
use chatvault::Importer;
use common::TestDb;
use serde_json::json;
use std::io::Write as _;

/// Builds a minimal in-memory `.docx` (a ZIP with `word/document.xml`) whose
/// body alternates "You said:"/"ChatGPT said:" headings, matching what
/// `extractors::docx` expects to find.
fn minimal_docx(user_text: &str, assistant_text: &str) -> Vec<u8> {
    let document_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://example.com/w">
          <w:body>
            <w:p><w:r><w:t>You said:</w:t></w:r></w:p>
            <w:p><w:r><w:t>{user_text}</w:t></w:r></w:p>
            <w:p></w:p>
            <w:p><w:r><w:t>ChatGPT said:</w:t></w:r></w:p>
            <w:p><w:r><w:t>{assistant_text}</w:t></w:r></w:p>
          </w:body>
        </w:document>"#
    );

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn chatgpt_archive(title: &str, user_text: &str, assistant_text: &str) -> serde_json::Value {
    json!({
        "title": title,
        "create_time": 1_700_000_000.0,
        "id": format!("conv-{title}"),
        "mapping": {
            "node-1": {
                "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": [user_text]},
                    "create_time": 1_700_000_000.0
                }
            },
            "node-2": {
                "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": [assistant_text]},
                    "create_time": 1_700_000_010.0
                }
            }
        }
    })
}

#[tokio::test]
async fn importing_same_archive_twice_skips_as_duplicate() {
    let test_db = TestDb::new("importing_same_archive_twice_skips_as_duplicate").await;
    let title = test_db.tagged_title("conv-a");
    let registry = FormatRegistry::with_builtin_extractors();
    let importer = Importer::new(&test_db.pool, &registry, "text-embedding-3-small");

    let archive = chatgpt_archive(&title, "hello there", "hi, how can I help?");

    let first = importer.import_archive(&archive, Source::Chatgpt).await.unwrap();
    assert_eq!(first.imported, 1);
    assert_eq!(first.skipped_duplicate, 0);

    let second = importer.import_archive(&archive, Source::Chatgpt).await.unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped_duplicate, 1);
    assert!(second.message().contains("already indexed"));

    let mut conn = test_db.get_connection().await;
    let map = queries::conversations::load_origin_hash_map(&mut conn).await.unwrap();
    assert_eq!(map.len(), 1);
}

#[tokio::test]
async fn changed_content_on_reimport_is_skipped_not_merged() {
    let test_db = TestDb::new("changed_content_on_reimport_is_skipped_not_merged").await;
    let title = test_db.tagged_title("conv-b");
    let registry = FormatRegistry::with_builtin_extractors();
    let importer = Importer::new(&test_db.pool, &registry, "text-embedding-3-small");

    let original = chatgpt_archive(&title, "first question", "first answer");
    let edited = chatgpt_archive(&title, "first question, edited", "first answer, edited");

    let first = importer.import_archive(&original, Source::Chatgpt).await.unwrap();
    assert_eq!(first.imported, 1);

    let second = importer.import_archive(&edited, Source::Chatgpt).await.unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped_changed, 1);

    let mut conn = test_db.get_connection().await;
    let convs = queries::conversations::get_all(&mut conn, 10, 0).await.unwrap();
    let matching: Vec<_> = convs.iter().filter(|c| c.title == title).collect();
    assert_eq!(matching.len(), 1, "no new revision should have been created");
}

#[tokio::test]
async fn import_enqueues_one_embedding_job_per_message() {
    let test_db = TestDb::new("import_enqueues_one_embedding_job_per_message").await;
    let title = test_db.tagged_title("conv-c");
    let registry = FormatRegistry::with_builtin_extractors();
    let importer = Importer::new(&test_db.pool, &registry, "text-embedding-3-small");

    let archive = chatgpt_archive(&title, "why is the sky blue", "rayleigh scattering");
    importer.import_archive(&archive, Source::Chatgpt).await.unwrap();

    let mut conn = test_db.get_connection().await;
    let pending = queries::jobs::get_pending_jobs(&mut conn, "generate_embedding", 100).await.unwrap();
    let ours = pending
        .iter()
        .filter(|j| j.payload.get("content").and_then(|c| c.as_str()).map(|c| c.contains("rayleigh") || c.contains("sky blue")).unwrap_or(false))
        .count();
    assert_eq!(ours, 2);
}

#[tokio::test]
async fn claude_conversation_with_only_empty_attachment_message_is_discarded() {
    let test_db = TestDb::new("claude_conversation_with_only_empty_attachment_message_is_discarded").await;
    let title = test_db.tagged_title("conv-attachment-only");
    let registry = FormatRegistry::with_builtin_extractors();
    let importer = Importer::new(&test_db.pool, &registry, "text-embedding-3-small");

    let archive = json!({
        "uuid": "claude-attachment-only",
        "name": title,
        "chat_messages": [{
            "sender": "human",
            "text": "",
            "attachments": [{
                "file_name": "notes.txt",
                "file_size": 12,
                "file_type": "text/plain",
                "extracted_content": "some file content"
            }]
        }]
    });

    let summary = importer.import_archive(&archive, Source::Claude).await.unwrap();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped_empty, 1);

    let mut conn = test_db.get_connection().await;
    let convs = queries::conversations::get_all(&mut conn, 10, 0).await.unwrap();
    assert!(
        convs.iter().all(|c| c.title != title),
        "a conversation with zero insertable messages must not commit a Conversation row"
    );

    let pending = queries::jobs::get_pending_jobs(&mut conn, "generate_embedding", 100).await.unwrap();
    assert!(
        pending.iter().all(|j| j.payload.get("content").and_then(|c| c.as_str()) != Some("some file content")),
        "no embedding job should have been enqueued for a discarded conversation"
    );
}

#[tokio::test]
async fn docx_import_parses_role_headings_and_skips_on_reimport() {
    let test_db = TestDb::new("docx_import_parses_role_headings_and_skips_on_reimport").await;
    let filename = format!("{}.docx", test_db.tagged_title("export"));
    let registry = FormatRegistry::with_builtin_extractors();
    let importer = Importer::new(&test_db.pool, &registry, "text-embedding-3-small");

    let bytes = minimal_docx("what is rust ownership", "it tracks memory lifetimes");

    let first = importer.import_docx_file(&bytes, &filename, Source::Docx).await.unwrap();
    assert_eq!(first.imported, 1);

    let mut conn = test_db.get_connection().await;
    let map = queries::conversations::load_origin_hash_map(&mut conn).await.unwrap();
    let (_, conv_id) = map.get(&format!("docx:{filename}")).expect("docx origin id recorded");
    let messages = queries::messages::get_by_conversation(&mut conn, *conv_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, chatvault::models::message::Role::User);
    assert_eq!(messages[1].role, chatvault::models::message::Role::Assistant);

    let second = importer.import_docx_file(&bytes, &filename, Source::Docx).await.unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped_duplicate, 1);
}
