//! End-to-end pipeline tests: upload → embed → search → send → respond,
//! driven through the same [`App`] state the HTTP server uses, with
//! deterministic fake providers in place of the network backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use parley::channels::ensure_default_channel;
use parley::completion::{Completer, Completion};
use parley::config::{ChunkingConfig, Config, DbConfig, ServerConfig, StorageConfig};
use parley::convo;
use parley::documents;
use parley::embedding::{embed_query, Embedder};
use parley::error::Result;
use parley::ingest;
use parley::messages;
use parley::migrate::create_schema;
use parley::models::{ChatMessage, DocumentStatus};
use parley::search::search;
use parley::storage::BlobStore;
use parley::tasks::{spawn_worker, App, TaskQueue};
use parley::threads;
use parley::users::get_or_create_user;

/// Deterministic embedder: a text always maps to the same unit-independent
/// vector, so searching with a chunk's exact text scores that chunk 1.0.
struct HashEmbedder;

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = [0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += b as f32;
    }
    v.to_vec()
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-8"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

/// Completer that echoes how many context messages it was given.
struct EchoCompleter;

#[async_trait]
impl Completer for EchoCompleter {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        Ok(Completion {
            content: Some(format!("echo:{}", messages.len())),
            prompt_tokens: Some(messages.len() as i64),
            completion_tokens: Some(1),
        })
    }
}

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

fn test_config(dir: &TempDir, max_tokens: usize) -> Config {
    Config {
        db: DbConfig {
            path: dir.path().join("parley.sqlite"),
            max_connections: 1,
            busy_timeout_secs: 5,
        },
        storage: StorageConfig {
            root: dir.path().join("blobs"),
        },
        chunking: ChunkingConfig { max_tokens },
        retrieval: Default::default(),
        embedding: Default::default(),
        completion: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

/// Build an App with a running worker and fake providers. `max_tokens` is
/// kept small so short fixture paragraphs land in separate chunks.
async fn test_app(dir: &TempDir) -> App {
    let pool = memory_pool().await;
    let blobs = BlobStore::new(dir.path().join("blobs")).unwrap();
    let (tasks, rx) = TaskQueue::new();
    let app = App {
        pool,
        blobs,
        embedder: Some(Arc::new(HashEmbedder)),
        completer: Some(Arc::new(EchoCompleter)),
        config: Arc::new(test_config(dir, 16)),
        tasks,
    };
    spawn_worker(app.clone(), rx);
    app
}

async fn wait_for_status(pool: &SqlitePool, document_id: &str, want: DocumentStatus) {
    for _ in 0..200 {
        let doc = documents::get_document(pool, document_id).await.unwrap();
        if doc.status == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("document {} never reached {:?}", document_id, want);
}

async fn wait_for_message_count(pool: &SqlitePool, thread_id: &str, want: usize) {
    for _ in 0..200 {
        let msgs = messages::list_thread_messages(pool, thread_id).await.unwrap();
        if msgs.len() >= want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("thread {} never reached {} messages", thread_id, want);
}

/// Serve the router on an ephemeral port, returning its base URL.
async fn serve_app(app: App) -> String {
    let router = parley::server::build_router(app);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_mutating_endpoints_require_identity_header() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();
    let base = serve_app(app).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/threads", base))
        .json(&serde_json::json!({ "channel_id": channel }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let resp = client
        .post(format!("{}/documents/upload-url", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .delete(format!("{}/documents/some-doc", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    // The same call with the header set gets past auth.
    let resp = client
        .post(format!("{}/threads", base))
        .header("x-authenticated-user", "alice")
        .json(&serde_json::json!({ "channel_id": channel }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_default_channel_is_idempotent() {
    let pool = memory_pool().await;
    let a = ensure_default_channel(&pool).await.unwrap();
    let b = ensure_default_channel(&pool).await.unwrap();
    assert_eq!(a, b);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM channels")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_send_sequence_orders_and_bumps_thread() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();
    let thread = threads::create_thread(&app.pool, &channel, "New chat")
        .await
        .unwrap();
    let user = get_or_create_user(&app.pool, "alice").await.unwrap();

    let before = threads::get_thread(&app.pool, &thread).await.unwrap();
    for i in 0..5 {
        convo::send_message(&app.pool, &app.tasks, &thread, &user, &format!("msg {}", i))
            .await
            .unwrap();
    }

    // Each send also schedules a response; wait for 5 user + 5 assistant.
    wait_for_message_count(&app.pool, &thread, 10).await;

    let msgs = messages::list_thread_messages(&app.pool, &thread).await.unwrap();
    let user_turns: Vec<&str> = msgs
        .iter()
        .filter(|m| m.author_id.is_some())
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_turns, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    // Created order never goes backwards.
    for pair in msgs.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }

    let after = threads::get_thread(&app.pool, &thread).await.unwrap();
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn test_first_message_sets_truncated_title() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();
    let thread = threads::create_thread(&app.pool, &channel, "New chat")
        .await
        .unwrap();
    let user = get_or_create_user(&app.pool, "alice").await.unwrap();

    let long = "z".repeat(80);
    convo::send_message(&app.pool, &app.tasks, &thread, &user, &long)
        .await
        .unwrap();

    let titled = threads::get_thread(&app.pool, &thread).await.unwrap();
    assert_eq!(titled.title.chars().count(), 50);
    assert_eq!(&titled.title[..47], &long[..47]);
    assert!(titled.title.ends_with("..."));
}

#[tokio::test]
async fn test_upload_embed_search_end_to_end() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();

    let chunk_one = "The first paragraph covers billing and invoices.";
    let chunk_two = "The second paragraph explains the refund policy in detail.";
    let content = format!("{}\n\n{}", chunk_one, chunk_two);

    let doc_id = ingest::upload(
        &app.pool,
        &app.blobs,
        &app.tasks,
        "policy.txt",
        "text/plain",
        content.as_bytes(),
        &channel,
    )
    .await
    .unwrap();

    wait_for_status(&app.pool, &doc_id, DocumentStatus::Processed).await;

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
            .bind(&doc_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(stored, 2);

    // Querying with chunk two's exact text puts it first with score 1.0.
    let embedder = app.embedder.as_deref().unwrap();
    let query = embed_query(embedder, chunk_two).await.unwrap();
    let hits = search(&app.pool, &query, None, 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].content, chunk_two);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits[1].score < 1.0);

    let meta = hits[0].metadata.as_ref().unwrap();
    assert_eq!(meta.document_name, "policy.txt");
    assert_eq!(meta.chunk_index, 1);
}

#[tokio::test]
async fn test_reembedding_keeps_chunk_count_stable() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();

    let doc_id = ingest::upload(
        &app.pool,
        &app.blobs,
        &app.tasks,
        "notes.txt",
        "text/plain",
        b"alpha\n\nbeta\n\ngamma",
        &channel,
    )
    .await
    .unwrap();
    wait_for_status(&app.pool, &doc_id, DocumentStatus::Processed).await;

    let count_chunks = || async {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
            .bind(&doc_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
        n
    };
    let first = count_chunks().await;

    let embedder = app.embedder.as_deref().unwrap();
    parley::embed_doc::embed_document(
        &app.pool,
        &app.blobs,
        embedder,
        app.config.chunking.max_tokens,
        app.config.embedding.batch_size,
        &doc_id,
    )
    .await
    .unwrap();

    assert_eq!(count_chunks().await, first);
}

#[tokio::test]
async fn test_assistant_response_lands_in_thread() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();
    let thread = threads::create_thread(&app.pool, &channel, "New chat")
        .await
        .unwrap();
    let user = get_or_create_user(&app.pool, "alice").await.unwrap();

    convo::send_message(&app.pool, &app.tasks, &thread, &user, "hello?")
        .await
        .unwrap();
    wait_for_message_count(&app.pool, &thread, 2).await;

    let msgs = messages::list_thread_messages(&app.pool, &thread).await.unwrap();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].author_name, "alice");
    assert_eq!(msgs[1].author_name, "AI");
    assert!(msgs[1].author_id.is_none());
    // EchoCompleter saw system + one user turn.
    assert_eq!(msgs[1].content, "echo:2");
}

#[tokio::test]
async fn test_thread_delete_removes_messages() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();
    let thread = threads::create_thread(&app.pool, &channel, "doomed")
        .await
        .unwrap();
    let user = get_or_create_user(&app.pool, "alice").await.unwrap();

    convo::send_message(&app.pool, &app.tasks, &thread, &user, "so long")
        .await
        .unwrap();
    wait_for_message_count(&app.pool, &thread, 2).await;

    threads::delete_thread(&app.pool, &thread).await.unwrap();

    assert!(threads::get_thread(&app.pool, &thread).await.is_err());
    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE thread_id = ?")
        .bind(&thread)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn test_document_delete_removes_chunks_and_blob() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let channel = ensure_default_channel(&app.pool).await.unwrap();

    let doc_id = ingest::upload(
        &app.pool,
        &app.blobs,
        &app.tasks,
        "old.txt",
        "text/plain",
        b"to be removed",
        &channel,
    )
    .await
    .unwrap();
    wait_for_status(&app.pool, &doc_id, DocumentStatus::Processed).await;
    let storage_id = documents::get_document(&app.pool, &doc_id)
        .await
        .unwrap()
        .storage_id;

    documents::remove_document(&app.pool, &app.blobs, &doc_id)
        .await
        .unwrap();

    assert!(documents::get_document(&app.pool, &doc_id).await.is_err());
    assert!(!app.blobs.exists(&storage_id));
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
        .bind(&doc_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(chunks, 0);
}
