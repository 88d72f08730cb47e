use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            last_active_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS threads (
            id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (channel_id) REFERENCES channels(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // seq is the store-assigned insertion order; it breaks created_at ties.
    // thread_id and created_at are nullable only to admit legacy rows, which
    // the one-time backfill rewrites to the canonical shape.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            thread_id TEXT,
            channel_id TEXT NOT NULL,
            author_id TEXT,
            content TEXT NOT NULL,
            created_at INTEGER,
            FOREIGN KEY (channel_id) REFERENCES channels(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            channel_id TEXT NOT NULL,
            storage_id TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'processing',
            error TEXT,
            FOREIGN KEY (channel_id) REFERENCES channels(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL DEFAULT '',
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_channel ON threads(channel_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_channel ON documents(channel_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Counts of rows rewritten by [`run_backfill`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub timestamps_filled: u64,
    pub messages_rethreaded: u64,
}

pub async fn run_backfill(config: &Config) -> Result<BackfillReport> {
    let pool = db::connect(config).await?;
    let report = backfill_messages(&pool).await?;
    pool.close().await;
    Ok(report)
}

/// One-time batch rewrite of legacy message rows to the canonical schema.
///
/// Earlier schema versions allowed messages without a `created_at` and
/// channel-level messages without a thread. Rather than carrying that
/// optionality through business logic, this rewrites the rows once:
///
/// - missing `created_at` is derived from insertion order (`seq`), spaced
///   1ms apart below the earliest timestamped message so relative order
///   is preserved;
/// - messages without a thread are attached to a per-channel backfill
///   thread named "General".
pub async fn backfill_messages(pool: &SqlitePool) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();

    // Fill missing timestamps from insertion order.
    let untimed: Vec<(i64, String)> = sqlx::query_as(
        "SELECT seq, channel_id FROM messages WHERE created_at IS NULL ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;

    if !untimed.is_empty() {
        let floor: Option<i64> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM messages WHERE created_at IS NOT NULL")
                .fetch_one(pool)
                .await?;
        let base = floor
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
            - untimed.len() as i64;

        let mut tx = pool.begin().await?;
        for (offset, (seq, _)) in untimed.iter().enumerate() {
            sqlx::query("UPDATE messages SET created_at = ? WHERE seq = ?")
                .bind(base + offset as i64)
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            report.timestamps_filled += 1;
        }
        tx.commit().await?;
    }

    // Attach channel-level legacy messages to a per-channel backfill thread.
    let orphan_channels: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT channel_id FROM messages WHERE thread_id IS NULL ORDER BY channel_id",
    )
    .fetch_all(pool)
    .await?;

    for channel_id in orphan_channels {
        let now = chrono::Utc::now().timestamp_millis();
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM threads WHERE channel_id = ? AND title = 'General' ORDER BY created_at ASC LIMIT 1",
        )
        .bind(&channel_id)
        .fetch_optional(pool)
        .await?;

        let thread_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO threads (id, channel_id, title, created_at, updated_at) VALUES (?, ?, 'General', ?, ?)",
                )
                .bind(&id)
                .bind(&channel_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await?;
                id
            }
        };

        let rewritten = sqlx::query(
            "UPDATE messages SET thread_id = ? WHERE channel_id = ? AND thread_id IS NULL",
        )
        .bind(&thread_id)
        .bind(&channel_id)
        .execute(pool)
        .await?;
        report.messages_rethreaded += rewritten.rows_affected();

        // Keep the thread timestamp consistent with its newest message.
        sqlx::query(
            r#"
            UPDATE threads SET updated_at = MAX(updated_at,
                (SELECT COALESCE(MAX(created_at), 0) FROM messages WHERE thread_id = threads.id))
            WHERE id = ?
            "#,
        )
        .bind(&thread_id)
        .execute(pool)
        .await?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_backfill_fills_timestamps_and_threads() {
        let pool = memory_pool().await;

        sqlx::query("INSERT INTO channels (id, name) VALUES ('ch1', 'general')")
            .execute(&pool)
            .await
            .unwrap();
        for (id, content) in [("m1", "first"), ("m2", "second")] {
            sqlx::query(
                "INSERT INTO messages (id, channel_id, content) VALUES (?, 'ch1', ?)",
            )
            .bind(id)
            .bind(content)
            .execute(&pool)
            .await
            .unwrap();
        }

        let report = backfill_messages(&pool).await.unwrap();
        assert_eq!(report.timestamps_filled, 2);
        assert_eq!(report.messages_rethreaded, 2);

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE created_at IS NULL OR thread_id IS NULL",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(remaining, 0);

        // Insertion order preserved in derived timestamps.
        let times: Vec<i64> =
            sqlx::query_scalar("SELECT created_at FROM messages ORDER BY seq ASC")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(times[0] < times[1]);
    }

    #[tokio::test]
    async fn test_backfill_noop_on_canonical_rows() {
        let pool = memory_pool().await;
        let report = backfill_messages(&pool).await.unwrap();
        assert_eq!(report, BackfillReport::default());
    }
}
