//! Append-only message store.
//!
//! Messages are never mutated after insert. Ordering within a thread is by
//! `created_at`, with the store-assigned `seq` breaking ties in insertion
//! order. Author name resolution maps a missing author id to `"AI"`.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Message, MessageView};

pub const ASSISTANT_AUTHOR_NAME: &str = "AI";

/// Insert a message and return it. `author_id = None` marks an
/// assistant-authored message.
pub async fn insert_message(
    pool: &SqlitePool,
    thread_id: &str,
    channel_id: &str,
    author_id: Option<&str>,
    content: &str,
    created_at: i64,
) -> Result<Message> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO messages (id, thread_id, channel_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(thread_id)
    .bind(channel_id)
    .bind(author_id)
    .bind(content)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(Message {
        id,
        thread_id: Some(thread_id.to_string()),
        channel_id: channel_id.to_string(),
        author_id: author_id.map(|s| s.to_string()),
        content: content.to_string(),
        created_at,
    })
}

/// All messages in a thread, oldest first, with author names resolved.
pub async fn list_thread_messages(pool: &SqlitePool, thread_id: &str) -> Result<Vec<MessageView>> {
    let rows = sqlx::query(
        r#"
        SELECT m.id, m.thread_id, m.channel_id, m.author_id, m.content, m.created_at,
               u.name AS author_name
        FROM messages m
        LEFT JOIN users u ON u.id = m.author_id
        WHERE m.thread_id = ?
        ORDER BY m.created_at ASC, m.seq ASC
        "#,
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_view).collect())
}

/// All messages in a channel, oldest first, with author names resolved.
pub async fn list_channel_messages(
    pool: &SqlitePool,
    channel_id: &str,
) -> Result<Vec<MessageView>> {
    let rows = sqlx::query(
        r#"
        SELECT m.id, m.thread_id, m.channel_id, m.author_id, m.content, m.created_at,
               u.name AS author_name
        FROM messages m
        LEFT JOIN users u ON u.id = m.author_id
        WHERE m.channel_id = ?
        ORDER BY m.created_at ASC, m.seq ASC
        "#,
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_view).collect())
}

/// The most recent `limit` messages of a thread, newest first.
pub async fn recent_thread_messages(
    pool: &SqlitePool,
    thread_id: &str,
    limit: i64,
) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        r#"
        SELECT id, thread_id, channel_id, author_id, content, created_at
        FROM messages
        WHERE thread_id = ?
        ORDER BY created_at DESC, seq DESC
        LIMIT ?
        "#,
    )
    .bind(thread_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Message {
            id: row.get("id"),
            thread_id: row.get("thread_id"),
            channel_id: row.get("channel_id"),
            author_id: row.get("author_id"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn count_thread_messages(pool: &SqlitePool, thread_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE thread_id = ?")
        .bind(thread_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_view(row: &sqlx::sqlite::SqliteRow) -> MessageView {
    let author_id: Option<String> = row.get("author_id");
    let author_name: Option<String> = row.get("author_name");
    MessageView {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        channel_id: row.get("channel_id"),
        author_name: match (&author_id, author_name) {
            (Some(_), Some(name)) => name,
            // Author row deleted out from under the message: keep the id
            // visible rather than misattributing to the assistant.
            (Some(id), None) => id.clone(),
            (None, _) => ASSISTANT_AUTHOR_NAME.to_string(),
        },
        author_id,
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
