//! Thread lifecycle: create, read, list, title convenience, cascade delete.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Thread;

/// Display length cap for thread titles derived from message content.
pub const TITLE_MAX_CHARS: usize = 50;

pub async fn create_thread(pool: &SqlitePool, channel_id: &str, title: &str) -> Result<String> {
    // Thread must belong to an existing channel.
    crate::channels::get_channel(pool, channel_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO threads (id, channel_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(channel_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn get_thread(pool: &SqlitePool, thread_id: &str) -> Result<Thread> {
    let row = sqlx::query(
        "SELECT id, channel_id, title, created_at, updated_at FROM threads WHERE id = ?",
    )
    .bind(thread_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::not_found("thread", thread_id))?;

    Ok(row_to_thread(&row))
}

pub async fn list_threads(pool: &SqlitePool, channel_id: &str) -> Result<Vec<Thread>> {
    let rows = sqlx::query(
        "SELECT id, channel_id, title, created_at, updated_at FROM threads WHERE channel_id = ? ORDER BY updated_at DESC",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_thread).collect())
}

fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> Thread {
    Thread {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Bump `updated_at`, keeping it monotonic even if the caller's clock reads
/// earlier than a previous writer's.
pub async fn touch_thread(pool: &SqlitePool, thread_id: &str, at: i64) -> Result<()> {
    let updated = sqlx::query("UPDATE threads SET updated_at = MAX(updated_at, ?) WHERE id = ?")
        .bind(at)
        .bind(thread_id)
        .execute(pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::not_found("thread", thread_id));
    }
    Ok(())
}

/// Overwrite the title with a truncated copy of the first message content.
pub async fn set_title_from_content(
    pool: &SqlitePool,
    thread_id: &str,
    content: &str,
) -> Result<()> {
    let title = truncate_title(content);
    sqlx::query("UPDATE threads SET title = ? WHERE id = ?")
        .bind(&title)
        .bind(thread_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Truncate to [`TITLE_MAX_CHARS`] with an ellipsis suffix: content longer
/// than the cap keeps its first 47 chars plus `"..."`.
pub fn truncate_title(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= TITLE_MAX_CHARS {
        content.to_string()
    } else {
        let mut title: String = chars[..TITLE_MAX_CHARS - 3].iter().collect();
        title.push_str("...");
        title
    }
}

/// Delete a thread and all its messages. Messages go first so a mid-delete
/// failure can leave an empty thread behind but never orphaned messages.
pub async fn delete_thread(pool: &SqlitePool, thread_id: &str) -> Result<()> {
    // Verify existence up front for a clean not-found.
    get_thread(pool, thread_id).await?;

    sqlx::query("DELETE FROM messages WHERE thread_id = ?")
        .bind(thread_id)
        .execute(pool)
        .await?;

    sqlx::query("DELETE FROM threads WHERE id = ?")
        .bind(thread_id)
        .execute(pool)
        .await?;

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE thread_id = ?")
        .bind(thread_id)
        .fetch_one(pool)
        .await?;
    if orphans > 0 {
        return Err(Error::Consistency(format!(
            "{} messages left after deleting thread {}",
            orphans, thread_id
        )));
    }

    Ok(())
}
