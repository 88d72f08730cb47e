//! Channel operations.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Channel;

pub const DEFAULT_CHANNEL_NAME: &str = "general";

/// Get-or-create the default channel. Idempotent: calling twice yields the
/// same channel id both times.
pub async fn ensure_default_channel(pool: &SqlitePool) -> Result<String> {
    if let Some(id) = find_channel_by_name(pool, DEFAULT_CHANNEL_NAME).await? {
        return Ok(id);
    }
    create_channel(pool, DEFAULT_CHANNEL_NAME).await
}

pub async fn create_channel(pool: &SqlitePool, name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(Error::Validation("channel name must not be empty".into()));
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO channels (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
        .bind(&id)
        .bind(name)
        .execute(pool)
        .await?;

    // A concurrent insert may have won the conflict; return the surviving row.
    find_channel_by_name(pool, name)
        .await?
        .ok_or_else(|| Error::not_found("channel", name))
}

async fn find_channel_by_name(pool: &SqlitePool, name: &str) -> Result<Option<String>> {
    let id = sqlx::query_scalar("SELECT id FROM channels WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_channel(pool: &SqlitePool, channel_id: &str) -> Result<Channel> {
    let row = sqlx::query("SELECT id, name FROM channels WHERE id = ?")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found("channel", channel_id))?;

    Ok(Channel {
        id: row.get("id"),
        name: row.get("name"),
    })
}
