//! User lookup and get-or-create.
//!
//! Users are keyed by unique name and immutable after creation except for
//! the best-effort `last_active_at` touch.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::User;

/// Idempotent get-or-create by name.
pub async fn get_or_create_user(pool: &SqlitePool, name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(Error::Validation("user name must not be empty".into()));
    }

    if let Some(id) = find_user_by_name(pool, name).await? {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO users (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
    )
    .bind(&id)
    .bind(name)
    .bind(now)
    .execute(pool)
    .await?;

    find_user_by_name(pool, name)
        .await?
        .ok_or_else(|| Error::not_found("user", name))
}

async fn find_user_by_name(pool: &SqlitePool, name: &str) -> Result<Option<String>> {
    let id = sqlx::query_scalar("SELECT id FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<User> {
    let row = sqlx::query("SELECT id, name, created_at, last_active_at FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
        last_active_at: row.get("last_active_at"),
    })
}

/// Best-effort activity marker; failures are swallowed by callers.
pub async fn touch_last_active(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query("UPDATE users SET last_active_at = ? WHERE id = ?")
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
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
    async fn test_get_or_create_idempotent() {
        let pool = memory_pool().await;
        let a = get_or_create_user(&pool, "alice").await.unwrap();
        let b = get_or_create_user(&pool, "alice").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_touch_last_active() {
        let pool = memory_pool().await;
        let id = get_or_create_user(&pool, "bob").await.unwrap();
        assert!(get_user(&pool, &id).await.unwrap().last_active_at.is_none());
        touch_last_active(&pool, &id).await.unwrap();
        assert!(get_user(&pool, &id).await.unwrap().last_active_at.is_some());
    }
}
