//! Caller resolution.
//!
//! Credential verification happens upstream (a reverse proxy or gateway
//! injects `x-authenticated-user`); this module only maps that asserted
//! identity to a user row, creating it on first sight.

use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::User;
use crate::users;

/// Header carrying the upstream-verified identity.
pub const IDENTITY_HEADER: &str = "x-authenticated-user";

/// The resolved caller of a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: User,
    /// The identity string as asserted upstream.
    pub identity: String,
}

/// Resolve an asserted identity into a [`Caller`]. A missing or blank
/// identity is an authentication failure, not a validation one.
pub async fn resolve_caller(pool: &SqlitePool, identity: Option<&str>) -> Result<Caller> {
    let identity = match identity {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            return Err(Error::Authentication(format!(
                "missing {} header",
                IDENTITY_HEADER
            )))
        }
    };

    let user_id = users::get_or_create_user(pool, &identity).await?;
    let user = users::get_user(pool, &user_id).await?;

    Ok(Caller { user, identity })
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
    async fn test_missing_identity_is_unauthorized() {
        let pool = memory_pool().await;
        assert!(matches!(
            resolve_caller(&pool, None).await.unwrap_err(),
            Error::Authentication(_)
        ));
        assert!(matches!(
            resolve_caller(&pool, Some("  ")).await.unwrap_err(),
            Error::Authentication(_)
        ));
    }

    #[tokio::test]
    async fn test_repeat_callers_resolve_to_same_user() {
        let pool = memory_pool().await;
        let first = resolve_caller(&pool, Some("alice")).await.unwrap();
        let second = resolve_caller(&pool, Some("alice")).await.unwrap();
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.name, "alice");
    }
}
