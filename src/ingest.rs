//! Document ingestion: upload validation, blob persistence, registration.
//!
//! Two-phase flow (supports direct PUTs of large files):
//! 1. [`reserve_upload`] hands out a storage id; the caller stores bytes
//!    against it via [`crate::storage::BlobStore::put`].
//! 2. [`register_upload`] validates the mime type, checks the bytes are
//!    there, creates the Document row with `status = processing`, and
//!    schedules the chunk embedder. The caller never blocks on embedding.
//!
//! [`upload`] runs both phases in one call for callers that already hold
//! the bytes. Registration is idempotent per storage id: if the metadata
//! write fails after the blob landed, retrying reuses the stored blob and
//! returns the same document.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::channels;
use crate::error::{Error, Result};
use crate::extract;
use crate::storage::BlobStore;
use crate::tasks::{Task, TaskQueue};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub channel_id: String,
}

/// Phase one: allocate a storage id for a direct upload.
pub fn reserve_upload(blobs: &BlobStore) -> String {
    blobs.reserve()
}

/// Phase two: register metadata for already-stored bytes and schedule
/// embedding. Returns the document id.
pub async fn register_upload(
    pool: &SqlitePool,
    blobs: &BlobStore,
    tasks: &TaskQueue,
    storage_id: &str,
    req: &UploadRequest,
) -> Result<String> {
    if !extract::is_allowed_mime_type(&req.mime_type) {
        return Err(Error::Validation(format!(
            "unsupported file type: {}. Allowed types: {}",
            req.mime_type,
            extract::ALLOWED_MIME_TYPES.join(", ")
        )));
    }

    channels::get_channel(pool, &req.channel_id).await?;

    if !blobs.exists(storage_id) {
        return Err(Error::Storage(format!(
            "no uploaded bytes for storage id {}",
            storage_id
        )));
    }

    // Idempotent retry: a previous registration of this blob wins.
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE storage_id = ?")
            .bind(storage_id)
            .fetch_optional(pool)
            .await?;
    if let Some(document_id) = existing {
        return Ok(document_id);
    }

    let document_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO documents (id, name, mime_type, size, channel_id, storage_id, uploaded_at, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'processing')
        "#,
    )
    .bind(&document_id)
    .bind(&req.name)
    .bind(&req.mime_type)
    .bind(req.size)
    .bind(&req.channel_id)
    .bind(storage_id)
    .bind(now)
    .execute(pool)
    .await?;

    tasks.enqueue(Task::EmbedDocument {
        document_id: document_id.clone(),
    })?;
    tracing::info!(document_id = %document_id, name = %req.name, "document registered");

    Ok(document_id)
}

/// One-shot upload: reserve, store bytes, register.
pub async fn upload(
    pool: &SqlitePool,
    blobs: &BlobStore,
    tasks: &TaskQueue,
    name: &str,
    mime_type: &str,
    content: &[u8],
    channel_id: &str,
) -> Result<String> {
    // Validate before touching storage so a bad type leaves no blob behind.
    if !extract::is_allowed_mime_type(mime_type) {
        return Err(Error::Validation(format!(
            "unsupported file type: {}. Allowed types: {}",
            mime_type,
            extract::ALLOWED_MIME_TYPES.join(", ")
        )));
    }

    let storage_id = reserve_upload(blobs);
    blobs.put(&storage_id, content)?;

    let req = UploadRequest {
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        size: content.len() as i64,
        channel_id: channel_id.to_string(),
    };
    register_upload(pool, blobs, tasks, &storage_id, &req).await
}
