//! Document records and their lifecycle.

use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{Document, DocumentStatus};
use crate::storage::BlobStore;

pub async fn get_document(pool: &SqlitePool, document_id: &str) -> Result<Document> {
    let row = sqlx::query(
        "SELECT id, name, mime_type, size, channel_id, storage_id, uploaded_at, status, error FROM documents WHERE id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::not_found("document", document_id))?;

    row_to_document(&row)
}

pub async fn list_channel_documents(pool: &SqlitePool, channel_id: &str) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, name, mime_type, size, channel_id, storage_id, uploaded_at, status, error FROM documents WHERE channel_id = ? ORDER BY uploaded_at DESC",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_document).collect()
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status_str: String = row.get("status");
    let status = DocumentStatus::parse(&status_str).ok_or_else(|| {
        Error::Consistency(format!("document has unknown status '{}'", status_str))
    })?;

    Ok(Document {
        id: row.get("id"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        size: row.get("size"),
        channel_id: row.get("channel_id"),
        storage_id: row.get("storage_id"),
        uploaded_at: row.get("uploaded_at"),
        status,
        error: row.get("error"),
    })
}

/// Flip a document into a terminal or transitional status. `error` text is
/// recorded only for [`DocumentStatus::Error`], cleared otherwise.
pub async fn set_document_status(
    pool: &SqlitePool,
    document_id: &str,
    status: DocumentStatus,
    error: Option<&str>,
) -> Result<()> {
    let error = match status {
        DocumentStatus::Error => error,
        _ => None,
    };
    let updated = sqlx::query("UPDATE documents SET status = ?, error = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(document_id)
        .execute(pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::not_found("document", document_id));
    }
    Ok(())
}

/// Delete a document, its chunk embeddings, and its blob. Children go first:
/// a failure mid-way can leave the parent row behind, but never orphaned
/// chunks referencing a missing document.
pub async fn remove_document(
    pool: &SqlitePool,
    blobs: &BlobStore,
    document_id: &str,
) -> Result<()> {
    let doc = get_document(pool, document_id).await?;

    sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;

    blobs.delete(&doc.storage_id)?;

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;

    Ok(())
}
