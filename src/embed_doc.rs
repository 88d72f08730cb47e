//! Chunk embedder: turns an uploaded document into stored chunk embeddings.
//!
//! `embed_document` is safe to re-run: the new chunk set atomically replaces
//! any previous one for the document, so a re-embed never duplicates chunks.
//! Any failure (blob read, text extraction, embedding call, chunk write)
//! flips the document to `status = error` with the failure message — a
//! document is only ever `processed` with its full chunk set in place.

use sqlx::SqlitePool;

use crate::chunk::chunk_text;
use crate::documents;
use crate::embedding::{vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{ChunkMetadata, Document, DocumentStatus};
use crate::storage::BlobStore;

/// Chunk, embed, and store a document's content. Returns the number of
/// chunks created. `batch_size` caps texts per embedding call.
pub async fn embed_document(
    pool: &SqlitePool,
    blobs: &BlobStore,
    embedder: &dyn Embedder,
    max_tokens: usize,
    batch_size: usize,
    document_id: &str,
) -> Result<u64> {
    let doc = documents::get_document(pool, document_id).await?;

    match embed_inner(pool, blobs, embedder, max_tokens, batch_size, &doc).await {
        Ok(count) => {
            documents::set_document_status(pool, document_id, DocumentStatus::Processed, None)
                .await?;
            tracing::info!(document_id = %document_id, chunks = count, "document embedded");
            Ok(count)
        }
        Err(e) => {
            // Record the failure on the document before propagating. The
            // previous chunk set (if any) stays intact.
            let msg = e.to_string();
            if let Err(status_err) =
                documents::set_document_status(pool, document_id, DocumentStatus::Error, Some(&msg))
                    .await
            {
                tracing::error!(document_id = %document_id, error = %status_err, "failed to record document error status");
            }
            Err(e)
        }
    }
}

async fn embed_inner(
    pool: &SqlitePool,
    blobs: &BlobStore,
    embedder: &dyn Embedder,
    max_tokens: usize,
    batch_size: usize,
    doc: &Document,
) -> Result<u64> {
    let bytes = blobs.get(&doc.storage_id)?;
    let text = extract::extract_text(&doc.mime_type, &bytes)?;
    let chunks = chunk_text(&doc.id, &text, max_tokens);

    // Embed everything before touching the table, so a partial embedding
    // failure never replaces a good chunk set with a truncated one.
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let batch_vectors = embedder.embed(batch).await?;
        if batch_vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} texts",
                batch_vectors.len(),
                batch.len()
            )));
        }
        vectors.extend(batch_vectors);
    }

    let now = chrono::Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;

    // Replace, never append: re-embedding must leave exactly one chunk set.
    sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        let metadata = ChunkMetadata {
            chunk_index: chunk.chunk_index,
            document_name: doc.name.clone(),
            mime_type: doc.mime_type.clone(),
        };
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| Error::Storage(format!("serialize chunk metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO document_chunks (id, document_id, chunk_index, content, content_hash, metadata_json, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(&metadata_json)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(chunks.len() as u64)
}
