//! Semantic retrieval over stored chunk embeddings.
//!
//! Exhaustive scan: every candidate chunk's vector is scored with cosine
//! similarity against the query vector. At the corpus sizes this serves,
//! a linear pass beats maintaining an index. The scan is a pure read and
//! never mutates chunk rows.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::error::Result;
use crate::models::{ChunkHit, ChunkMetadata};

/// Score chunks against a query embedding and return the top `limit` hits,
/// best first. `document_id` narrows the scan to one document's chunks.
///
/// Ties are broken by chunk id so identical scores order deterministically.
pub async fn search(
    pool: &SqlitePool,
    query_embedding: &[f32],
    document_id: Option<&str>,
    limit: i64,
) -> Result<Vec<ChunkHit>> {
    let rows = match document_id {
        Some(doc_id) => {
            sqlx::query(
                "SELECT id, content, metadata_json, embedding FROM document_chunks WHERE document_id = ?",
            )
            .bind(doc_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT id, content, metadata_json, embedding FROM document_chunks")
                .fetch_all(pool)
                .await?
        }
    };

    let mut hits: Vec<ChunkHit> = Vec::with_capacity(rows.len());
    for row in &rows {
        let blob: Vec<u8> = row.get("embedding");
        let vector = blob_to_vec(&blob);
        let score = cosine_similarity(query_embedding, &vector) as f64;

        let metadata_json: Option<String> = row.get("metadata_json");
        let metadata = metadata_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<ChunkMetadata>(s).ok());

        hits.push(ChunkHit {
            chunk_id: row.get("id"),
            score,
            content: row.get("content"),
            metadata,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(limit.max(0) as usize);

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vec_to_blob;
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

    async fn seed(pool: &SqlitePool) {
        sqlx::query("INSERT INTO channels (id, name) VALUES ('ch', 'general')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO documents (id, name, mime_type, size, channel_id, storage_id, uploaded_at, status) VALUES ('d1', 'a.txt', 'text/plain', 1, 'ch', 's1', 1, 'processed'), ('d2', 'b.txt', 'text/plain', 1, 'ch', 's2', 1, 'processed')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_chunk(pool: &SqlitePool, id: &str, doc: &str, content: &str, v: &[f32]) {
        sqlx::query(
            "INSERT INTO document_chunks (id, document_id, chunk_index, content, embedding, created_at) VALUES (?, ?, (SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM document_chunks WHERE document_id = ?), ?, ?, 1)",
        )
        .bind(id)
        .bind(doc)
        .bind(doc)
        .bind(content)
        .bind(vec_to_blob(v))
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_exact_match_scores_one_and_ranks_first() {
        let pool = memory_pool().await;
        seed(&pool).await;
        insert_chunk(&pool, "c1", "d1", "aligned", &[1.0, 0.0]).await;
        insert_chunk(&pool, "c2", "d1", "orthogonal", &[0.0, 1.0]).await;

        let hits = search(&pool, &[1.0, 0.0], None, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "aligned");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_document_filter_narrows_scan() {
        let pool = memory_pool().await;
        seed(&pool).await;
        insert_chunk(&pool, "c1", "d1", "in d1", &[1.0, 0.0]).await;
        insert_chunk(&pool, "c2", "d2", "in d2", &[1.0, 0.0]).await;

        let hits = search(&pool, &[1.0, 0.0], Some("d2"), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "in d2");
    }

    #[tokio::test]
    async fn test_limit_and_tie_break_by_chunk_id() {
        let pool = memory_pool().await;
        seed(&pool).await;
        // Three chunks with identical vectors, so identical scores.
        insert_chunk(&pool, "c3", "d1", "third", &[1.0, 0.0]).await;
        insert_chunk(&pool, "c1", "d1", "first", &[1.0, 0.0]).await;
        insert_chunk(&pool, "c2", "d1", "second", &[1.0, 0.0]).await;

        let hits = search(&pool, &[1.0, 0.0], None, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert_eq!(hits[1].chunk_id, "c2");
    }

    #[tokio::test]
    async fn test_zero_query_vector_scores_zero() {
        let pool = memory_pool().await;
        seed(&pool).await;
        insert_chunk(&pool, "c1", "d1", "anything", &[0.3, 0.7]).await;

        let hits = search(&pool, &[0.0, 0.0], None, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }
}
