//! Paragraph-boundary text chunker.
//!
//! Splits document text into [`Chunk`]s bounded by a `max_tokens` budget,
//! breaking on paragraph boundaries (`\n\n`) so each chunk stays coherent.
//! Chunking is fully deterministic for a given input: chunk ids are UUIDv5
//! values derived from the document id and chunk index, and each chunk
//! carries a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Namespace for deterministic chunk ids.
const CHUNK_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0; always at least one.
pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buf = String::new();

    let mut flush = |buf: &mut String, chunks: &mut Vec<Chunk>| {
        if !buf.is_empty() {
            let index = chunks.len() as i64;
            chunks.push(make_chunk(document_id, index, buf));
            buf.clear();
        }
    };

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let joined_len = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };
        if joined_len > max_chars {
            flush(&mut buf, &mut chunks);
        }

        if trimmed.len() > max_chars {
            // A single oversized paragraph gets hard-split, preferring
            // newline or space boundaries.
            let mut rest = trimmed;
            while !rest.is_empty() {
                let mut limit = rest.len().min(max_chars);
                // The byte budget may land inside a multibyte character;
                // walk back to the nearest char boundary before slicing.
                while limit < rest.len() && !rest.is_char_boundary(limit) {
                    limit -= 1;
                }
                let cut = if limit < rest.len() {
                    rest[..limit]
                        .rfind('\n')
                        .or_else(|| rest[..limit].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(limit)
                } else {
                    limit
                };
                let index = chunks.len() as i64;
                chunks.push(make_chunk(document_id, index, rest[..cut].trim()));
                rest = &rest[cut..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    flush(&mut buf, &mut chunks);

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id_seed = format!("{}:{}", document_id, index);
    Chunk {
        id: Uuid::new_v5(&CHUNK_NAMESPACE, id_seed.as_bytes()).to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_yields_one_chunk() {
        let chunks = chunk_text("doc1", "", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_two_paragraphs_over_limit_yield_two_chunks() {
        // max_tokens=6 => max_chars=24; each paragraph fits alone, not together
        let text = "This is paragraph one.\n\nThis is paragraph two.";
        let chunks = chunk_text("doc1", text, 6);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "This is paragraph one.");
        assert_eq!(chunks[1].text, "This is paragraph two.");
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic_ids_and_hashes() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 5);
        let c2 = chunk_text("doc1", text, 5);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
        // Ids differ across documents
        let c3 = chunk_text("doc2", text, 5);
        assert_ne!(c1[0].id, c3[0].id);
    }

    #[test]
    fn test_multibyte_oversized_paragraph_cuts_on_char_boundaries() {
        // 600 bytes of 3-byte chars with no spaces forces hard splits whose
        // byte budget (64) is not a multiple of the char width.
        let text = "你".repeat(200);
        let chunks = chunk_text("doc1", &text, 16);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 64);
            assert!(c.text.chars().all(|ch| ch == '你'));
        }
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("doc1", &text, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20);
        }
    }
}
