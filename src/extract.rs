//! Text extraction from stored document bytes.
//!
//! Dispatches on the registered mime type: text-like types decode as UTF-8
//! (lossy, so a stray byte never fails a whole document), PDFs go through
//! `pdf-extract`. The allowed set here is the single source of truth for
//! upload validation in [`crate::ingest`].

use crate::error::{Error, Result};

/// Mime types accepted at upload time.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/json",
    "application/pdf",
];

pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Turn stored bytes into chunkable text.
pub fn extract_text(mime_type: &str, bytes: &[u8]) -> Result<String> {
    match mime_type {
        "text/plain" | "text/markdown" | "text/csv" | "application/json" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        "application/pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| Error::Validation(format!("failed to extract PDF text: {}", e))),
        other => Err(Error::Validation(format!(
            "unsupported file type: {}. Allowed types: {}",
            other,
            ALLOWED_MIME_TYPES.join(", ")
        ))),
    }
}
