//! Error taxonomy for the chat and retrieval pipeline.
//!
//! Validation and not-found errors surface synchronously to the caller of a
//! mutating entry point. Embedding and completion errors raised inside the
//! asynchronous generation task are recorded (document status, task log) and
//! terminate the task without retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input, e.g. an unsupported file type.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced thread, document, user, or channel does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Missing or invalid caller identity.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Blob or record write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The embedding service call failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The completion service call failed (including timeouts).
    #[error("completion error: {0}")]
    Completion(String),

    /// The completion service returned no content.
    #[error("completion returned no content")]
    EmptyCompletion,

    /// A cascading delete left orphaned children. Should not occur.
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Machine-readable code used in HTTP error envelopes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::Authentication(_) => "unauthorized",
            Error::Storage(_) => "storage_error",
            Error::Embedding(_) => "embedding_error",
            Error::Completion(_) => "completion_error",
            Error::EmptyCompletion => "empty_completion",
            Error::Consistency(_) => "consistency_error",
            Error::Db(_) => "internal",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
