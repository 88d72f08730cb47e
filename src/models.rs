//! Core data models for the chat and document pipeline.
//!
//! These types mirror the persisted tables one-to-one. Timestamps are unix
//! milliseconds. A [`Message`] with no `author_id` is assistant-authored by
//! convention and resolves to the author name `"AI"`.

use serde::Serialize;

/// Coarse collaboration scope. Threads and documents belong to a channel.
#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub last_active_at: Option<i64>,
}

/// A conversation within a channel. `updated_at` is bumped on every message
/// and never decreases.
#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Append-only chat message. Ordered within a thread by `created_at`, ties
/// broken by the store-assigned `seq`.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub thread_id: Option<String>,
    pub channel_id: String,
    pub author_id: Option<String>,
    pub content: String,
    pub created_at: i64,
}

/// A message joined with its resolved author name for display.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub thread_id: Option<String>,
    pub channel_id: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub content: String,
    pub created_at: i64,
}

/// Lifecycle of an uploaded document. `Processed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Processed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "processed" => Some(DocumentStatus::Processed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub channel_id: String,
    pub storage_id: String,
    pub uploaded_at: i64,
    pub status: DocumentStatus,
    pub error: Option<String>,
}

/// Typed chunk metadata with a bounded key set, serialized to JSON on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ChunkMetadata {
    pub chunk_index: i64,
    pub document_name: String,
    pub mime_type: String,
}

/// A chunk of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Role tag on a model-context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the role-tagged sequence sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A ranked chunk returned from semantic search.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub score: f64,
    pub content: String,
    /// Absent on rows written before metadata was recorded.
    pub metadata: Option<ChunkMetadata>,
}
