//! Conversation orchestrator: the send/respond loop.
//!
//! [`send_message`] persists a user turn and schedules response generation;
//! [`generate_response`] runs later on the task worker, retrieving document
//! context, calling the completion provider, and writing the assistant turn.
//! Retrieval is best-effort: if the embedder or search fails, the response
//! is generated from conversation history alone rather than failing the turn.

use sqlx::SqlitePool;

use crate::completion::Completer;
use crate::config::RetrievalConfig;
use crate::context;
use crate::embedding::{embed_query, Embedder};
use crate::error::{Error, Result};
use crate::messages;
use crate::models::{ChunkHit, Message};
use crate::search;
use crate::tasks::{Task, TaskQueue};
use crate::threads;
use crate::users;

/// Persist a user message and schedule an assistant response.
///
/// The first message of a thread also sets the thread title from its
/// content. Returns before any model call happens.
pub async fn send_message(
    pool: &SqlitePool,
    tasks: &TaskQueue,
    thread_id: &str,
    author_id: &str,
    content: &str,
) -> Result<Message> {
    if content.trim().is_empty() {
        return Err(Error::Validation("message content is empty".to_string()));
    }

    let thread = threads::get_thread(pool, thread_id).await?;
    users::get_user(pool, author_id).await?;

    let now = chrono::Utc::now().timestamp_millis();
    let message = messages::insert_message(
        pool,
        thread_id,
        &thread.channel_id,
        Some(author_id),
        content,
        now,
    )
    .await?;

    threads::touch_thread(pool, thread_id, now).await?;
    if let Err(e) = users::touch_last_active(pool, author_id).await {
        tracing::warn!(user_id = %author_id, error = %e, "last_active_at not updated");
    }

    if messages::count_thread_messages(pool, thread_id).await? == 1 {
        threads::set_title_from_content(pool, thread_id, content).await?;
    }

    tasks.enqueue(Task::GenerateResponse {
        thread_id: thread_id.to_string(),
    })?;

    Ok(message)
}

/// Generate and persist the assistant response for a thread. Runs on the
/// task worker.
pub async fn generate_response(
    pool: &SqlitePool,
    embedder: Option<&dyn Embedder>,
    completer: &dyn Completer,
    retrieval: &RetrievalConfig,
    thread_id: &str,
) -> Result<Message> {
    let thread = threads::get_thread(pool, thread_id).await?;

    let hits = match embedder {
        Some(embedder) if retrieval.augment => {
            retrieve_for_thread(pool, embedder, retrieval, thread_id).await
        }
        _ => Vec::new(),
    };

    let prompt = context::assemble_context(pool, thread_id, retrieval.history_window, &hits).await?;

    let completion = completer.complete(&prompt).await?;
    let content = completion.content.ok_or(Error::EmptyCompletion)?;
    tracing::info!(
        thread_id = %thread_id,
        model = completer.model_name(),
        prompt_tokens = completion.prompt_tokens,
        completion_tokens = completion.completion_tokens,
        "completion received"
    );

    write_agent_response(pool, thread_id, &thread.channel_id, &content).await
}

/// Persist an assistant turn. `author_id` stays NULL so readers resolve the
/// author name to the assistant.
pub async fn write_agent_response(
    pool: &SqlitePool,
    thread_id: &str,
    channel_id: &str,
    content: &str,
) -> Result<Message> {
    let now = chrono::Utc::now().timestamp_millis();
    let message = messages::insert_message(pool, thread_id, channel_id, None, content, now).await?;
    threads::touch_thread(pool, thread_id, now).await?;
    Ok(message)
}

/// Embed the latest user turn and search the chunk store. Any failure here
/// degrades to an empty hit list.
async fn retrieve_for_thread(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    thread_id: &str,
) -> Vec<ChunkHit> {
    let query = match latest_user_turn(pool, thread_id).await {
        Ok(Some(content)) => content,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(thread_id = %thread_id, error = %e, "retrieval skipped");
            return Vec::new();
        }
    };

    let result = async {
        let vector = embed_query(embedder, &query).await?;
        search::search(pool, &vector, None, retrieval.search_limit).await
    }
    .await;

    match result {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(thread_id = %thread_id, error = %e, "retrieval failed, responding without document context");
            Vec::new()
        }
    }
}

async fn latest_user_turn(pool: &SqlitePool, thread_id: &str) -> Result<Option<String>> {
    let recent = messages::recent_thread_messages(pool, thread_id, 10).await?;
    Ok(recent
        .into_iter()
        .find(|m| m.author_id.is_some())
        .map(|m| m.content))
}
