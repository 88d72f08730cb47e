//! Context assembler: builds the model prompt for a thread.
//!
//! The prompt is one system message (base instructions, plus retrieved
//! document excerpts when there are any) followed by the recent thread
//! history in chronological order. Consecutive turns by the same role are
//! coalesced into one message, since chat completion APIs expect strictly
//! alternating turns after the system message.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::messages;
use crate::models::{ChatMessage, ChatRole, ChunkHit};
use crate::threads;

const SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant in a team chat. \
Answer concisely. When document excerpts are provided, ground your answer in \
them and say so when they do not cover the question.";

/// Assemble the chat-completion message list for a thread.
///
/// Takes the newest `history_window` messages (oldest first in the output).
/// `hits` are retrieved chunks to ground the response; an empty slice yields
/// the bare system instructions.
pub async fn assemble_context(
    pool: &SqlitePool,
    thread_id: &str,
    history_window: i64,
    hits: &[ChunkHit],
) -> Result<Vec<ChatMessage>> {
    threads::get_thread(pool, thread_id).await?;

    let mut recent = messages::recent_thread_messages(pool, thread_id, history_window).await?;
    recent.reverse(); // newest-first from the store, chronological for the model

    let mut out = Vec::with_capacity(recent.len() + 1);
    out.push(ChatMessage::new(ChatRole::System, system_prompt(hits)));

    for message in &recent {
        let role = match message.author_id {
            Some(_) => ChatRole::User,
            None => ChatRole::Assistant,
        };
        match out.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => out.push(ChatMessage::new(role, message.content.clone())),
        }
    }

    Ok(out)
}

fn system_prompt(hits: &[ChunkHit]) -> String {
    if hits.is_empty() {
        return SYSTEM_INSTRUCTIONS.to_string();
    }

    let mut prompt = String::from(SYSTEM_INSTRUCTIONS);
    prompt.push_str("\n\nRelevant document excerpts:\n");
    for hit in hits {
        match &hit.metadata {
            Some(meta) => {
                prompt.push_str(&format!(
                    "\n[{} #{}]\n{}\n",
                    meta.document_name, meta.chunk_index, hit.content
                ));
            }
            None => {
                prompt.push_str(&format!("\n{}\n", hit.content));
            }
        }
    }
    prompt
}
