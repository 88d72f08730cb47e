//! Explicit deferred-task queue.
//!
//! Mutating entry points enqueue work here instead of running it inline:
//! sending a message schedules response generation, registering an upload
//! schedules chunk embedding. The queue is an in-process
//! `tokio::sync::mpsc` channel drained by a single worker loop, so the
//! caller's transaction returns immediately and the model/network calls run
//! out-of-band.
//!
//! Delivery is at-most-once and in-memory: tasks do not survive a process
//! restart, and a failed task is logged and dropped, not retried. There is
//! no per-thread mutual exclusion — two quick sends to one thread can both
//! schedule generation, and their responses land in completion order.

use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::completion::Completer;
use crate::config::Config;
use crate::convo;
use crate::embed_doc;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Generate and persist an assistant response for a thread.
    GenerateResponse { thread_id: String },
    /// Chunk and embed an uploaded document.
    EmbedDocument { document_id: String },
}

impl Task {
    fn describe(&self) -> String {
        match self {
            Task::GenerateResponse { thread_id } => format!("generate_response({})", thread_id),
            Task::EmbedDocument { document_id } => format!("embed_document({})", document_id),
        }
    }
}

/// Sending half of the queue, cloned into every mutating entry point.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Schedule a task with zero delay. Fails only if the worker is gone.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| Error::Storage("task queue is closed".to_string()))
    }
}

/// Everything the worker (and the HTTP handlers) need to run the pipeline.
#[derive(Clone)]
pub struct App {
    pub pool: SqlitePool,
    pub blobs: BlobStore,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub completer: Option<Arc<dyn Completer>>,
    pub config: Arc<Config>,
    pub tasks: TaskQueue,
}

/// Spawn the worker loop draining the queue. Runs until every [`TaskQueue`]
/// clone is dropped.
///
/// Each task runs in its own spawn: a panicking task is logged like a
/// failed one, and the drain loop keeps going.
pub fn spawn_worker(app: App, mut rx: mpsc::UnboundedReceiver<Task>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            let label = task.describe();
            let task_app = app.clone();
            let outcome = tokio::spawn(async move { run_task(&task_app, task).await }).await;
            match outcome {
                Ok(Ok(())) => tracing::info!(task = %label, "task completed"),
                // Task failures terminate the task, they are not retried here.
                Ok(Err(e)) => {
                    tracing::error!(task = %label, code = e.code(), error = %e, "task failed")
                }
                Err(e) => tracing::error!(task = %label, error = %e, "task panicked"),
            }
        }
    })
}

async fn run_task(app: &App, task: Task) -> Result<()> {
    match task {
        Task::GenerateResponse { thread_id } => {
            let completer = app.completer.as_deref().ok_or_else(|| {
                Error::Completion("no completion provider configured".to_string())
            })?;
            convo::generate_response(
                &app.pool,
                app.embedder.as_deref(),
                completer,
                &app.config.retrieval,
                &thread_id,
            )
            .await?;
            Ok(())
        }
        Task::EmbedDocument { document_id } => {
            let embedder = app
                .embedder
                .as_deref()
                .ok_or_else(|| Error::Embedding("no embedding provider configured".to_string()))?;
            embed_doc::embed_document(
                &app.pool,
                &app.blobs,
                embedder,
                app.config.chunking.max_tokens,
                app.config.embedding.batch_size,
                &document_id,
            )
            .await?;
            Ok(())
        }
    }
}
