//! HTTP API server.
//!
//! Exposes the chat and document pipeline as a JSON HTTP API. Handlers are
//! thin: they resolve the caller, parse the request, and delegate to the
//! domain modules; scheduling semantics live in [`crate::tasks`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/channels/ensure-default` | Get-or-create the default channel |
//! | `GET`  | `/channels/{id}/messages` | List channel messages |
//! | `GET`  | `/channels/{id}/threads` | List channel threads, recent first |
//! | `GET`  | `/channels/{id}/documents` | List channel documents |
//! | `POST` | `/threads` | Create a thread |
//! | `GET`  | `/threads/{id}` | Get a thread |
//! | `DELETE` | `/threads/{id}` | Delete a thread and its messages |
//! | `GET`  | `/threads/{id}/messages` | List thread messages |
//! | `POST` | `/threads/{id}/messages` | Send a message (schedules a response) |
//! | `POST` | `/documents/upload-url` | Reserve a two-phase upload |
//! | `PUT`  | `/documents/blob/{storage_id}` | Store uploaded bytes |
//! | `POST` | `/documents/register` | Register an upload (schedules embedding) |
//! | `DELETE` | `/documents/{id}` | Delete a document, chunks, and blob |
//! | `POST` | `/search` | Semantic search over document chunks |
//!
//! # Error Contract
//!
//! All error responses share one envelope:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "thread not found: t-123" } }
//! ```
//!
//! Status mapping: `bad_request` (400), `unauthorized` (401), `not_found`
//! (404); everything else is 500 with the error's own code.
//!
//! # Authentication
//!
//! Mutating endpoints (thread create/delete, message send, document
//! upload/register/delete) require the `x-authenticated-user` header, set
//! by the upstream gateway after credential verification. A missing or
//! blank header yields 401 before any pipeline logic runs.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{self, IDENTITY_HEADER};
use crate::channels;
use crate::completion::create_completer;
use crate::config::Config;
use crate::convo;
use crate::db;
use crate::documents;
use crate::embedding::{create_embedder, embed_query};
use crate::error::Error;
use crate::ingest::{self, UploadRequest};
use crate::messages;
use crate::models::{ChunkHit, Document, Message, MessageView, Thread};
use crate::search;
use crate::storage::BlobStore;
use crate::tasks::{spawn_worker, App, TaskQueue};
use crate::threads;

/// Starts the HTTP server and the background task worker.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = build_app(config).await?;

    let router = build_router(app);

    tracing::info!(addr = %bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Build the shared [`App`] state and spawn the task worker.
pub async fn build_app(config: &Config) -> anyhow::Result<App> {
    let pool = db::connect(config).await?;
    let blobs = BlobStore::new(&config.storage.root)?;

    let embedder = if config.embedding.is_enabled() {
        Some(create_embedder(&config.embedding)?)
    } else {
        tracing::warn!("embedding provider disabled, responses will not use document context");
        None
    };
    let completer = if config.completion.is_enabled() {
        Some(create_completer(&config.completion)?)
    } else {
        tracing::warn!("completion provider disabled, messages will get no responses");
        None
    };

    let (tasks, rx) = TaskQueue::new();
    let app = App {
        pool,
        blobs,
        embedder,
        completer,
        config: Arc::new(config.clone()),
        tasks,
    };
    spawn_worker(app.clone(), rx);

    Ok(app)
}

/// Assemble the router. Split from [`run_server`] so tests can drive the
/// API without binding a socket.
pub fn build_router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/channels/ensure-default", post(handle_ensure_default))
        .route("/channels/{id}/messages", get(handle_channel_messages))
        .route("/channels/{id}/threads", get(handle_channel_threads))
        .route("/channels/{id}/documents", get(handle_channel_documents))
        .route("/threads", post(handle_create_thread))
        .route(
            "/threads/{id}",
            get(handle_get_thread).delete(handle_delete_thread),
        )
        .route(
            "/threads/{id}/messages",
            get(handle_thread_messages).post(handle_send_message),
        )
        .route("/documents/upload-url", post(handle_upload_url))
        .route("/documents/blob/{storage_id}", put(handle_put_blob))
        .route("/documents/register", post(handle_register))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

/// JSON error envelope.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Wrapper turning a domain [`Error`] into an HTTP response.
pub struct AppError(Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn caller_identity(headers: &HeaderMap) -> Option<&str> {
    headers.get(IDENTITY_HEADER).and_then(|v| v.to_str().ok())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Channels ============

#[derive(Serialize)]
struct EnsureDefaultResponse {
    channel_id: String,
}

async fn handle_ensure_default(
    State(app): State<App>,
) -> Result<Json<EnsureDefaultResponse>, AppError> {
    let channel_id = channels::ensure_default_channel(&app.pool).await?;
    Ok(Json(EnsureDefaultResponse { channel_id }))
}

async fn handle_channel_messages(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    channels::get_channel(&app.pool, &id).await?;
    Ok(Json(messages::list_channel_messages(&app.pool, &id).await?))
}

async fn handle_channel_threads(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Thread>>, AppError> {
    channels::get_channel(&app.pool, &id).await?;
    Ok(Json(threads::list_threads(&app.pool, &id).await?))
}

async fn handle_channel_documents(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Document>>, AppError> {
    channels::get_channel(&app.pool, &id).await?;
    Ok(Json(documents::list_channel_documents(&app.pool, &id).await?))
}

// ============ Threads ============

#[derive(Deserialize)]
struct CreateThreadRequest {
    channel_id: String,
    #[serde(default)]
    title: Option<String>,
}

async fn handle_create_thread(
    State(app): State<App>,
    headers: HeaderMap,
    Json(req): Json<CreateThreadRequest>,
) -> Result<Json<Thread>, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    let title = req.title.as_deref().unwrap_or("New chat");
    let id = threads::create_thread(&app.pool, &req.channel_id, title).await?;
    Ok(Json(threads::get_thread(&app.pool, &id).await?))
}

async fn handle_get_thread(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<Thread>, AppError> {
    Ok(Json(threads::get_thread(&app.pool, &id).await?))
}

async fn handle_delete_thread(
    State(app): State<App>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    threads::delete_thread(&app.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_thread_messages(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    threads::get_thread(&app.pool, &id).await?;
    Ok(Json(messages::list_thread_messages(&app.pool, &id).await?))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

async fn handle_send_message(
    State(app): State<App>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let caller = auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    let message =
        convo::send_message(&app.pool, &app.tasks, &id, &caller.user.id, &req.content).await?;
    Ok(Json(message))
}

// ============ Documents ============

#[derive(Serialize)]
struct UploadUrlResponse {
    storage_id: String,
    /// Where to PUT the bytes before registering.
    upload_path: String,
}

async fn handle_upload_url(
    State(app): State<App>,
    headers: HeaderMap,
) -> Result<Json<UploadUrlResponse>, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    let storage_id = ingest::reserve_upload(&app.blobs);
    let upload_path = format!("/documents/blob/{}", storage_id);
    Ok(Json(UploadUrlResponse {
        storage_id,
        upload_path,
    }))
}

#[derive(Serialize)]
struct PutBlobResponse {
    storage_id: String,
    size: usize,
}

async fn handle_put_blob(
    State(app): State<App>,
    Path(storage_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PutBlobResponse>, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    app.blobs.put(&storage_id, &body)?;
    Ok(Json(PutBlobResponse {
        storage_id,
        size: body.len(),
    }))
}

#[derive(Deserialize)]
struct RegisterRequest {
    storage_id: String,
    name: String,
    mime_type: String,
    size: i64,
    channel_id: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    document_id: String,
}

async fn handle_register(
    State(app): State<App>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    let upload = UploadRequest {
        name: req.name,
        mime_type: req.mime_type,
        size: req.size,
        channel_id: req.channel_id,
    };
    let document_id =
        ingest::register_upload(&app.pool, &app.blobs, &app.tasks, &req.storage_id, &upload)
            .await?;
    Ok(Json(RegisterResponse { document_id }))
}

async fn handle_delete_document(
    State(app): State<App>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth::resolve_caller(&app.pool, caller_identity(&headers)).await?;
    documents::remove_document(&app.pool, &app.blobs, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    hits: Vec<ChunkHit>,
}

async fn handle_search(
    State(app): State<App>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(Error::Validation("query must not be empty".to_string()).into());
    }
    let embedder = app.embedder.as_deref().ok_or_else(|| {
        Error::Validation("embedding provider is disabled".to_string())
    })?;

    let vector = embed_query(embedder, &req.query).await?;
    let limit = req.limit.unwrap_or(app.config.retrieval.search_limit);
    let hits = search::search(&app.pool, &vector, req.document_id.as_deref(), limit).await?;
    Ok(Json(SearchResponse { hits }))
}
