//! # Parley
//!
//! A chat backend with retrieval-augmented responses over uploaded documents.
//!
//! Parley stores channels, threads, and messages in SQLite, ingests uploaded
//! documents into chunk embeddings, and generates assistant responses whose
//! context is augmented with semantically relevant document excerpts. All
//! model and embedding calls run on a background task worker so the HTTP API
//! stays responsive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Chunk+Embed │──▶│    SQLite     │
//! │  (HTTP)  │   │  (worker)   │   │ chunks + vecs │
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │
//! ┌──────────┐   ┌─────────────┐   ┌──────▼───────┐
//! │   Send   │──▶│  Retrieve + │──▶│  Assistant    │
//! │ message  │   │  Complete   │   │   message     │
//! └──────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! parley init                    # create database
//! parley serve                   # start HTTP server + task worker
//! parley backfill                # one-time legacy row rewrite
//! parley embed <document-id>     # re-embed a document by hand
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ingest`] | Document upload and registration |
//! | [`extract`] | Mime-type validation and text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embed_doc`] | Document chunk embedding |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`completion`] | Completion provider abstraction |
//! | [`search`] | Semantic search over chunks |
//! | [`context`] | Model-context assembly |
//! | [`convo`] | Conversation orchestration |
//! | [`tasks`] | Deferred-task queue and worker |
//! | [`server`] | HTTP API server |
//! | [`auth`] | Caller resolution |
//! | [`storage`] | Blob store for uploaded files |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and backfill |

pub mod auth;
pub mod channels;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod context;
pub mod convo;
pub mod db;
pub mod documents;
pub mod embed_doc;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod messages;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod threads;
pub mod users;
