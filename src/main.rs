//! # Parley CLI (`parley`)
//!
//! The `parley` binary runs the chat backend and its maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! parley --config ./config/parley.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parley init` | Create the SQLite database and run schema migrations |
//! | `parley serve` | Start the HTTP server and background task worker |
//! | `parley backfill` | Rewrite legacy message rows to the canonical schema |
//! | `parley embed <document-id>` | Re-run chunking and embedding for one document |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parley::{config, db, embed_doc, embedding, migrate, server, storage};

/// Parley — a chat backend with retrieval-augmented responses over uploaded
/// documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/parley.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — a chat backend with retrieval-augmented responses",
    version,
    long_about = "Parley stores channels, threads, and messages in SQLite, ingests uploaded \
    documents into chunk embeddings, and generates assistant responses augmented with \
    semantically relevant document excerpts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/parley.toml`. Database, storage, embedding,
    /// completion, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/parley.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (channels,
    /// users, threads, messages, documents, document_chunks). This command
    /// is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP server and the background task worker.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat, document, and search endpoints. Message responses and document
    /// embedding run on the in-process task worker.
    Serve,

    /// Rewrite legacy message rows to the canonical schema.
    ///
    /// Fills missing `created_at` timestamps from insertion order and
    /// attaches thread-less messages to a per-channel backfill thread.
    /// Run once after upgrading from a pre-canonical database.
    Backfill,

    /// Re-run chunking and embedding for a single document.
    ///
    /// Replaces the document's stored chunk set. Useful after switching
    /// embedding models or recovering a document stuck in `error`.
    Embed {
        /// Document UUID.
        document_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Backfill => {
            let report = migrate::run_backfill(&cfg).await?;
            println!(
                "Backfill complete: {} timestamps filled, {} messages attached to threads.",
                report.timestamps_filled, report.messages_rethreaded
            );
        }
        Commands::Embed { document_id } => {
            let pool = db::connect(&cfg).await?;
            let blobs = storage::BlobStore::new(&cfg.storage.root)?;
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let count = embed_doc::embed_document(
                &pool,
                &blobs,
                embedder.as_ref(),
                cfg.chunking.max_tokens,
                cfg.embedding.batch_size,
                &document_id,
            )
            .await?;
            println!("Embedded {} chunks for document {}.", count, document_id);
        }
    }

    Ok(())
}
