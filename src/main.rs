//! # Curie CLI (`curie`)
//!
//! Administrative entry point for the Curie chat backend: schema setup,
//! document ingestion, retrieval questions and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! curie --config ./config/curie.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curie init` | Create the SQLite database and schema |
//! | `curie serve` | Start the HTTP server |
//! | `curie ingest <file> --uploader <id>` | Ingest one file into the document corpus |
//! | `curie documents list` | List ingested documents |
//! | `curie documents delete <id>` | Delete a document and its chunks |
//! | `curie ask "<question>"` | Answer a question from the ingested documents |
//! | `curie accounts set-role <id> <role>` | Set an account's role |
//!
//! ## Examples
//!
//! ```bash
//! curie init --config ./config/curie.toml
//! curie accounts set-role alice admin
//! curie ingest ./handbook.pdf --uploader alice
//! curie ask "When is payday?" --limit 3
//! curie serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use curie::context::ServiceContext;
use curie::{accounts, config, ingest, migrate, rag, server};

/// Curie: a chat backend that answers from your documents and runs
/// resume-matching and template-filling widgets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/curie.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "curie", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/curie.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a file into the document corpus.
    ///
    /// Runs extraction, duplicate checks, chunking and embedding. Exact or
    /// near-duplicate content is rejected.
    Ingest {
        /// Path to the file.
        file: PathBuf,

        /// Account recorded as the uploader.
        #[arg(long)]
        uploader: String,

        /// Declared content type. Guessed from the extension when omitted.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Inspect or remove ingested documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Answer a question from the ingested documents.
    Ask {
        question: String,

        /// Number of chunks to retrieve. Defaults to `retrieval.top_k`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage account roles.
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List documents, newest first.
    List,
    /// Delete a document and its chunks.
    Delete { id: String },
}

#[derive(Subcommand)]
enum AccountsAction {
    /// Set the role (`user`, `admin`, `super_admin`) of an account.
    SetRole { id: String, role: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("curie={level},curie_core={level},tower_http={level}")));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Ingest {
            file,
            uploader,
            content_type,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&filename).to_string());

            let ctx = ServiceContext::from_config(cfg).await?;
            let doc = ingest::ingest(&ctx, &uploader, &filename, &content_type, &bytes).await?;
            let chunks = ctx.documents.document_chunks(&doc.id).await?;
            println!("ingest {}", filename);
            println!("  document: {}", doc.id);
            println!("  content type: {}", doc.content_type);
            println!("  size: {} bytes", doc.size);
            println!("  chunks: {}", chunks.len());
            println!("  embedded: {}", doc.doc_embedding.is_some());
            println!("  stored at: {}", doc.storage_path);
            println!("ok");
        }
        Commands::Documents { action } => {
            let ctx = ServiceContext::from_config(cfg).await?;
            match action {
                DocumentsAction::List => {
                    let docs = ingest::list_documents(&ctx).await?;
                    println!("documents");
                    if docs.is_empty() {
                        println!("  none");
                    }
                    for doc in docs {
                        println!(
                            "  {}  {}  {} bytes  uploaded by {}",
                            doc.id, doc.filename, doc.size, doc.uploader_id
                        );
                    }
                }
                DocumentsAction::Delete { id } => {
                    ingest::delete_document(&ctx, &id).await?;
                    println!("documents delete");
                    println!("  deleted: {}", id);
                    println!("ok");
                }
            }
        }
        Commands::Ask { question, limit } => {
            let limit = limit.unwrap_or(cfg.retrieval.top_k).max(1);
            let ctx = ServiceContext::from_config(cfg).await?;
            let answer = rag::answer_query(&ctx, &question, limit).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, source) in answer.sources.iter().enumerate() {
                    let preview: String = source.snippet.chars().take(120).collect();
                    println!(
                        "{}. doc {} chunk {}\n   {}",
                        i + 1,
                        source.document_id,
                        source.chunk_id,
                        preview.replace('\n', " ")
                    );
                }
            }
        }
        Commands::Accounts { action } => match action {
            AccountsAction::SetRole { id, role } => {
                let ctx = ServiceContext::from_config(cfg).await?;
                accounts::set_role(&ctx, &id, &role).await?;
                println!("accounts set-role");
                println!("  account: {}", id);
                println!("  role: {}", role);
                println!("ok");
            }
        },
    }

    Ok(())
}

fn guess_content_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    match lower.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}
