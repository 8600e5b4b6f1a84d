//! # Legally CLI (`legally`)
//!
//! Command-line interface to the legal document corpus: database setup,
//! document submission, retrieval, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! legally --config ./config/legally.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `legally init` | Create the SQLite database and run schema migrations |
//! | `legally submit <file>` | Extract a file and store it as a pending document |
//! | `legally reprocess <id>` | Reset a document to pending and process it again |
//! | `legally search "<query>"` | Rank documents against a query |
//! | `legally list` | List documents, newest first |
//! | `legally get <id>` | Print a document with its chunks |
//! | `legally delete <id>` | Delete a document and its chunks |
//! | `legally stats` | Counts by status and category |
//! | `legally categories` | Print the legal category taxonomy |
//! | `legally serve` | Start the HTTP server and the worker pool |
//!
//! ## Examples
//!
//! ```bash
//! legally init
//! legally submit ./rulings/lease.pdf --title "Lease Ruling" --category "Civil Law" --wait
//! legally search "tenant eviction" --category "Civil Law" --limit 5
//! legally serve
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use legally::config;
use legally::get;
use legally::migrate;
use legally::models::Category;
use legally::pipeline::Outcome;
use legally::search;
use legally::server;
use legally::service::{Service, SubmitRequest};
use legally::stats;

/// Legally: ingestion and retrieval for a corpus of legal documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/legally.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "legally",
    about = "Legally: ingestion and retrieval for a corpus of legal documents",
    version,
    long_about = "Legally converts uploaded PDF, DOCX, and text documents into normalized text, \
    stores them in SQLite, embeds and chunks them in the background, and ranks them against \
    free-text queries via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/legally.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Submit a document file.
    ///
    /// The file is extracted synchronously and stored as `pending`.
    /// With `--wait` it is processed before the command returns;
    /// otherwise the next `legally serve` picks it up.
    Submit {
        /// Path to the document (PDF, DOCX, or plain text).
        file: PathBuf,

        /// Document title.
        #[arg(long)]
        title: String,

        /// Legal category, e.g. "Civil Law". See `legally categories`.
        #[arg(long)]
        category: String,

        /// Free-form provenance note.
        #[arg(long, default_value = "")]
        source: String,

        /// Owner identifier.
        #[arg(long, default_value = "")]
        owner: String,

        /// Declared format (MIME type or extension). Defaults to the file extension.
        #[arg(long)]
        format: Option<String>,

        /// Process the document before returning.
        #[arg(long)]
        wait: bool,
    },

    /// Reset a document to pending and process it again.
    Reprocess {
        /// Document id.
        id: String,

        /// Process the document before returning.
        #[arg(long)]
        wait: bool,
    },

    /// Rank documents against a query.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,

        /// Restrict results to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// List documents, newest first.
    List {
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Print a document with its chunks.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete a document and its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Show corpus statistics.
    Stats,

    /// Print the legal category taxonomy.
    Categories,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`, starts the worker pool, requeues pending
    /// documents, and runs the staleness sweeper.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Categories => {
            for category in Category::ALL {
                println!("{}", category.label());
            }
        }
        Commands::Submit {
            file,
            title,
            category,
            source,
            owner,
            format,
            wait,
        } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read document: {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let service = Service::open(&cfg).await?;
            let summary = service
                .submit(SubmitRequest {
                    content,
                    format,
                    title,
                    category,
                    source,
                    filename,
                    owner_id: owner,
                })
                .await?;
            println!("Submitted {} ({})", summary.id, summary.status);

            if wait {
                let outcome = service.process_now(&summary.id).await?;
                print_outcome(&summary.id, &outcome);
            }
        }
        Commands::Reprocess { id, wait } => {
            let service = Service::open(&cfg).await?;
            service.reprocess(&id).await?;
            println!("Reset {} to pending", id);

            if wait {
                let outcome = service.process_now(&id).await?;
                print_outcome(&id, &outcome);
            }
        }
        Commands::Search {
            query,
            limit,
            category,
        } => {
            let service = Service::open(&cfg).await?;
            let results = service.search(&query, limit, category.as_deref()).await?;
            search::print_results(&results);
        }
        Commands::List {
            limit,
            offset,
            category,
        } => {
            let service = Service::open(&cfg).await?;
            let docs = service.list(limit, offset, category.as_deref()).await?;
            get::print_list(&docs);
        }
        Commands::Get { id } => {
            let service = Service::open(&cfg).await?;
            let doc = service.get(&id).await?;
            get::print_document(&doc);
        }
        Commands::Delete { id } => {
            let service = Service::open(&cfg).await?;
            service.delete(&id).await?;
            println!("Deleted {}", id);
        }
        Commands::Stats => {
            let service = Service::open(&cfg).await?;
            stats::run_stats(&cfg, &service).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn print_outcome(id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Processed {
            chunks,
            chunk_failures,
        } => {
            if *chunk_failures > 0 {
                println!(
                    "Processed {}: {} chunks ({} without embedding)",
                    id, chunks, chunk_failures
                );
            } else {
                println!("Processed {}: {} chunks", id, chunks);
            }
        }
        Outcome::Failed(reason) => println!("Processing failed for {}: {}", id, reason),
        Outcome::Missing => println!("Document {} no longer exists", id),
    }
}
