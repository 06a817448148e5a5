//! Retrace CLI for inspecting and maintaining the session catalog.
//!
//! Usage:
//!   retrace list                 List stored sessions
//!   retrace info <ID>            Show one session in detail
//!   retrace search [FILTERS]     Search the catalog
//!   retrace delete <ID>          Delete a session and its index entry
//!   retrace rebuild-index        Rebuild the search index from the store
//!   retrace check                Report disk space for the storage root
//!
//! Capture itself is driven by the desktop shell; this tool operates on
//! the storage root only.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "retrace",
    about = "Session capture storage and catalog maintenance",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage root override (defaults to the configured location)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored sessions
    List,

    /// Show one session in detail
    Info {
        /// Session id
        id: String,
    },

    /// Search the catalog with conjunctive filters
    Search {
        /// Free-text tokens (all must match)
        #[arg(short, long)]
        text: Option<String>,

        /// Required tag (repeatable)
        #[arg(short = 'g', long = "tag")]
        tags: Vec<String>,

        /// Required category
        #[arg(short, long)]
        category: Option<String>,

        /// Required sub-category
        #[arg(long)]
        subcategory: Option<String>,

        /// Required status: recording|paused|completed|failed
        #[arg(short, long)]
        status: Option<String>,

        /// Sessions started at or after (RFC 3339)
        #[arg(long)]
        after: Option<String>,

        /// Sessions started at or before (RFC 3339)
        #[arg(long)]
        before: Option<String>,
    },

    /// Delete a session and remove its index entry
    Delete {
        /// Session id
        id: String,
    },

    /// Rebuild the search index from the full store snapshot
    RebuildIndex,

    /// Report disk space for the storage root
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    retrace_common::logging::init_logging(&retrace_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    let config = retrace_common::AppConfig::load();
    let root = cli.root.unwrap_or_else(|| config.storage_root.clone());

    match cli.command {
        Commands::List => commands::list::run(root).await,
        Commands::Info { id } => commands::info::run(root, id).await,
        Commands::Search {
            text,
            tags,
            category,
            subcategory,
            status,
            after,
            before,
        } => {
            commands::search::run(
                root,
                text,
                tags,
                category,
                subcategory,
                status,
                after,
                before,
            )
            .await
        }
        Commands::Delete { id } => commands::delete::run(root, id).await,
        Commands::RebuildIndex => commands::rebuild::run(root).await,
        Commands::Check => commands::check::run(root, &config).await,
    }
}
