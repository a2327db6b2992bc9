//! Carwise CLI, the terminal front end.
//!
//! Commands:
//! - `onboard`   Create ~/.carwise and a default config
//! - `chat`      Interactive consultation
//! - `ask`       Answer a single question
//! - `ingest`    Add .txt/.md/.pdf documents to the knowledge base
//! - `search`    Query the knowledge base directly
//! - `kb-stats`  Show knowledge base contents
//! - `kb-clear`  Delete every stored chunk

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "carwise",
    about = "Carwise, an automotive consultant with knowledge base, live search and fallback chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration directory and config file
    Onboard,

    /// Chat interactively
    Chat {
        /// Resume or name a session
        #[arg(short, long)]
        session: Option<String>,

        /// Show which tiers were tried for each answer
        #[arg(long)]
        show_attempts: bool,
    },

    /// Ask a single question and exit
    Ask {
        /// The question
        message: String,

        #[arg(long)]
        show_attempts: bool,
    },

    /// Ingest a file or directory of .txt/.md/.pdf documents
    Ingest {
        path: PathBuf,

        /// Stored with every chunk
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Search the knowledge base
    Search {
        query: String,

        /// Number of results (1-10)
        #[arg(short, long, default_value_t = 4)]
        k: usize,
    },

    /// Show knowledge base statistics
    KbStats,

    /// Delete everything in the knowledge base
    KbClear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { session, show_attempts } => commands::chat::run(session, show_attempts).await?,
        Commands::Ask { message, show_attempts } => commands::chat::ask(&message, show_attempts).await?,
        Commands::Ingest { path, description } => commands::kb::ingest(&path, description.as_deref()).await?,
        Commands::Search { query, k } => commands::kb::search(&query, k).await?,
        Commands::KbStats => commands::kb::stats().await?,
        Commands::KbClear { yes } => commands::kb::clear(yes).await?,
    }

    Ok(())
}
