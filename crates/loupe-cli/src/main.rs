//! # loupe CLI
//!
//! Command-line interface for the loupe file search tool.
//!
//! ## Commands
//!
//! - `loupe index` - Build the initial file index
//! - `loupe rebuild` - Drop the index and rebuild from scratch
//! - `loupe search <query>` - Search for files matching a query
//! - `loupe watch` - Apply filesystem changes to the index as they happen
//! - `loupe stats` - Show index statistics
//! - `loupe config` - Print the resolved configuration
//!
//! ## Example Usage
//!
//! ```bash
//! # Build the initial index
//! loupe index
//!
//! # Fuzzy search (the default mode)
//! loupe search reprt
//!
//! # Wildcard search capped at 20 results
//! loupe search '*.rs' --mode wildcard --max-results 20
//!
//! # Keep the index fresh until SIGINT/SIGTERM
//! loupe watch --daemon
//! ```

mod app;
mod commands;
mod signals;

use clap::{Parser, Subcommand};
use loupe_core::SearchMode;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// loupe - fast filename search for the desktop
#[derive(Parser)]
#[command(name = "loupe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable filesystem watching regardless of configuration
    #[arg(long, global = true)]
    no_watch: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for files matching a query
    Search {
        /// The query text or pattern
        query: String,

        /// Matching mode: exact, fuzzy, wildcard or regex
        #[arg(short, long)]
        mode: Option<SearchMode>,

        /// Maximum number of results to gather
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Exact mode only: match case exactly
        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Filter by extension (can be used multiple times)
        #[arg(short, long)]
        ext: Vec<String>,
    },

    /// Build the initial index and exit
    Index {
        /// Only index specific drive roots
        #[arg(short, long)]
        drives: Vec<String>,
    },

    /// Drop the in-memory index and rebuild from scratch
    Rebuild {
        /// Only index specific drive roots
        #[arg(short, long)]
        drives: Vec<String>,
    },

    /// Watch for filesystem changes and keep the index fresh
    Watch {
        /// Block until SIGINT/SIGTERM without console chatter
        #[arg(short, long)]
        daemon: bool,
    },

    /// Show index statistics
    Stats,

    /// Print the resolved configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => loupe_core::Config::load_from(path)?,
        None => loupe_core::Config::load()?,
    };
    if cli.no_watch {
        config.watcher.enabled = false;
    }

    match cli.command {
        Commands::Search {
            query,
            mode,
            max_results,
            case_sensitive,
            ext,
        } => commands::search::run(config, &query, mode, max_results, case_sensitive, ext),
        Commands::Index { drives } => commands::index::run(config, drives),
        Commands::Rebuild { drives } => commands::rebuild::run(config, drives),
        Commands::Watch { daemon } => commands::watch::run(config, daemon),
        Commands::Stats => commands::stats::run(config),
        Commands::Config => commands::config::run(config),
    }
}
