//! Command-line interface for eifmap
//!
//! Provides `map` (batch mapping), `rank` (retrieval only) and `cache-key`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cache_key;
mod map;
mod rank;
mod utils;

/// Map free-text activities to emission impact factors
#[derive(Parser)]
#[command(name = "eifmap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Map every activity in a file to a reference category
    Map(Box<map::MapArgs>),

    /// Show the retrieval shortlist for one description
    Rank(rank::RankArgs),

    /// Print the embedding cache key and path for a catalog
    CacheKey(cache_key::CacheKeyArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Map(args) => map::run(*args, cli.verbose),
        Commands::Rank(args) => rank::run(args, cli.verbose),
        Commands::CacheKey(args) => cache_key::run(args, cli.verbose),
    }
}

/// Install the tracing subscriber: stderr always, plus an ANSI-free copy in
/// `log_file` when given. RUST_LOG in the environment takes precedence;
/// `--verbose` falls back to DEBUG, otherwise `default_level`.
pub(crate) fn init_logging(
    verbose: bool,
    default_level: Level,
    log_file: Option<&Path>,
) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { default_level };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    Ok(())
}
