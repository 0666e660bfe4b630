//! Rank command: retrieval only, no model calls.

use anyhow::Result;
use clap::Args;
use tracing::Level;

use super::utils::{load_run_config, require_path, ReferenceArgs};
use crate::config::CliOverrides;
use crate::embed::{build_embedder, configured_cache};
use crate::normalize::TextNormalizer;
use crate::rank::Retriever;
use crate::source::load_reference_catalog;

#[derive(Args)]
pub struct RankArgs {
    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Item description to look up
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Number of candidates to show (default: 10 for process, 20 for eio)
    #[arg(short = 'k', long, value_name = "K")]
    pub top_k: Option<usize>,

    /// Embed the query as given, without stopword removal
    #[arg(long)]
    pub no_normalize: bool,

    /// Print candidates as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RankArgs, verbose: bool) -> Result<()> {
    super::init_logging(verbose, Level::WARN, None)?;

    let overrides = CliOverrides {
        top_k: args.top_k,
        normalize_query: if args.no_normalize { Some(false) } else { None },
        ..args.reference.overrides()
    };
    let config = load_run_config(args.reference.config.as_deref(), overrides)?;
    let reference_file =
        require_path(&config.reference_file, "--reference-file", "reference_file")?;

    let catalog = load_reference_catalog(&reference_file, config.task)?;
    let embedder = build_embedder(&config)?;
    let retriever =
        Retriever::build(catalog.corpus().to_vec(), embedder, &configured_cache(&config))?;

    let query = if config.normalize_query {
        let normalized = TextNormalizer::new().normalize(&args.query);
        if normalized.is_empty() {
            args.query.clone()
        } else {
            normalized
        }
    } else {
        args.query.clone()
    };
    anyhow::ensure!(!query.trim().is_empty(), "Query is empty");

    let ranked = retriever.rank(&query, config.effective_top_k())?;
    if args.json {
        for candidate in &ranked {
            println!("{}", serde_json::to_string(candidate)?);
        }
        return Ok(());
    }

    println!("Query: {query}");
    for (rank, candidate) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {:>11.8}  [{}] {}",
            rank + 1,
            candidate.cosine_score,
            candidate.index,
            candidate.text
        );
    }
    Ok(())
}
