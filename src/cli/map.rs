//! Map command implementation

use anyhow::Result;
use clap::Args;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, Level};

use super::utils::{load_run_config, parse_columns, require_path, ReferenceArgs};
use crate::batch::{BatchRunner, OutputPaths};
use crate::config::CliOverrides;
use crate::domain::LlmBackend;
use crate::embed::{build_embedder, configured_cache};
use crate::llm::{build_completer, ReasoningClient};
use crate::normalize::TextNormalizer;
use crate::rank::Retriever;
use crate::rerank::{build_reranker, RerankContext};
use crate::source::{load_activities, load_reference_catalog, ActivitySelection};

#[derive(Args)]
pub struct MapArgs {
    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Activity CSV file to classify
    #[arg(short = 'a', long, value_name = "FILE")]
    pub activity_file: Option<PathBuf>,

    /// Columns describing each activity: 'auto' or comma-separated names
    #[arg(long, value_name = "COLS")]
    pub activity_cols: Option<String>,

    /// First activity row to process (after dropping duplicates)
    #[arg(long, value_name = "N")]
    pub start_index: Option<usize>,

    /// Stop before this activity row
    #[arg(long, value_name = "N")]
    pub end_index: Option<usize>,

    /// Dataset label written into every summary row
    #[arg(long, value_name = "TEXT")]
    pub reference_label: Option<String>,

    /// LLM backend: 'anthropic' or 'openai'
    #[arg(long, value_name = "BACKEND")]
    pub llm_backend: Option<LlmBackend>,

    /// LLM model identifier
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub llm_model: Option<String>,

    /// Base URL of a compatible chat server
    #[arg(long, value_name = "URL")]
    pub llm_base_url: Option<String>,

    /// Sampling temperature
    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,

    /// Maximum tokens per completion
    #[arg(long, value_name = "TOKENS")]
    pub max_tokens: Option<usize>,

    /// Match the raw text instead of a model paraphrase
    #[arg(long)]
    pub no_paraphrase: bool,

    /// Embed the query as given, without stopword removal
    #[arg(long)]
    pub no_normalize: bool,

    /// Extra attempts after a response fails to parse or validate
    #[arg(long, value_name = "N")]
    pub retries: Option<usize>,

    /// Shortlist size (default: 10 for process, 20 for eio)
    #[arg(short = 'k', long, value_name = "K")]
    pub top_k: Option<usize>,

    /// Output stem; .jsonl, .csv and .log are appended
    #[arg(short = 'o', long, value_name = "STEM")]
    pub output: Option<PathBuf>,

    /// Flush both logs after this many new results
    #[arg(long, value_name = "N")]
    pub flush_every: Option<usize>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl MapArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            activity_file: self.activity_file.clone(),
            activity_columns: parse_columns(&self.activity_cols),
            start_index: self.start_index,
            end_index: self.end_index,
            reference_label: self.reference_label.clone(),
            llm_backend: self.llm_backend,
            llm_model: self.llm_model.clone(),
            llm_base_url: self.llm_base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            paraphrase: if self.no_paraphrase { Some(false) } else { None },
            normalize_query: if self.no_normalize { Some(false) } else { None },
            retries: self.retries,
            top_k: self.top_k,
            output: self.output.clone(),
            flush_every: self.flush_every,
            show_progress: if self.no_progress { Some(false) } else { None },
            ..self.reference.overrides()
        }
    }
}

pub fn run(args: MapArgs, verbose: bool) -> Result<()> {
    let config = load_run_config(args.reference.config.as_deref(), args.overrides())?;
    let activity_file = require_path(&config.activity_file, "--activity-file", "activity_file")?;
    let reference_file =
        require_path(&config.reference_file, "--reference-file", "reference_file")?;

    let paths = OutputPaths::from_stem(&config.output);
    super::init_logging(verbose, Level::INFO, Some(&paths.log))?;
    info!(
        "Mapping {} against {} ({} task)",
        activity_file.display(),
        reference_file.display(),
        config.task
    );

    let catalog = load_reference_catalog(&reference_file, config.task)?;
    let selection = ActivitySelection {
        columns: config.activity_columns.clone(),
        start: config.start_index,
        end: config.end_index,
    };
    let activities = load_activities(&activity_file, &selection)?;

    let embedder = build_embedder(&config)?;
    let retriever =
        Retriever::build(catalog.corpus().to_vec(), embedder, &configured_cache(&config))?;
    let client = ReasoningClient::new(build_completer(&config)?);
    info!("Reranking with {}", client.model_id());

    let context = RerankContext {
        client,
        retriever,
        normalizer: TextNormalizer::new(),
        paraphrase: config.paraphrase,
        normalize_query: config.normalize_query,
        retries: config.retries,
        top_k: config.effective_top_k(),
    };
    let reranker = build_reranker(catalog, context);

    let show_progress = config.show_progress && std::io::stderr().is_terminal();
    let mut runner = BatchRunner::new(reranker, paths)
        .dataset_label(config.dataset_label())
        .flush_every(config.flush_every)
        .show_progress(show_progress);
    let summary = runner.run(&activities)?;

    println!(
        "Mapped {} new activities ({} already done, {} without a match) -> {}",
        summary.processed,
        summary.skipped,
        summary.no_match,
        runner.paths().records.display()
    );
    Ok(())
}
