//! Shared CLI utilities.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use crate::config::{load_config, merge_cli_with_config, CliOverrides};
use crate::domain::{EmbeddingBackend, RunConfig, TaskKind};

/// Options naming the reference catalog and how it is embedded.
#[derive(Args, Debug, Clone, Default)]
pub struct ReferenceArgs {
    /// Path to config file (eifmap.toml or .eifmap.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Reference universe: 'process' or 'eio'
    #[arg(short = 't', long, value_name = "KIND")]
    pub task: Option<TaskKind>,

    /// Reference catalog file (CSV or JSON array)
    #[arg(short = 'r', long, value_name = "FILE")]
    pub reference_file: Option<PathBuf>,

    /// Embedding backend: 'openai' or 'hashing'
    #[arg(long, value_name = "BACKEND")]
    pub embedding_backend: Option<EmbeddingBackend>,

    /// Embedding model identifier
    #[arg(long, value_name = "MODEL")]
    pub embedding_model: Option<String>,

    /// Base URL of an OpenAI-compatible embeddings server
    #[arg(long, value_name = "URL")]
    pub embedding_base_url: Option<String>,

    /// Directory holding cached corpus embeddings
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl ReferenceArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            task: self.task,
            reference_file: self.reference_file.clone(),
            embedding_backend: self.embedding_backend,
            embedding_model: self.embedding_model.clone(),
            embedding_base_url: self.embedding_base_url.clone(),
            cache_dir: self.cache_dir.clone(),
            ..CliOverrides::default()
        }
    }
}

/// Config file (explicit or discovered in the working directory) merged with CLI values.
pub fn load_run_config(config_path: Option<&Path>, overrides: CliOverrides) -> Result<RunConfig> {
    let cwd = std::env::current_dir()?;
    let file_config = load_config(&cwd, config_path)?;
    Ok(merge_cli_with_config(file_config, overrides))
}

/// Parse a column list: `auto` (every column) or comma-separated names.
/// Returns `None` when `value` is `None`.
pub fn parse_columns(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|s| {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Vec::new();
        }
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
    })
}

/// The required path, or an error telling the user how to provide it.
pub fn require_path(value: &Option<PathBuf>, flag: &str, key: &str) -> Result<PathBuf> {
    value.clone().ok_or_else(|| {
        anyhow::anyhow!("No {key} given; pass {flag} or set `{key}` in the config file")
    })
}
