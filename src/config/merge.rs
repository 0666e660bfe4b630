//! Layering command-line values over the file configuration.

use crate::domain::{EmbeddingBackend, LlmBackend, RunConfig, TaskKind};
use std::path::PathBuf;

/// Values given on the command line. `None` leaves the file/default value in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub task: Option<TaskKind>,
    pub activity_file: Option<PathBuf>,
    pub activity_columns: Option<Vec<String>>,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub reference_file: Option<PathBuf>,
    pub reference_label: Option<String>,
    pub embedding_backend: Option<EmbeddingBackend>,
    pub embedding_model: Option<String>,
    pub embedding_base_url: Option<String>,
    pub llm_backend: Option<LlmBackend>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub paraphrase: Option<bool>,
    pub normalize_query: Option<bool>,
    pub retries: Option<usize>,
    pub top_k: Option<usize>,
    pub output: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub flush_every: Option<usize>,
    pub show_progress: Option<bool>,
}

/// CLI wins over the config file, which wins over built-in defaults.
pub fn merge_cli_with_config(mut config: RunConfig, cli: CliOverrides) -> RunConfig {
    macro_rules! take {
        ($($field:ident),* $(,)?) => {
            $(if let Some(value) = cli.$field {
                config.$field = value;
            })*
        };
    }
    macro_rules! take_opt {
        ($($field:ident),* $(,)?) => {
            $(if cli.$field.is_some() {
                config.$field = cli.$field;
            })*
        };
    }

    take!(
        task,
        activity_columns,
        start_index,
        embedding_backend,
        embedding_model,
        embedding_base_url,
        llm_backend,
        llm_model,
        temperature,
        max_tokens,
        paraphrase,
        normalize_query,
        retries,
        output,
        flush_every,
        show_progress,
    );
    take_opt!(
        activity_file,
        end_index,
        reference_file,
        reference_label,
        llm_base_url,
        top_k,
        cache_dir,
    );

    config.flush_every = config.flush_every.max(1);
    config
}
