//! Batch run configuration.

use super::TaskKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmbeddingBackend {
    /// Offline feature-hashing embedder.
    #[serde(rename = "hashing")]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" => Ok(EmbeddingBackend::Hashing),
            "openai" => Ok(EmbeddingBackend::OpenAi),
            other => Err(format!("Invalid embedding backend '{other}' (expected 'hashing' or 'openai')")),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::Hashing => f.write_str("hashing"),
            EmbeddingBackend::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LlmBackend {
    #[default]
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" => Ok(LlmBackend::OpenAi),
            other => Err(format!("Invalid LLM backend '{other}' (expected 'anthropic' or 'openai')")),
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmBackend::Anthropic => f.write_str("anthropic"),
            LlmBackend::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub task: TaskKind,
    pub activity_file: Option<PathBuf>,
    /// Columns describing each activity. Empty means every column.
    #[serde(deserialize_with = "deserialize_columns")]
    pub activity_columns: Vec<String>,
    pub start_index: usize,
    pub end_index: Option<usize>,
    pub reference_file: Option<PathBuf>,
    /// Dataset label written into every summary row.
    pub reference_label: Option<String>,

    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_batch_size: usize,

    pub llm_backend: LlmBackend,
    pub llm_model: String,
    pub llm_base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,

    pub paraphrase: bool,
    pub normalize_query: bool,
    pub retries: usize,
    pub top_k: Option<usize>,

    /// Output stem; `.jsonl`, `.csv` and `.log` are appended.
    pub output: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub flush_every: usize,
    pub show_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            task: TaskKind::Process,
            activity_file: None,
            activity_columns: Vec::new(),
            start_index: 0,
            end_index: None,
            reference_file: None,
            reference_label: None,
            embedding_backend: EmbeddingBackend::OpenAi,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            embedding_batch_size: 32,
            llm_backend: LlmBackend::Anthropic,
            llm_model: "claude-3-sonnet-20240229".to_string(),
            llm_base_url: None,
            temperature: 0.0,
            max_tokens: 4096,
            paraphrase: true,
            normalize_query: true,
            retries: 2,
            top_k: None,
            output: PathBuf::from("ranked_preds"),
            cache_dir: None,
            flush_every: 10,
            show_progress: true,
        }
    }
}

impl RunConfig {
    pub fn effective_top_k(&self) -> usize {
        self.top_k.unwrap_or_else(|| self.task.default_top_k()).max(1)
    }

    pub fn dataset_label(&self) -> String {
        self.reference_label
            .clone()
            .unwrap_or_else(|| self.task.default_dataset_label().to_string())
    }
}

/// Accept `"auto"`, a comma-separated string, or a list of column names.
fn deserialize_columns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Columns {
        One(String),
        Many(Vec<String>),
    }

    let raw = match Columns::deserialize(deserializer)? {
        Columns::One(s) if s.trim().eq_ignore_ascii_case("auto") => Vec::new(),
        Columns::One(s) => s.split(',').map(str::to_string).collect(),
        Columns::Many(v) => v,
    };
    Ok(raw.into_iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect())
}
