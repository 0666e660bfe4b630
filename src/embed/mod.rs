//! Embedding providers and the on-disk corpus embedding cache.

use crate::domain::{EmbeddingBackend, RunConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod hashing;
pub mod openai;

pub use cache::{cache_root_dir, EmbeddingCache};
pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// Capability: turn texts into fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Identifier of the model; part of the cache key.
    fn model_id(&self) -> &str;

    /// Embed `texts`, returning exactly one vector per input, in order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Embeddings for a whole corpus, all from one model with one dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    pub model_id: String,
    pub dimensions: usize,
    pub rows: Vec<Vec<f32>>,
}

impl EmbeddingMatrix {
    pub fn new(model_id: impl Into<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let dimensions = rows.first().map(Vec::len).unwrap_or(0);
        anyhow::ensure!(dimensions > 0, "Embedding matrix has no dimensions");
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dimensions) {
            anyhow::bail!(
                "Embedding row {} has {} dimensions, expected {}",
                i,
                row.len(),
                dimensions
            );
        }
        Ok(Self { model_id: model_id.into(), dimensions, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Select the embedding backend named in the configuration.
pub fn build_embedder(config: &RunConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding_backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::default())),
        EmbeddingBackend::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set for the openai embedding backend")?;
            let embedder = OpenAiEmbedder::new(
                api_key,
                config.embedding_base_url.clone(),
                config.embedding_model.clone(),
                Duration::from_secs(60),
                5,
                config.embedding_batch_size,
            )?;
            Ok(Arc::new(embedder))
        }
    }
}

/// Model id the configured backend would report, without needing credentials.
pub fn configured_model_id(config: &RunConfig) -> String {
    match config.embedding_backend {
        EmbeddingBackend::Hashing => HashingEmbedder::default().model_id().to_string(),
        EmbeddingBackend::OpenAi => config.embedding_model.clone(),
    }
}

/// The configured cache directory, or the per-user default.
pub fn configured_cache(config: &RunConfig) -> EmbeddingCache {
    match &config.cache_dir {
        Some(dir) => EmbeddingCache::new(dir),
        None => EmbeddingCache::default_location(),
    }
}

#[cfg(test)]
mod tests {
    use super::{configured_model_id, EmbeddingMatrix};
    use crate::domain::{EmbeddingBackend, RunConfig};

    #[test]
    fn model_id_follows_backend() {
        let mut config = RunConfig {
            embedding_backend: EmbeddingBackend::OpenAi,
            embedding_model: "text-embedding-3-large".into(),
            ..RunConfig::default()
        };
        assert_eq!(configured_model_id(&config), "text-embedding-3-large");
        config.embedding_backend = EmbeddingBackend::Hashing;
        assert_eq!(configured_model_id(&config), "hashing-fnv1a-256");
    }

    #[test]
    fn matrix_rejects_ragged_rows() {
        let err = EmbeddingMatrix::new("m", vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn matrix_rejects_empty_input() {
        assert!(EmbeddingMatrix::new("m", Vec::new()).is_err());
    }
}
