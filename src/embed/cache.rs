//! Content-addressed cache of corpus embeddings.
//!
//! Entries are keyed by `corpus_cache_key(model_id, corpus)` and written with a
//! temp-file-then-rename so a failed or interrupted computation never leaves a
//! partial entry behind. Within one process, callers for the same key are
//! serialized so the corpus is embedded at most once.

use super::{Embedder, EmbeddingMatrix};
use crate::utils::corpus_cache_key;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub struct EmbeddingCache {
    dir: PathBuf,
    memo: Mutex<HashMap<String, Arc<EmbeddingMatrix>>>,
}

impl EmbeddingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), memo: Mutex::new(HashMap::new()) }
    }

    /// Cache under the user cache directory, or the system temp dir when there is none.
    pub fn default_location() -> Self {
        let base = cache_root_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("eifmap").join("embeddings"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load the embeddings for `corpus`, computing and persisting them on a miss.
    pub fn get_or_compute(
        &self,
        corpus: &[String],
        embedder: &dyn Embedder,
    ) -> Result<Arc<EmbeddingMatrix>> {
        anyhow::ensure!(!corpus.is_empty(), "Cannot embed an empty corpus");
        let key = corpus_cache_key(embedder.model_id(), corpus);

        // Held across the computation so a re-entrant caller waits instead of duplicating work.
        let mut memo =
            self.memo.lock().map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
        if let Some(hit) = memo.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let path = self.path_for_key(&key);
        if path.exists() {
            match read_entry(&path, embedder.model_id(), corpus.len()) {
                Ok(matrix) => {
                    info!("Loaded cached embeddings from {}", path.display());
                    let matrix = Arc::new(matrix);
                    memo.insert(key, Arc::clone(&matrix));
                    return Ok(matrix);
                }
                Err(err) => warn!("Ignoring unreadable embedding cache {}: {:#}", path.display(), err),
            }
        }

        info!("Embedding {} reference texts with {}", corpus.len(), embedder.model_id());
        let texts: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let rows = embedder.embed(&texts)?;
        anyhow::ensure!(
            rows.len() == corpus.len(),
            "Embedder returned {} vectors for {} texts",
            rows.len(),
            corpus.len()
        );
        let matrix = Arc::new(EmbeddingMatrix::new(embedder.model_id(), rows)?);

        if let Err(err) = self.write_entry(&path, &matrix) {
            warn!("Failed to persist embedding cache {}: {:#}", path.display(), err);
        }
        memo.insert(key, Arc::clone(&matrix));
        Ok(matrix)
    }

    fn write_entry(&self, path: &Path, matrix: &EmbeddingMatrix) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed creating cache directory {}", self.dir.display()))?;
        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, matrix)?;
            writer.flush()?;
        }
        tmp.persist(path).with_context(|| format!("Failed moving cache into {}", path.display()))?;
        Ok(())
    }
}

fn read_entry(path: &Path, model_id: &str, expected_rows: usize) -> Result<EmbeddingMatrix> {
    let file = File::open(path)?;
    let matrix: EmbeddingMatrix = serde_json::from_reader(BufReader::new(file))?;
    anyhow::ensure!(
        matrix.model_id == model_id,
        "cached model '{}' does not match '{}'",
        matrix.model_id,
        model_id
    );
    anyhow::ensure!(
        matrix.len() == expected_rows,
        "cached entry has {} rows, corpus has {}",
        matrix.len(),
        expected_rows
    );
    Ok(matrix)
}

pub fn cache_root_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("LOCALAPPDATA").map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache"))
    }
}
