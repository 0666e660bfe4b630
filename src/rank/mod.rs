//! First-stage retrieval: top-k reference entries by cosine similarity.

use crate::domain::RankedCandidate;
use crate::embed::{Embedder, EmbeddingCache, EmbeddingMatrix};
use anyhow::Result;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

/// Searches a fixed corpus whose embeddings were computed once up front.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    matrix: Arc<EmbeddingMatrix>,
    corpus: Vec<String>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        matrix: Arc<EmbeddingMatrix>,
        corpus: Vec<String>,
    ) -> Result<Self> {
        anyhow::ensure!(!corpus.is_empty(), "Retrieval corpus is empty");
        anyhow::ensure!(
            matrix.len() == corpus.len(),
            "Embedding matrix has {} rows for a corpus of {}",
            matrix.len(),
            corpus.len()
        );
        anyhow::ensure!(
            matrix.model_id == embedder.model_id(),
            "Corpus was embedded with '{}' but queries use '{}'",
            matrix.model_id,
            embedder.model_id()
        );
        Ok(Self { embedder, matrix, corpus })
    }

    /// Embed `corpus` through `cache` (computing on a miss) and wrap it for search.
    pub fn build(
        corpus: Vec<String>,
        embedder: Arc<dyn Embedder>,
        cache: &EmbeddingCache,
    ) -> Result<Self> {
        let matrix = cache.get_or_compute(&corpus, embedder.as_ref())?;
        Self::new(embedder, matrix, corpus)
    }

    pub fn corpus(&self) -> &[String] {
        &self.corpus
    }

    /// The `k` corpus entries closest to `query`, best first. `k` is capped at the corpus size.
    pub fn rank(&self, query: &str, k: usize) -> Result<Vec<RankedCandidate>> {
        anyhow::ensure!(!query.trim().is_empty(), "Cannot rank an empty query");
        let mut embedded = self.embedder.embed(&[query])?;
        anyhow::ensure!(embedded.len() == 1, "Embedder returned {} query vectors", embedded.len());
        let query_vec = embedded.remove(0);
        anyhow::ensure!(
            query_vec.len() == self.matrix.dimensions,
            "Query has {} dimensions, corpus has {}",
            query_vec.len(),
            self.matrix.dimensions
        );

        let ranked = top_k_by_cosine(&query_vec, &self.matrix.rows, k)
            .into_iter()
            .map(|(index, score)| RankedCandidate {
                index,
                text: self.corpus[index].clone(),
                cosine_score: score,
            })
            .collect();
        Ok(ranked)
    }
}

/// Indices and rounded scores of the `k` rows most similar to `query`.
/// Sorted by descending score; equal scores keep corpus order.
pub fn top_k_by_cosine(query: &[f32], rows: &[Vec<f32>], k: usize) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = rows
        .par_iter()
        .enumerate()
        .map(|(i, row)| (i, round_score(cosine_similarity(query, row))))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    scored.truncate(k.min(rows.len()));
    scored
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
}

/// Eight decimal digits, for stable serialization.
pub fn round_score(score: f64) -> f64 {
    (score * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use std::collections::HashSet;

    #[test]
    fn returns_k_sorted_unique_candidates() {
        let rows: Vec<Vec<f32>> =
            (0..20).map(|i| vec![(i as f32).cos(), (i as f32).sin(), 0.5]).collect();
        let top = top_k_by_cosine(&[1.0, 0.2, 0.5], &rows, 5);
        assert_eq!(top.len(), 5);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
        let unique: HashSet<usize> = top.iter().map(|(i, _)| *i).collect();
        assert_eq!(unique.len(), 5);
        assert!(unique.iter().all(|i| *i < 20));
    }

    #[test]
    fn k_is_capped_at_corpus_size() {
        let rows = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(top_k_by_cosine(&[1.0, 0.0], &rows, 10).len(), 2);
    }

    #[test]
    fn ties_keep_corpus_order() {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let top = top_k_by_cosine(&[1.0, 0.0], &rows, 3);
        let order: Vec<usize> = top.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn scores_are_rounded_to_eight_digits() {
        assert_eq!(round_score(0.123456789123), 0.12345679);
        let c = cosine_similarity(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]);
        assert_eq!(round_score(c), 0.71428571);
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn retriever_rejects_mismatched_model() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(4));
        let matrix = Arc::new(EmbeddingMatrix::new("other", vec![vec![1.0; 4]]).unwrap());
        assert!(Retriever::new(embedder, matrix, vec!["x".into()]).is_err());
    }

    #[test]
    fn retriever_ranks_overlapping_text_first() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        let corpus = vec!["tomato, fresh grade".to_string(), "maize grain".to_string()];
        let texts: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let rows = embedder.embed(&texts).unwrap();
        let matrix = Arc::new(EmbeddingMatrix::new(embedder.model_id(), rows).unwrap());
        let retriever = Retriever::new(embedder, matrix, corpus).unwrap();

        let ranked = retriever.rank("organic maize grain", 2).unwrap();
        assert_eq!(ranked[0].index, 1);
        assert_eq!(ranked[0].text, "maize grain");
        assert!(retriever.rank("   ", 2).is_err());
    }
}
