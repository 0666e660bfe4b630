//! Free-text cleanup before retrieval.
//!
//! Lowercases, replaces punctuation with whitespace, drops English stopwords
//! and optionally stems what is left. Pure: no state beyond the settings.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// English stopwords (NLTK list plus a few spaCy extras common in catalog text).
pub static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
        "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
        "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
        "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
        "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
        "for", "with", "about", "against", "between", "into", "through", "during", "before",
        "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
        "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
        "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain",
        "aren", "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn",
        "mustn", "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn", "also", "although",
        "amongst", "anyhow", "anyway", "became", "become", "becomes", "besides", "could",
        "either", "else", "elsewhere", "enough", "etc", "ever", "every", "however", "indeed",
        "may", "might", "must", "neither", "never", "nevertheless", "often", "per", "perhaps",
        "quite", "rather", "really", "several", "since", "still", "thus", "together", "upon",
        "via", "whether", "within", "without", "would", "yet",
    ]
    .into_iter()
    .collect()
});

/// Configurable text normalizer.
pub struct TextNormalizer {
    remove_stopwords: bool,
    stemmer: Option<Stemmer>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Lowercase, strip punctuation and drop stopwords. No stemming.
    pub fn new() -> Self {
        Self { remove_stopwords: true, stemmer: None }
    }

    /// Set whether stopwords are dropped
    pub fn remove_stopwords(mut self, remove: bool) -> Self {
        self.remove_stopwords = remove;
        self
    }

    /// Set whether tokens are reduced to their English stem
    pub fn stem(mut self, stem: bool) -> Self {
        self.stemmer = if stem { Some(Stemmer::create(Algorithm::English)) } else { None };
        self
    }

    pub fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = PUNCTUATION.replace_all(&lowered, " ");
        cleaned
            .split_whitespace()
            .filter(|word| !self.remove_stopwords || !STOPWORDS.contains(word))
            .map(|word| match &self.stemmer {
                Some(stemmer) => stemmer.stem(word).into_owned(),
                None => word.to_string(),
            })
            .collect()
    }

    /// Normalized tokens joined by single spaces.
    pub fn normalize(&self, text: &str) -> String {
        self.tokens(text).join(" ")
    }
}
