//! Second-stage reranking: a language model picks from the retrieval shortlist.

use crate::domain::{ActivityRecord, MatchResult, RankedCandidate, ReferenceCatalog, TaskKind};
use crate::llm::{AskOptions, Conversation, ReasoningClient};
use crate::normalize::TextNormalizer;
use crate::prompts;
use crate::rank::Retriever;
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

pub mod eio;
pub mod process;
pub mod rules;

pub use eio::EioReranker;
pub use process::ProcessReranker;

/// What a reranker concluded for one activity.
#[derive(Debug, Clone)]
pub enum RerankOutcome {
    Matched(MatchResult),
    /// Nothing usable came back; the activity is left out of the outputs.
    NoMatch { reason: String },
}

pub trait Reranker {
    fn kind(&self) -> TaskKind;
    fn rerank(&self, activity: &ActivityRecord) -> Result<RerankOutcome>;
}

/// Collaborators shared by both reranker variants.
pub struct RerankContext {
    pub client: ReasoningClient,
    pub retriever: Retriever,
    pub normalizer: TextNormalizer,
    pub paraphrase: bool,
    pub normalize_query: bool,
    pub retries: usize,
    pub top_k: usize,
}

impl RerankContext {
    pub fn ask_options(&self) -> AskOptions {
        AskOptions::with_retries(self.retries)
    }

    /// The text the rest of the pipeline works from: a plain-language paraphrase
    /// when enabled and the model produced one, otherwise the raw activity text.
    pub fn describe(
        &self,
        session: &mut Conversation,
        activity: &ActivityRecord,
        template: &str,
    ) -> (Option<String>, String) {
        let raw = activity.text();
        if !self.paraphrase {
            return (None, raw);
        }
        let prompt = prompts::render(template, &raw, "");
        match self.client.ask_text(session, &prompt, self.ask_options()) {
            Ok(text) => {
                info!("Paraphrased: {}", text);
                (Some(text.clone()), text)
            }
            Err(err) => {
                warn!("Paraphrasing failed for {}, using raw text: {}", activity.id, err);
                (None, raw)
            }
        }
    }

    /// Top-k retrieval for `text`, normalized first when enabled.
    pub fn shortlist(&self, text: &str) -> Result<Vec<RankedCandidate>> {
        let query = self.query_text(text);
        let ranked = self.retriever.rank(&query, self.top_k)?;
        debug!("Retrieved {} candidates for {:?}", ranked.len(), query);
        Ok(ranked)
    }

    fn query_text(&self, text: &str) -> String {
        if !self.normalize_query {
            return text.to_string();
        }
        let normalized = self.normalizer.normalize(text);
        // Normalizing a description made only of stopwords leaves nothing to embed.
        if normalized.is_empty() {
            text.to_string()
        } else {
            normalized
        }
    }
}

/// Activities with no text are reported as unmatched before any model call or retrieval.
pub(crate) fn blank_activity(activity: &ActivityRecord) -> Option<RerankOutcome> {
    if !activity.text().trim().is_empty() {
        return None;
    }
    warn!("Activity {} has no text to match", activity.id);
    Some(RerankOutcome::NoMatch { reason: "empty activity text".to_string() })
}

/// Pick the reranker matching the catalog variant.
pub fn build_reranker(catalog: ReferenceCatalog, context: RerankContext) -> Box<dyn Reranker> {
    match catalog {
        ReferenceCatalog::Process(catalog) => Box::new(ProcessReranker::new(catalog, context)),
        ReferenceCatalog::Eio(catalog) => Box::new(EioReranker::new(catalog, context)),
    }
}

/// One JSON object per line inside a list literal, the layout the prompts show.
pub(crate) fn listing(items: impl IntoIterator<Item = Value>) -> String {
    let lines: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    format!("[\n{}\n]", lines.join(",\n"))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub backends shared by the reranker tests.

    use crate::embed::{Embedder, EmbeddingMatrix};
    use crate::llm::{ChatMessage, Completer};
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    /// Embeds by keyword: each axis is one keyword family.
    pub struct KeywordEmbedder {
        pub axes: Vec<Vec<&'static str>>,
    }

    impl Embedder for KeywordEmbedder {
        fn model_id(&self) -> &str {
            "keyword-stub"
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    let mut v: Vec<f32> = self
                        .axes
                        .iter()
                        .map(|words| words.iter().filter(|w| lower.contains(*w)).count() as f32)
                        .collect();
                    v.push(0.01);
                    v
                })
                .collect())
        }
    }

    pub fn matrix(embedder: &dyn Embedder, corpus: &[String]) -> Arc<EmbeddingMatrix> {
        let texts: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let rows = embedder.embed(&texts).unwrap();
        Arc::new(EmbeddingMatrix::new(embedder.model_id(), rows).unwrap())
    }

    /// Replays canned replies in order and records every prompt it saw.
    pub struct ScriptedCompleter {
        replies: Mutex<Vec<String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompleter {
        pub fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl Completer for ScriptedCompleter {
        fn model_id(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _system: &str, history: &[ChatMessage]) -> Result<String> {
            let prompt = history.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_puts_one_record_per_line() {
        let out = listing(vec![json!({"index": 0}), json!({"index": 7})]);
        similar_asserts::assert_eq!(out, "[\n{\"index\":0},\n{\"index\":7}\n]");
    }
}
