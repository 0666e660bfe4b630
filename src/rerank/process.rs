//! Process-level matching in two model calls.
//!
//! Stage one narrows the retrieved reference products to at most five that the
//! item is made of. Stage two picks the best and second-best impact factor
//! among the factors producing those products.

use super::rules::{apply_process_rules, Offered};
use super::{blank_activity, listing, RerankContext, RerankOutcome, Reranker};
use crate::domain::{
    ActivityRecord, ImpactFactor, MatchResult, Pick, ProcessCatalog, RankedCandidate,
    ReviewOption, TaskKind,
};
use crate::llm::contract::{record_index, require_exact_keys, validate_indices, ContractError};
use crate::llm::{contract::record_str, Conversation, Record};
use crate::prompts;
use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

const STAGE_ONE_KEYS: [&str; 3] = ["index", "justification", "reference_product"];
const STAGE_TWO_KEYS: [&str; 3] = ["index", "justification", "impact_factor_name"];
const MAX_PRODUCTS: usize = 5;

pub struct ProcessReranker {
    catalog: ProcessCatalog,
    context: RerankContext,
}

impl ProcessReranker {
    pub fn new(catalog: ProcessCatalog, context: RerankContext) -> Self {
        Self { catalog, context }
    }

    /// Reference products the item is made of, best first, at most five.
    fn select_products(
        &self,
        session: &mut Conversation,
        activity: &ActivityRecord,
        description: &str,
        shortlist: &[RankedCandidate],
    ) -> Result<(Vec<String>, String)> {
        let offered: Vec<usize> = shortlist.iter().map(|c| c.index).collect();
        let candidates = listing(
            shortlist.iter().map(|c| json!({"index": c.index, "reference_product": c.text})),
        );
        let prompt = prompts::render(prompts::REFERENCE_PRODUCTS, description, &candidates);

        let validator = |records: &[Record]| -> Result<(), ContractError> {
            non_empty(records)?;
            require_exact_keys(records, &STAGE_ONE_KEYS)?;
            validate_indices(records, "index", &offered)
        };
        let records = self
            .context
            .client
            .ask_records(session, &prompt, self.context.ask_options(), &validator)
            .with_context(|| format!("Reference product selection failed for {}", activity.id))?;
        info!("Reference products chosen: {:?}", records);

        let corpus = self.context.retriever.corpus();
        let mut products: Vec<String> = Vec::new();
        let mut justification = String::new();
        for record in &records {
            if let Some(index) = record_index(record, "index")? {
                let product = &corpus[index];
                if !products.contains(product) {
                    products.push(product.clone());
                }
            } else if justification.is_empty() {
                justification = record_str(record, "justification").unwrap_or_default();
            }
        }
        products.truncate(MAX_PRODUCTS);
        Ok((products, justification))
    }

    /// Best and second-best impact factor among `candidates`.
    fn select_factors(
        &self,
        session: &mut Conversation,
        activity: &ActivityRecord,
        description: &str,
        candidates: &[(usize, &ImpactFactor)],
    ) -> Result<Vec<Pick>> {
        let offered: Vec<usize> = candidates.iter().map(|(i, _)| *i).collect();
        let listed = listing(candidates.iter().map(|(index, factor)| {
            json!({
                "index": index,
                "impact_factor_name": factor.name,
                "reference_product": factor.reference_product,
                "product_info": factor.product_info,
            })
        }));
        let prompt = prompts::render(prompts::BEST_IMPACT_FACTOR, description, &listed);

        let validator = |records: &[Record]| -> Result<(), ContractError> {
            non_empty(records)?;
            require_exact_keys(records, &STAGE_TWO_KEYS)?;
            validate_indices(records, "index", &offered)
        };
        let records = self
            .context
            .client
            .ask_records(session, &prompt, self.context.ask_options(), &validator)
            .with_context(|| format!("Impact factor selection failed for {}", activity.id))?;
        info!("Impact factors chosen: {:?}", records);

        let mut picks = Vec::with_capacity(records.len());
        for record in &records {
            let justification = record_str(record, "justification").unwrap_or_default();
            picks.push(match record_index(record, "index")? {
                Some(index) => self.pick_for(index, justification),
                None => Pick::none(justification),
            });
        }

        let offered_names: Vec<Offered<'_>> =
            candidates.iter().map(|(index, f)| Offered { index: *index, name: &f.name }).collect();
        let picks = apply_process_rules(description, picks, &offered_names)
            .into_iter()
            .map(|p| match p.index {
                Some(index) => self.pick_for(index, p.justification),
                None => p,
            })
            .collect();
        Ok(picks)
    }

    fn pick_for(&self, index: usize, justification: String) -> Pick {
        let factor = self.catalog.get(index);
        Pick {
            index: Some(index),
            label: factor.map(|f| f.name.clone()),
            code: factor.map(|f| f.id.clone()),
            justification,
        }
    }

    fn result(
        &self,
        paraphrase: Option<String>,
        picks: Vec<Pick>,
        candidates: &[(usize, &ImpactFactor)],
    ) -> MatchResult {
        let best = picks.first().and_then(|p| p.index).and_then(|i| self.catalog.get(i));
        let details = TaskKind::Process
            .summary_keys()
            .iter()
            .map(|key| {
                let value = match (best, *key) {
                    (Some(f), "impact_factor_name") => f.name.clone(),
                    (Some(f), "impact_factor_id") => f.id.clone(),
                    (Some(f), "reference_product") => f.reference_product.clone(),
                    _ => String::new(),
                };
                (key.to_string(), value)
            })
            .collect();
        let alternatives =
            candidates.iter().map(|(_, f)| ReviewOption::new(f.name.clone(), f.id.clone())).collect();
        MatchResult { kind: TaskKind::Process, paraphrase, picks, details, alternatives }
    }
}

impl Reranker for ProcessReranker {
    fn kind(&self) -> TaskKind {
        TaskKind::Process
    }

    fn rerank(&self, activity: &ActivityRecord) -> Result<RerankOutcome> {
        if let Some(outcome) = blank_activity(activity) {
            return Ok(outcome);
        }
        let mut session = Conversation::new();
        let (paraphrase, description) =
            self.context.describe(&mut session, activity, prompts::PROCESS_PARAPHRASE);
        let shortlist = self.context.shortlist(&description)?;

        let (products, none_reason) =
            self.select_products(&mut session, activity, &description, &shortlist)?;
        if products.is_empty() {
            info!("No reference product matches {}", activity.id);
            let picks = vec![Pick::none(none_reason)];
            return Ok(RerankOutcome::Matched(self.result(paraphrase, picks, &[])));
        }

        let candidates = self.catalog.factors_for_products(&products);
        let picks = self.select_factors(&mut session, activity, &description, &candidates)?;
        Ok(RerankOutcome::Matched(self.result(paraphrase, picks, &candidates)))
    }
}

fn non_empty(records: &[Record]) -> Result<(), ContractError> {
    if records.is_empty() {
        return Err(ContractError::Validation(
            "the list is empty; return at least one dictionary".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Embedder;
    use crate::llm::ReasoningClient;
    use crate::normalize::TextNormalizer;
    use crate::rank::Retriever;
    use crate::rerank::testing::{matrix, KeywordEmbedder, ScriptedCompleter};
    use std::sync::Arc;

    fn factor(id: &str, name: &str, product: &str) -> ImpactFactor {
        ImpactFactor {
            id: id.into(),
            name: name.into(),
            reference_product: product.into(),
            product_info: String::new(),
        }
    }

    fn reranker(catalog: ProcessCatalog, replies: &[&str]) -> (ProcessReranker, Arc<ScriptedCompleter>) {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder {
            axes: vec![vec!["maize", "corn", "popcorn"], vec!["tomato"], vec!["grape"]],
        });
        let corpus = catalog.products().to_vec();
        let retriever = Retriever::new(embedder.clone(), matrix(embedder.as_ref(), &corpus), corpus)
            .unwrap();
        let stub = ScriptedCompleter::new(replies);
        let context = RerankContext {
            client: ReasoningClient::new(stub.clone()),
            retriever,
            normalizer: TextNormalizer::new(),
            paraphrase: false,
            normalize_query: true,
            retries: 2,
            top_k: 10,
        };
        (ProcessReranker::new(catalog, context), stub)
    }

    fn matched(outcome: RerankOutcome) -> MatchResult {
        match outcome {
            RerankOutcome::Matched(result) => result,
            RerankOutcome::NoMatch { reason } => panic!("unexpected no-match: {reason}"),
        }
    }

    #[test]
    fn popcorn_resolves_to_maize_grain() {
        let catalog = ProcessCatalog::new(vec![
            factor("a0", "market for maize grain", "maize grain"),
            factor("a1", "market for maize grain, organic", "maize grain, organic"),
            factor("a2", "market for tomato, fresh grade", "tomato, fresh grade"),
        ])
        .unwrap();
        let (reranker, stub) = reranker(
            catalog,
            &[
                "[{'justification': 'Popcorn is popped maize.', 'reference_product': 'maize grain', 'index': 0}]",
                "[{'justification': 'Popcorn is made from maize grain.', 'index': 0, 'impact_factor_name': 'market for maize grain'}]",
            ],
        );

        let shortlist = reranker.context.shortlist("popped popcorn").unwrap();
        let order: Vec<usize> = shortlist.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(shortlist[1].cosine_score > shortlist[2].cosine_score);

        let activity = ActivityRecord::from_text(0, "item", "popped popcorn");
        let result = matched(reranker.rerank(&activity).unwrap());
        assert_eq!(result.picks.len(), 1);
        let best = result.best().unwrap();
        assert_eq!(best.index, Some(0));
        assert_eq!(best.label.as_deref(), Some("market for maize grain"));
        assert!(!best.justification.is_empty());
        assert_eq!(result.details[0], ("impact_factor_name".into(), "market for maize grain".into()));
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn blank_activity_is_no_match_without_model_calls() {
        let catalog =
            ProcessCatalog::new(vec![factor("g1", "market for grape", "grape")]).unwrap();
        let (reranker, stub) = reranker(catalog, &[]);

        let activity = ActivityRecord::from_text(0, "item", "   ");
        let outcome = reranker.rerank(&activity).unwrap();
        assert!(matches!(outcome, RerankOutcome::NoMatch { reason } if reason == "empty activity text"));
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn out_of_range_index_is_retried_once() {
        let catalog = ProcessCatalog::new(vec![
            factor("g1", "grape production, table grape, irrigated", "grape"),
            factor("g2", "market for grape", "grape"),
        ])
        .unwrap();
        let (reranker, stub) = reranker(
            catalog,
            &[
                "[{'justification': 'Grapes.', 'reference_product': 'grape', 'index': 0}]",
                "[{'justification': 'Wrong.', 'index': 42, 'impact_factor_name': 'grape juice'}]",
                "[{'justification': 'Production covers table grapes.', 'index': 0, 'impact_factor_name': 'grape production, table grape, irrigated'}]",
            ],
        );

        let activity = ActivityRecord::from_text(0, "item", "table grape");
        let result = matched(reranker.rerank(&activity).unwrap());
        assert_eq!(stub.calls(), 3);
        let retry = stub.prompts.lock().unwrap()[2].clone();
        assert!(retry.contains("index 42 is not one of the offered candidates"));

        // The market activity outranks the production activity the model chose.
        assert_eq!(result.picks[0].label.as_deref(), Some("market for grape"));
        assert_eq!(result.picks[0].code.as_deref(), Some("g2"));
        assert_eq!(result.picks[1].index, Some(0));
        assert_eq!(result.alternatives.len(), 2);
    }

    #[test]
    fn no_exact_match_yields_single_sentinel() {
        let catalog = ProcessCatalog::new(vec![
            factor("t1", "market for tomato, fresh grade", "tomato, fresh grade"),
            factor("m1", "market for maize grain", "maize grain"),
        ])
        .unwrap();
        let (reranker, _) = reranker(
            catalog,
            &[
                "[{'justification': 'Salsa has tomato.', 'reference_product': 'tomato, fresh grade', 'index': 0}]",
                "[{'justification': 'No factor covers every ingredient.', 'index': None, 'impact_factor_name': None}, {'justification': 'Same.', 'index': None, 'impact_factor_name': None}]",
            ],
        );

        let activity = ActivityRecord::from_text(0, "item", "hot salsa");
        let result = matched(reranker.rerank(&activity).unwrap());
        assert_eq!(result.picks.len(), 1);
        assert!(result.picks[0].is_none());
        assert!(result.details.iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn empty_stage_one_writes_sentinel_without_second_call() {
        let catalog =
            ProcessCatalog::new(vec![factor("t1", "market for tomato", "tomato")]).unwrap();
        let (reranker, stub) = reranker(
            catalog,
            &["[{'justification': 'Nothing matches rapini.', 'reference_product': '', 'index': ''}]"],
        );

        let activity = ActivityRecord::from_text(0, "item", "rapini");
        let result = matched(reranker.rerank(&activity).unwrap());
        assert_eq!(stub.calls(), 1);
        assert!(result.picks[0].is_none());
        assert_eq!(result.justification(), "Nothing matches rapini.");
    }

    #[test]
    fn exhausted_retries_propagate() {
        let catalog =
            ProcessCatalog::new(vec![factor("t1", "market for tomato", "tomato")]).unwrap();
        let (reranker, stub) = reranker(catalog, &["not a list", "still not", "nope"]);
        let activity = ActivityRecord::from_text(0, "item", "tomato");
        let err = reranker.rerank(&activity).unwrap_err();
        assert!(format!("{err:#}").contains("Reference product selection failed"));
        assert_eq!(stub.calls(), 3);
    }
}
