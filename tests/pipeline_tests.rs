//! End-to-end batch runs over stub model backends

use anyhow::Result;
use eifmap::batch::{load_checkpoint, BatchRunner, ConsistencyError, OutputPaths, RunState};
use eifmap::domain::{ActivityRecord, ImpactFactor, ProcessCatalog, ReferenceCatalog};
use eifmap::embed::{EmbeddingCache, HashingEmbedder};
use eifmap::llm::{ChatMessage, Completer, ReasoningClient};
use eifmap::normalize::TextNormalizer;
use eifmap::rank::Retriever;
use eifmap::rerank::{build_reranker, RerankContext};
use serde_json::Value;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers each reranking stage with a fixed record and counts calls.
#[derive(Default)]
struct StageStub {
    calls: AtomicUsize,
}

impl Completer for StageStub {
    fn model_id(&self) -> &str {
        "stage-stub"
    }

    fn complete(&self, _system: &str, history: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = history.last().map(|m| m.content.as_str()).unwrap_or("");
        let reply = if prompt.contains("Impact factor list:") {
            "[{'justification': 'grapes are sold through the grape market', 'index': 0, \
              'impact_factor_name': 'market for grape'}]"
        } else if prompt.contains("Reference products:") {
            "```python\n[{'justification': 'the item is a grape', 'reference_product': 'grape', \
              'index': 0}]\n```"
        } else {
            "unexpected prompt"
        };
        Ok(reply.to_string())
    }
}

fn factor(id: &str, name: &str, product: &str) -> ImpactFactor {
    ImpactFactor {
        id: id.to_string(),
        name: name.to_string(),
        reference_product: product.to_string(),
        product_info: String::new(),
    }
}

fn runner(dir: &TempDir, stub: Arc<StageStub>) -> BatchRunner {
    let catalog = ProcessCatalog::new(vec![
        factor("g-1", "market for grape", "grape"),
        factor("g-2", "grape production", "grape"),
        factor("m-1", "market for maize grain", "maize grain"),
    ])
    .unwrap();
    let catalog = ReferenceCatalog::Process(catalog);

    let cache = EmbeddingCache::new(dir.path().join("cache"));
    let retriever =
        Retriever::build(catalog.corpus().to_vec(), Arc::new(HashingEmbedder::default()), &cache)
            .unwrap();
    let context = RerankContext {
        client: ReasoningClient::new(stub),
        retriever,
        normalizer: TextNormalizer::new(),
        paraphrase: false,
        normalize_query: true,
        retries: 2,
        top_k: 10,
    };
    let paths = OutputPaths::from_stem(&dir.path().join("out").join("preds"));
    BatchRunner::new(build_reranker(catalog, context), paths)
}

fn activities() -> Vec<ActivityRecord> {
    ["table grape", "red grape, seedless"]
        .iter()
        .enumerate()
        .map(|(i, text)| ActivityRecord::from_text(i, "Ingredient", text))
        .collect()
}

#[test]
fn rerun_is_idempotent_and_makes_no_model_calls() {
    let tmp = TempDir::new().unwrap();
    let items = activities();

    let stub = Arc::new(StageStub::default());
    let mut first = runner(&tmp, stub.clone());
    let summary = first.run(&items).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 4);

    let records = fs::read_to_string(&first.paths().records).unwrap();
    let summary_csv = fs::read_to_string(&first.paths().summary).unwrap();
    assert_eq!(records.lines().count(), 2);
    assert_eq!(summary_csv.lines().count(), 3);

    let form: Value = serde_json::from_str(records.lines().next().unwrap()).unwrap();
    assert_eq!(form["formConfig"]["fields"][0]["id"], items[0].id.as_str());
    assert_eq!(form["formConfig"]["fields"][0]["options"][0]["value"], "g-1");
    assert!(form["source"].as_str().unwrap().contains("*AI top choice:* market for grape"));

    let stub = Arc::new(StageStub::default());
    let mut second = runner(&tmp, stub.clone());
    let summary = second.run(&items).unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.state(), RunState::Done);
    similar_asserts::assert_eq!(fs::read_to_string(&second.paths().records).unwrap(), records);
    similar_asserts::assert_eq!(fs::read_to_string(&second.paths().summary).unwrap(), summary_csv);
}

#[test]
fn summary_rows_carry_the_chosen_factor() {
    let tmp = TempDir::new().unwrap();
    let mut runner = runner(&tmp, Arc::new(StageStub::default()));
    runner.run(&activities()[..1]).unwrap();

    let mut reader = csv::Reader::from_path(&runner.paths().summary).unwrap();
    let headers = reader.headers().unwrap().clone();
    let row = reader.records().next().unwrap().unwrap();
    let get = |name: &str| {
        row.get(headers.iter().position(|h| h == name).unwrap()).unwrap().to_string()
    };
    assert_eq!(get("impact_factor_name"), "market for grape");
    assert_eq!(get("impact_factor_id"), "g-1");
    assert_eq!(get("reference_product"), "grape");
    assert_eq!(get("mapping_strategy"), "EIFMap v1.2+re-ranker");
    assert_eq!(get("Ingredient"), "table grape");
}

#[test]
fn mismatched_logs_abort_before_any_work() {
    let tmp = TempDir::new().unwrap();
    let items = activities();
    runner(&tmp, Arc::new(StageStub::default())).run(&items[..1]).unwrap();

    let paths = OutputPaths::from_stem(&tmp.path().join("out").join("preds"));
    let first_line = fs::read_to_string(&paths.records).unwrap();
    fs::write(&paths.records, format!("{first_line}{first_line}")).unwrap();

    let stub = Arc::new(StageStub::default());
    let mut runner = runner(&tmp, stub.clone());
    let err = runner.run(&items).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConsistencyError>(),
        Some(&ConsistencyError::LengthMismatch { records: 2, summary: 1 })
    );
    assert_eq!(runner.state(), RunState::Aborted);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    assert!(load_checkpoint(&paths).is_err());
}
