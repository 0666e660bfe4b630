//! Stable content hashes for activity ids and cache keys

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Identifier for an activity row: a hash of its fields serialized as JSON with
/// sorted keys, so the same fields always produce the same id.
pub fn content_id(fields: &[(String, String)]) -> String {
    // Duplicate column names keep the last value, like a JSON object would.
    let canonical: BTreeMap<&str, Value> =
        fields.iter().map(|(k, v)| (k.as_str(), Value::String(v.clone()))).collect();
    let serialized =
        serde_json::to_string(&canonical).expect("a map of strings always serializes to JSON");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())[..22].to_string()
}

/// Cache key for an embedded corpus: hash of the model id joined with the
/// canonical JSON serialization of the corpus texts.
pub fn corpus_cache_key(model_id: &str, corpus: &[String]) -> String {
    let serialized =
        serde_json::to_string(corpus).expect("a list of strings always serializes to JSON");
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update("+");
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{content_id, corpus_cache_key};

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn content_id_ignores_field_order() {
        let a = content_id(&fields(&[("name", "grape"), ("qty", "2")]));
        let b = content_id(&fields(&[("qty", "2"), ("name", "grape")]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 22);
    }

    #[test]
    fn content_id_separates_rows_with_unusual_text() {
        let a = content_id(&fields(&[("name", "\u{0}\u{1f600}\"")]));
        let b = content_id(&fields(&[("name", "\u{1}")]));
        let empty = content_id(&[]);
        assert_ne!(a, b);
        assert_ne!(a, empty);
        assert_ne!(b, empty);
    }

    #[test]
    fn content_id_changes_with_values() {
        let a = content_id(&fields(&[("name", "grape")]));
        let b = content_id(&fields(&[("name", "grapes")]));
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_depends_on_model_and_corpus() {
        let corpus = vec!["maize grain".to_string(), "tomato".to_string()];
        let a = corpus_cache_key("model-a", &corpus);
        let b = corpus_cache_key("model-b", &corpus);
        let c = corpus_cache_key("model-a", &corpus[..1]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
