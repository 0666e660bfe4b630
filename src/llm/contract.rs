//! Output contracts for model responses and the errors they raise.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// One structured record from a list-of-records response.
pub type Record = Map<String, Value>;

/// Caller-supplied check run on every successfully parsed response.
pub type Validator<'a> = &'a dyn Fn(&[Record]) -> Result<(), ContractError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContract {
    PlainText,
    /// A literal list of mappings, parsed leniently.
    StructuredList,
}

/// Recoverable: fed back into the next attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("the response was empty")]
    Empty,
    #[error("the response is not a list of records: {0}")]
    Parse(String),
    #[error("the response failed validation: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AskError {
    #[error("no acceptable response after {attempts} attempts; last error: {last}")]
    Exhausted { attempts: usize, last: ContractError, raw: String },
}

impl AskError {
    pub fn raw(&self) -> &str {
        match self {
            AskError::Exhausted { raw, .. } => raw,
        }
    }
}

/// Every record must carry exactly `keys`, no more and no fewer.
pub fn require_exact_keys(records: &[Record], keys: &[&str]) -> Result<(), ContractError> {
    let want: BTreeSet<&str> = keys.iter().copied().collect();
    for (i, record) in records.iter().enumerate() {
        let have: BTreeSet<&str> = record.keys().map(String::as_str).collect();
        if have != want {
            return Err(ContractError::Validation(format!(
                "record {i} has keys {:?}, expected exactly {:?}",
                have, want
            )));
        }
    }
    Ok(())
}

/// Read an integer index. `None`, `null`, `""` and `"None"` mean no selection.
pub fn record_index(record: &Record, key: &str) -> Result<Option<usize>, ContractError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(Some(v as usize)),
            None => match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
                _ => Err(ContractError::Validation(format!("'{key}' is not a valid index: {n}"))),
            },
        },
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "None" || trimmed.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            trimmed.parse::<usize>().map(Some).map_err(|_| {
                ContractError::Validation(format!("'{key}' is not a valid index: '{s}'"))
            })
        }
        Some(other) => {
            Err(ContractError::Validation(format!("'{key}' is not a valid index: {other}")))
        }
    }
}

/// Every non-null index under `key` must be one of `offered`.
pub fn validate_indices(
    records: &[Record],
    key: &str,
    offered: &[usize],
) -> Result<(), ContractError> {
    for record in records {
        if let Some(index) = record_index(record, key)? {
            if !offered.contains(&index) {
                return Err(ContractError::Validation(format!(
                    "index {index} is not one of the offered candidates {:?}",
                    offered
                )));
            }
        }
    }
    Ok(())
}

/// String value of `key`, treating null and `"None"` as absent.
pub fn record_str(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if s.trim().is_empty() || s.trim() == "None" => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// NAICS-style code as a string whether the model sent it as a number or text.
pub fn record_code(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        _ => record_str(record, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn exact_keys_rejects_missing_and_extra() {
        let ok = record(json!({"index": 1, "justification": "x"}));
        assert!(require_exact_keys(&[ok.clone()], &["index", "justification"]).is_ok());

        let extra = record(json!({"index": 1, "justification": "x", "score": 2}));
        assert!(require_exact_keys(&[ok.clone(), extra], &["index", "justification"]).is_err());

        let missing = record(json!({"index": 1}));
        let err = require_exact_keys(&[missing], &["index", "justification"]).unwrap_err();
        assert!(matches!(err, ContractError::Validation(msg) if msg.contains("record 0")));
    }

    #[test]
    fn index_accepts_null_forms() {
        for value in [json!(null), json!(""), json!("None"), json!(" null ")] {
            assert_eq!(record_index(&record(json!({ "index": value })), "index"), Ok(None));
        }
        assert_eq!(record_index(&record(json!({"index": "7"})), "index"), Ok(Some(7)));
        assert_eq!(record_index(&record(json!({"index": 3.0})), "index"), Ok(Some(3)));
        assert!(record_index(&record(json!({"index": -1})), "index").is_err());
        assert!(record_index(&record(json!({"index": "seven"})), "index").is_err());
    }

    #[test]
    fn indices_must_be_offered() {
        let records = vec![record(json!({"index": 4})), record(json!({"index": null}))];
        assert!(validate_indices(&records, "index", &[4, 9]).is_ok());
        let err = validate_indices(&records, "index", &[9]).unwrap_err();
        assert!(err.to_string().contains("index 4"));
    }

    #[test]
    fn codes_normalize_numbers_and_strings() {
        assert_eq!(record_code(&record(json!({"c": 541513})), "c").as_deref(), Some("541513"));
        assert_eq!(record_code(&record(json!({"c": 541513.0})), "c").as_deref(), Some("541513"));
        assert_eq!(record_code(&record(json!({"c": " 334111 "})), "c").as_deref(), Some("334111"));
        assert_eq!(record_code(&record(json!({"c": null})), "c"), None);
    }

    #[test]
    fn exhausted_carries_raw_text() {
        let err = AskError::Exhausted {
            attempts: 3,
            last: ContractError::Parse("no list literal found at byte 0".into()),
            raw: "sorry".into(),
        };
        assert_eq!(err.raw(), "sorry");
        assert!(err.to_string().contains("3 attempts"));
    }
}
