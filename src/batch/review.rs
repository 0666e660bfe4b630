//! Review forms: one structured-output line per matched activity.
//!
//! A reviewer sees the activity, the model's choices with justifications, and
//! a radio list of the offered candidates plus fixed escape options.

use crate::domain::{ActivityRecord, MatchResult, Pick, ReviewOption, TaskKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

const JUSTIFICATION_LABEL: &str = "If you made a different choice than the top recommendation \
given by the AI, or if you want to edit the AI justification, provide your justification below.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewForm {
    pub source: String,
    pub source_type: String,
    pub form_title: String,
    pub task_description: String,
    pub form_config_mode: String,
    pub form_config: FormConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FormOption>>,
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormOption {
    pub label: String,
    pub value: String,
}

impl From<&ReviewOption> for FormOption {
    fn from(option: &ReviewOption) -> Self {
        Self { label: option.label.clone(), value: option.value.clone() }
    }
}

impl ReviewForm {
    /// Build the form for `result`; the choice field carries the activity id.
    pub fn new(activity: &ActivityRecord, result: &MatchResult) -> Self {
        let text = activity.text();
        let (title, description, choice_label, source) = match result.kind {
            TaskKind::Process => (
                "Match input activity to process",
                "Activity to Process EIF Mapping",
                "Which of the following process best describes the activity?",
                process_source(&text, &result.picks),
            ),
            TaskKind::Eio => (
                "Match input activity to economic sector",
                "Activity to EIO EIF Mapping",
                "Which of the following economic categories best describes the activity?",
                eio_source(&text, result.paraphrase.as_deref().unwrap_or(&text), &result.picks),
            ),
        };

        let mut options: Vec<FormOption> = result.alternatives.iter().map(FormOption::from).collect();
        options.extend(sentinels(result.kind));

        Self {
            source,
            source_type: "text".to_string(),
            form_title: title.to_string(),
            task_description: description.to_string(),
            form_config_mode: "inline".to_string(),
            form_config: FormConfig {
                fields: vec![
                    FormField {
                        id: activity.id.clone(),
                        label: choice_label.to_string(),
                        field_type: "radio".to_string(),
                        options: Some(options),
                        is_required: true,
                    },
                    FormField {
                        id: "justification".to_string(),
                        label: JUSTIFICATION_LABEL.to_string(),
                        field_type: "text".to_string(),
                        options: None,
                        is_required: false,
                    },
                    FormField {
                        id: "comment".to_string(),
                        label: "Optional comments or notes".to_string(),
                        field_type: "text".to_string(),
                        options: None,
                        is_required: false,
                    },
                ],
            },
        }
    }

    /// Activity id stored on the choice field.
    pub fn activity_id(&self) -> Option<&str> {
        self.form_config.fields.first().map(|f| f.id.as_str())
    }
}

fn sentinels(kind: TaskKind) -> Vec<FormOption> {
    let pairs: &[(&str, &str)] = match kind {
        TaskKind::Process => &[
            ("None of the impact factors match", "0"),
            ("Not sure", "-1"),
            ("Activity text unclear for selection", "-3"),
        ],
        TaskKind::Eio => &[
            ("Not sure", "-1"),
            ("EIF options are inappropriate, no match", "-2"),
            ("Activity description is unclear to select an EIF", "-3"),
        ],
    };
    pairs
        .iter()
        .map(|(label, value)| FormOption { label: label.to_string(), value: value.to_string() })
        .collect()
}

fn strip_punctuation(text: &str) -> String {
    PUNCTUATION.replace_all(text, "").into_owned()
}

fn pick_label(pick: &Pick) -> &str {
    pick.label.as_deref().unwrap_or("None")
}

fn process_source(text: &str, picks: &[Pick]) -> String {
    let mut source = format!("*Given description:* {}\n", strip_punctuation(text));
    if let Some(top) = picks.first() {
        source.push_str(&format!("\n*AI top choice:* {}\n", pick_label(top)));
        source.push_str(&format!("\nJustification: {}", top.justification));
    }
    if let Some(next) = picks.get(1) {
        source.push_str(&format!("\n\n*AI next choice:* {}\n", pick_label(next)));
        source.push_str(&format!("\nJustification: {}", next.justification));
    }
    source
}

fn eio_source(text: &str, paraphrase: &str, picks: &[Pick]) -> String {
    let mut source = format!("*Business Activity*: {}\n", strip_punctuation(text));
    source.push_str(&format!("*AI paraphrased description:* {paraphrase}\n\n"));
    for (heading, pick) in ["top", "second"].iter().zip(picks) {
        source.push_str(&format!(
            "*AI {} choice:* {} ({})\n",
            heading,
            pick_label(pick),
            pick.code.as_deref().unwrap_or("")
        ));
        source.push_str(&format!("Justification: {}\n\n", pick.justification));
    }
    source
}
