//! Core data types shared across the mapping pipeline.

pub mod activity;
pub mod catalog;
pub mod config;

pub use activity::ActivityRecord;
pub use catalog::{EioCatalog, ImpactFactor, NaicsEntry, ProcessCatalog, ReferenceCatalog};
pub use config::{EmbeddingBackend, LlmBackend, RunConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which reference universe an activity is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Process-level LCA impact factors (ecoinvent style activities).
    #[default]
    Process,
    /// Environmentally-extended input-output sectors keyed by NAICS code.
    Eio,
}

impl TaskKind {
    /// Retrieval shortlist size. Industry descriptions are coarser, so the net is wider.
    pub fn default_top_k(self) -> usize {
        match self {
            TaskKind::Process => 10,
            TaskKind::Eio => 20,
        }
    }

    pub fn default_dataset_label(self) -> &'static str {
        match self {
            TaskKind::Process => "ecoinvent, cut-off system; v3.9.1; 2022; www.ecoinvent.org",
            TaskKind::Eio => "USEEIO v2.0, SupplyChainGHGEmissionFactors_v1.2",
        }
    }

    /// Reference columns copied into the tabular summary for the chosen match.
    pub fn summary_keys(self) -> &'static [&'static str] {
        match self {
            TaskKind::Process => &["impact_factor_name", "impact_factor_id", "reference_product"],
            TaskKind::Eio => &["naics_code", "naics_title", "co2e_per_dollar", "bea_code"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Process => "process",
            TaskKind::Eio => "eio",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(TaskKind::Process),
            "eio" | "eeio" => Ok(TaskKind::Eio),
            other => Err(format!("Invalid task kind '{other}' (expected 'process' or 'eio')")),
        }
    }
}

/// One retrieval hit: a position in the reference corpus and its cosine score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub index: usize,
    pub text: String,
    pub cosine_score: f64,
}

/// A single selected (or explicitly unmatched) reference entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    /// Catalog index of the selection. `None` is the no-match sentinel.
    pub index: Option<usize>,
    /// Human-readable category label (impact factor name or NAICS title).
    pub label: Option<String>,
    /// Stable category identifier (impact factor id or NAICS code).
    pub code: Option<String>,
    pub justification: String,
}

impl Pick {
    pub fn none(justification: impl Into<String>) -> Self {
        Self { index: None, label: None, code: None, justification: justification.into() }
    }

    pub fn is_none(&self) -> bool {
        self.index.is_none()
    }
}

/// A selectable alternative shown to a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOption {
    pub label: String,
    pub value: String,
}

impl ReviewOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

/// Everything the batch driver needs to persist for one matched activity.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub kind: TaskKind,
    /// Plain-language rewrite of the activity, when paraphrasing ran.
    pub paraphrase: Option<String>,
    /// Ordered picks, best first. Process matches keep at most two.
    pub picks: Vec<Pick>,
    /// Reference fields of the best pick, in `TaskKind::summary_keys` order.
    /// Values are empty strings for a no-match sentinel.
    pub details: Vec<(String, String)>,
    /// Candidate alternatives offered for review, excluding sentinels.
    pub alternatives: Vec<ReviewOption>,
}

impl MatchResult {
    pub fn best(&self) -> Option<&Pick> {
        self.picks.first()
    }

    pub fn justification(&self) -> &str {
        self.best().map(|p| p.justification.as_str()).unwrap_or("")
    }
}
