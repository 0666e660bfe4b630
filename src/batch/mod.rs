//! Batch driver: rerank every activity once and checkpoint each result.
//!
//! A run moves through `Init -> LoadingState -> Processing -> Done`, or ends in
//! `Aborted` when the checkpoint is inconsistent or a process match fails.
//! Activities already in the checkpoint are skipped, so re-running a finished
//! batch does no model calls at all.

pub mod checkpoint;
pub mod review;

pub use checkpoint::{load_checkpoint, Checkpoint, CheckpointWriter, ConsistencyError, OutputPaths};
pub use review::ReviewForm;

use crate::domain::{ActivityRecord, MatchResult};
use crate::rerank::{RerankOutcome, Reranker};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

/// Written into every summary row to identify how the mapping was produced.
pub const MAPPING_STRATEGY: &str = "EIFMap v1.2+re-ranker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    LoadingState,
    Processing,
    Done,
    Aborted,
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Newly mapped and written this run.
    pub processed: usize,
    /// Already in the checkpoint.
    pub skipped: usize,
    /// Industry-code activities with no usable match; nothing was written.
    pub no_match: usize,
}

pub struct BatchRunner {
    reranker: Box<dyn Reranker>,
    paths: OutputPaths,
    dataset_label: String,
    flush_every: usize,
    show_progress: bool,
    state: RunState,
}

impl BatchRunner {
    pub fn new(reranker: Box<dyn Reranker>, paths: OutputPaths) -> Self {
        let dataset_label = reranker.kind().default_dataset_label().to_string();
        Self {
            reranker,
            paths,
            dataset_label,
            flush_every: 10,
            show_progress: false,
            state: RunState::Init,
        }
    }

    pub fn dataset_label(mut self, label: impl Into<String>) -> Self {
        self.dataset_label = label.into();
        self
    }

    pub fn flush_every(mut self, every: usize) -> Self {
        self.flush_every = every.max(1);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    fn enter(&mut self, state: RunState) {
        debug!("Batch state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    pub fn run(&mut self, activities: &[ActivityRecord]) -> Result<BatchSummary> {
        self.enter(RunState::LoadingState);
        let mut checkpoint = match load_checkpoint(&self.paths) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                self.enter(RunState::Aborted);
                return Err(err);
            }
        };
        if !checkpoint.is_empty() {
            info!(
                "Resuming: {} activities already mapped in {}",
                checkpoint.len(),
                self.paths.records.display()
            );
        }
        let mut writer = match CheckpointWriter::open(&self.paths, self.flush_every) {
            Ok(writer) => writer,
            Err(err) => {
                self.enter(RunState::Aborted);
                return Err(err);
            }
        };

        self.enter(RunState::Processing);
        let progress = progress_bar(activities.len(), self.show_progress);
        let mut summary = BatchSummary { total: activities.len(), ..BatchSummary::default() };

        for (n, activity) in activities.iter().enumerate() {
            info!("({}/{}) {}", n + 1, activities.len(), activity.id);
            if checkpoint.contains(&activity.id) {
                debug!("Already mapped, skipping {}", activity.id);
                summary.skipped += 1;
                progress.inc(1);
                continue;
            }

            let outcome = match self.reranker.rerank(activity) {
                Ok(outcome) => outcome,
                Err(err) => {
                    progress.abandon();
                    let flushed = writer.flush();
                    self.enter(RunState::Aborted);
                    flushed?;
                    return Err(err.context(format!(
                        "Mapping failed for activity {} at position {}",
                        activity.id, activity.position
                    )));
                }
            };

            match outcome {
                RerankOutcome::Matched(result) => {
                    let form = ReviewForm::new(activity, &result);
                    let row = summary_row(activity, &result, &self.dataset_label, &today());
                    writer.append(&form, &row)?;
                    checkpoint.record(&activity.id);
                    summary.processed += 1;
                }
                RerankOutcome::NoMatch { reason } => {
                    warn!("Skipping {}: {}", activity.id, reason);
                    summary.no_match += 1;
                }
            }
            progress.set_message(format!(
                "{} mapped, {} skipped",
                summary.processed,
                summary.skipped + summary.no_match
            ));
            progress.inc(1);
        }

        writer.flush()?;
        progress.finish_and_clear();
        self.enter(RunState::Done);
        info!(
            "Mapped {} of {} activities ({} already done, {} without a match)",
            summary.processed, summary.total, summary.skipped, summary.no_match
        );
        Ok(summary)
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// One summary row: the input row, then the id, activity text, chosen
/// reference fields and provenance. Input columns that collide with the
/// appended names are dropped.
pub fn summary_row(
    activity: &ActivityRecord,
    result: &MatchResult,
    dataset_label: &str,
    date: &str,
) -> Vec<(String, String)> {
    let mut appended: Vec<(String, String)> = vec![
        (checkpoint::ID_COLUMN.to_string(), activity.id.clone()),
        ("activity".to_string(), activity.text()),
    ];
    appended.extend(result.details.iter().cloned());
    appended.push(("justification".to_string(), result.justification().to_string()));
    appended.push(("eif_dataset".to_string(), dataset_label.to_string()));
    appended.push(("mapping_strategy".to_string(), MAPPING_STRATEGY.to_string()));
    appended.push(("date".to_string(), date.to_string()));

    let mut row: Vec<(String, String)> = activity
        .row
        .iter()
        .filter(|(name, _)| !appended.iter().any(|(key, _)| key == name))
        .cloned()
        .collect();
    row.extend(appended);
    row
}
