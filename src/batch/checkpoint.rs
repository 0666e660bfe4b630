//! On-disk checkpoint: a JSONL log of review forms and a CSV summary, kept in step.
//!
//! Both files are append-only. Each processed activity adds exactly one line
//! to each, so on startup the two must have the same length and agree on the
//! activity id at every position.

use super::review::ReviewForm;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Column of the summary that holds the activity id.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error(
        "checkpoint logs are out of step: {records} review records but {summary} summary rows"
    )]
    LengthMismatch { records: usize, summary: usize },
    #[error(
        "checkpoint logs disagree at row {row}: review record id '{record_id}', summary id '{summary_id}'"
    )]
    IdMismatch { row: usize, record_id: String, summary_id: String },
    #[error("row {row} of {log} has no activity id")]
    MissingId { row: usize, log: String },
}

/// The files of one run, all sharing the configured output stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub records: PathBuf,
    pub summary: PathBuf,
    pub log: PathBuf,
}

impl OutputPaths {
    pub fn from_stem(stem: &Path) -> Self {
        Self {
            records: with_suffix(stem, ".jsonl"),
            summary: with_suffix(stem, ".csv"),
            log: with_suffix(stem, ".log"),
        }
    }
}

// Appended rather than `with_extension` so stems like `run.v2` keep their dot.
fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Ids already present in both logs.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    ids: Vec<String>,
    lookup: HashSet<String>,
}

impl Checkpoint {
    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub(crate) fn record(&mut self, id: &str) {
        if self.lookup.insert(id.to_string()) {
            self.ids.push(id.to_string());
        }
    }
}

/// Read both logs and verify they agree. Missing files count as empty.
pub fn load_checkpoint(paths: &OutputPaths) -> Result<Checkpoint> {
    let record_ids = read_record_ids(&paths.records)?;
    let summary_ids = read_summary_ids(&paths.summary)?;

    if record_ids.len() != summary_ids.len() {
        return Err(ConsistencyError::LengthMismatch {
            records: record_ids.len(),
            summary: summary_ids.len(),
        }
        .into());
    }
    for (row, (record_id, summary_id)) in record_ids.iter().zip(&summary_ids).enumerate() {
        if record_id != summary_id {
            return Err(ConsistencyError::IdMismatch {
                row,
                record_id: record_id.clone(),
                summary_id: summary_id.clone(),
            }
            .into());
        }
    }

    let mut checkpoint = Checkpoint::default();
    for id in &record_ids {
        checkpoint.record(id);
    }
    debug!("Checkpoint holds {} processed activities", checkpoint.len());
    Ok(checkpoint)
}

fn read_record_ids(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed opening {}", path.display()))?;
    let mut ids = Vec::new();
    for (row, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Line {} of {} is not JSON", row + 1, path.display()))?;
        let id = value
            .pointer("/formConfig/fields/0/id")
            .and_then(Value::as_str)
            .ok_or_else(|| ConsistencyError::MissingId {
                row: ids.len(),
                log: path.display().to_string(),
            })?;
        ids.push(id.to_string());
    }
    Ok(ids)
}

fn read_summary_ids(path: &Path) -> Result<Vec<String>> {
    if !path.exists() || fs::metadata(path)?.len() == 0 {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed opening {}", path.display()))?;
    let id_column = reader
        .headers()
        .with_context(|| format!("Failed reading header of {}", path.display()))?
        .iter()
        .position(|h| h == ID_COLUMN);

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed reading {}", path.display()))?;
        let id = id_column.and_then(|c| record.get(c)).filter(|id| !id.is_empty()).ok_or_else(
            || ConsistencyError::MissingId { row: ids.len(), log: path.display().to_string() },
        )?;
        ids.push(id.to_string());
    }
    Ok(ids)
}

/// Appends one review record and one summary row per activity.
///
/// Rows are staged in memory as complete lines and reach disk only at a flush,
/// every `flush_every` activities, as whole writes to unbuffered files. A run
/// killed between flushes therefore leaves both logs at the last flush boundary.
pub struct CheckpointWriter {
    records: File,
    summary: File,
    header_written: bool,
    staged_records: Vec<u8>,
    staged_summary: Vec<u8>,
    pending: usize,
    flush_every: usize,
}

impl CheckpointWriter {
    pub fn open(paths: &OutputPaths, flush_every: usize) -> Result<Self> {
        if let Some(parent) = paths.records.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating output directory {}", parent.display()))?;
        }
        let records = open_append(&paths.records)?;
        let summary = open_append(&paths.summary)?;
        let header_written = summary.metadata()?.len() > 0;

        Ok(Self {
            records,
            summary,
            header_written,
            staged_records: Vec::new(),
            staged_summary: Vec::new(),
            pending: 0,
            flush_every: flush_every.max(1),
        })
    }

    /// Stage one activity's outputs. The header goes out with the first row of an empty summary.
    pub fn append(&mut self, form: &ReviewForm, summary_row: &[(String, String)]) -> Result<()> {
        let mut line = serde_json::to_vec(form).context("Failed encoding review record")?;
        line.push(b'\n');

        let mut rows = Vec::new();
        if !self.header_written {
            rows.extend(encode_csv_row(summary_row.iter().map(|(k, _)| k.as_str()))?);
        }
        rows.extend(encode_csv_row(summary_row.iter().map(|(_, v)| v.as_str()))?);

        self.staged_records.extend(line);
        self.staged_summary.extend(rows);
        self.header_written = true;

        self.pending += 1;
        if self.pending >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        self.records
            .write_all(&self.staged_records)
            .context("Failed writing review records")?;
        self.summary.write_all(&self.staged_summary).context("Failed writing summary")?;
        self.staged_records.clear();
        self.staged_summary.clear();
        self.pending = 0;
        Ok(())
    }

    /// Rows staged since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl Drop for CheckpointWriter {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("Dropping {} staged checkpoint rows: {err:#}", self.pending);
        }
    }
}

/// One CSV record with its line terminator.
fn encode_csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer.write_record(fields).context("Failed encoding summary row")?;
    writer.into_inner().map_err(|err| err.into_error()).context("Failed encoding summary row")
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed opening {} for append", path.display()))
}
