//! Activity input files.

use crate::domain::ActivityRecord;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Which rows and columns of the activity file to classify.
#[derive(Debug, Clone, Default)]
pub struct ActivitySelection {
    /// Describing columns. Empty means every column.
    pub columns: Vec<String>,
    pub start: usize,
    /// Exclusive end; `None` runs to the last row.
    pub end: Option<usize>,
}

/// Read the activity CSV, drop exact duplicate rows, then slice `[start, end)`.
///
/// Empty cells become empty strings. Positions count rows after deduplication,
/// so the first returned record sits at `start`.
pub fn load_activities(path: &Path, selection: &ActivitySelection) -> Result<Vec<ActivityRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed reading activity file {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed reading header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let columns = resolve_columns(&headers, &selection.columns)
        .with_context(|| format!("Bad activity columns for {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("Invalid activity row at line {} of {}", i + 2, path.display())
        })?;
        let values: Vec<String> =
            (0..headers.len()).map(|c| record.get(c).unwrap_or("").to_string()).collect();
        if !seen.insert(values.clone()) {
            continue;
        }
        rows.push(values);
    }
    let unique = rows.len();

    let end = selection.end.unwrap_or(unique).min(unique);
    let start = selection.start.min(end);
    let records: Vec<ActivityRecord> = rows
        .into_iter()
        .enumerate()
        .skip(start)
        .take(end - start)
        .map(|(position, values)| {
            let row = headers.iter().cloned().zip(values).collect();
            ActivityRecord::new(position, row, &columns)
        })
        .collect();

    debug!("Activity columns: {:?}", columns);
    info!(
        "Loaded {} activities (rows {}..{} of {} unique) from {}",
        records.len(),
        start,
        end,
        unique,
        path.display()
    );
    Ok(records)
}

fn resolve_columns(headers: &[String], wanted: &[String]) -> Result<Vec<String>> {
    if wanted.is_empty() {
        return Ok(headers.to_vec());
    }
    for column in wanted {
        anyhow::ensure!(
            headers.contains(column),
            "column '{}' is not in the header {:?}",
            column,
            headers
        );
    }
    Ok(wanted.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("activities.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn duplicates_are_dropped_before_slicing() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "item,qty\ngrape,1\ngrape,1\npopcorn,2\ntomato,\nsalsa,4\n");

        let selection = ActivitySelection { start: 1, end: Some(3), ..Default::default() };
        let records = load_activities(&path, &selection).unwrap();
        let items: Vec<&str> = records.iter().map(|r| r.fields[0].1.as_str()).collect();
        assert_eq!(items, vec!["popcorn", "tomato"]);
        assert_eq!(records[0].position, 1);
        assert_eq!(records[1].row[1], ("qty".to_string(), String::new()));
    }

    #[test]
    fn named_columns_select_the_description() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "sku,item,vendor\n1,printer,HP\n");

        let selection = ActivitySelection {
            columns: vec!["item".into(), "vendor".into()],
            ..Default::default()
        };
        let records = load_activities(&path, &selection).unwrap();
        assert_eq!(records[0].text(), "item: printer\nvendor: HP");
        assert_eq!(records[0].row.len(), 3);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "item\ngrape\n");

        let selection = ActivitySelection { columns: vec!["name".into()], ..Default::default() };
        let err = load_activities(&path, &selection).unwrap_err();
        assert!(format!("{err:#}").contains("'name'"));
    }

    #[test]
    fn range_past_the_end_is_clamped() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "item\ngrape\npopcorn\n");

        let selection = ActivitySelection { start: 5, end: Some(50), ..Default::default() };
        assert!(load_activities(&path, &selection).unwrap().is_empty());
    }
}
