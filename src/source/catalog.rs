//! Reference catalog files.

use crate::domain::{
    EioCatalog, ImpactFactor, NaicsEntry, ProcessCatalog, ReferenceCatalog, TaskKind,
};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Load the catalog for `kind` from a CSV file or a JSON array file.
pub fn load_reference_catalog(path: &Path, kind: TaskKind) -> Result<ReferenceCatalog> {
    let catalog = match kind {
        TaskKind::Process => ReferenceCatalog::Process(load_process_catalog(path)?),
        TaskKind::Eio => ReferenceCatalog::Eio(load_eio_catalog(path)?),
    };
    info!(
        "Loaded {} reference entries ({} searchable texts) from {}",
        catalog.len(),
        catalog.corpus().len(),
        path.display()
    );
    Ok(catalog)
}

pub fn load_process_catalog(path: &Path) -> Result<ProcessCatalog> {
    let rows: Vec<ImpactFactor> = read_rows(path, &["impact_factor_id"])?;
    ProcessCatalog::new(rows).with_context(|| format!("Invalid process catalog {}", path.display()))
}

pub fn load_eio_catalog(path: &Path) -> Result<EioCatalog> {
    let rows: Vec<NaicsEntry> = read_rows(path, &["naics_code", "bea_code"])?;
    EioCatalog::new(rows).with_context(|| format!("Invalid NAICS catalog {}", path.display()))
}

/// Deserialize every row. `code_fields` may hold bare numbers in JSON input and
/// are read as strings.
fn read_rows<T: DeserializeOwned>(path: &Path, code_fields: &[&str]) -> Result<Vec<T>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed reading catalog {}", path.display()))?;
        let raw: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("Catalog {} is not a JSON array", path.display()))?;
        return raw
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                stringify_codes(&mut row, code_fields);
                serde_json::from_value(row)
                    .with_context(|| format!("Invalid catalog row {} in {}", i, path.display()))
            })
            .collect();
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed reading catalog {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        // Header is line 1, so data row i sits on line i + 2.
        .map(|(i, row)| {
            row.with_context(|| {
                format!("Invalid catalog row at line {} of {}", i + 2, path.display())
            })
        })
        .collect()
}

fn stringify_codes(row: &mut Value, code_fields: &[&str]) {
    let Some(map) = row.as_object_mut() else {
        return;
    };
    for field in code_fields {
        let Some(Value::Number(n)) = map.get(*field) else {
            continue;
        };
        let code = n.to_string();
        map.insert(field.to_string(), Value::String(code));
    }
}
