//! Config file loading

use crate::domain::RunConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Section name honored when the settings are nested inside a larger file.
const SECTION: &str = "eifmap";

const CANDIDATES: [&str; 6] =
    ["eifmap.toml", ".eifmap.toml", "eifmap.yml", ".eifmap.yml", "eifmap.yaml", ".eifmap.yaml"];

/// Load the run configuration from `config_path`, or from the first candidate
/// file found in `dir`. Parse errors in an auto-discovered file are logged and
/// defaults are used instead; an explicitly given file must parse.
pub fn load_config(dir: &Path, config_path: Option<&Path>) -> Result<RunConfig> {
    let config_path_provided = config_path.is_some();

    let discovered = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(dir),
    };

    let Some(config_file) = discovered else {
        return Ok(RunConfig::default());
    };

    let content = fs::read_to_string(&config_file)
        .with_context(|| format!("Failed reading config file: {}", config_file.display()))?;

    let ext = config_file.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "toml" => parse_toml_config(&content, &config_file),
        "yaml" | "yml" => parse_yaml_config(&content, &config_file),
        other => Err(anyhow::anyhow!(
            "Unsupported config extension '.{}' for file {}",
            other,
            config_file.display()
        )),
    };

    match parsed {
        Ok(cfg) => {
            tracing::debug!("Loaded config from {}", config_file.display());
            Ok(cfg)
        }
        Err(e) if config_path_provided => Err(e),
        Err(e) => {
            tracing::warn!(
                "Ignoring auto-discovered config {}: {:#}",
                config_file.display(),
                e
            );
            Ok(RunConfig::default())
        }
    }
}

/// Parse TOML config, supporting a nested `[eifmap]` section.
fn parse_toml_config(content: &str, config_file: &Path) -> Result<RunConfig> {
    let raw: toml::Value = toml::from_str(content)
        .with_context(|| format!("Invalid TOML syntax: {}", config_file.display()))?;

    let config_val = match raw.get(SECTION) {
        Some(nested) => nested.clone(),
        None => raw,
    };

    config_val.try_into().with_context(|| format!("Invalid TOML config: {}", config_file.display()))
}

/// Parse YAML config, supporting a nested `eifmap:` mapping.
fn parse_yaml_config(content: &str, config_file: &Path) -> Result<RunConfig> {
    let raw: serde_yaml::Value = serde_yaml::from_str(content)
        .with_context(|| format!("Invalid YAML syntax: {}", config_file.display()))?;

    // An empty file parses as null; treat it as "no settings".
    let config_val = match raw.get(SECTION) {
        Some(nested) => nested.clone(),
        None if raw.is_null() => serde_yaml::Value::Mapping(Default::default()),
        None => raw,
    };

    serde_yaml::from_value(config_val)
        .with_context(|| format!("Invalid YAML config: {}", config_file.display()))
}

fn discover_config(dir: &Path) -> Option<PathBuf> {
    CANDIDATES.iter().map(|candidate| dir.join(candidate)).find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmbeddingBackend, TaskKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_defaults_when_missing() {
        let tmp = TempDir::new().expect("tmp");
        let cfg = load_config(tmp.path(), None).expect("config");
        assert!(cfg.activity_file.is_none());
        assert_eq!(cfg.task, TaskKind::Process);
        assert_eq!(cfg.flush_every, 10);
    }

    #[test]
    fn test_load_toml_config() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(
            tmp.path().join("eifmap.toml"),
            "task = 'eio'\nretries = 4\nembedding_backend = 'hashing'\nactivity_columns = 'name, vendor'\n",
        )
        .expect("write");

        let cfg = load_config(tmp.path(), None).expect("config");
        assert_eq!(cfg.task, TaskKind::Eio);
        assert_eq!(cfg.retries, 4);
        assert_eq!(cfg.embedding_backend, EmbeddingBackend::Hashing);
        assert_eq!(cfg.activity_columns, vec!["name", "vendor"]);
    }

    #[test]
    fn test_nested_toml_section() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("project.toml");
        fs::write(&path, "[other]\nx = 1\n\n[eifmap]\ntop_k = 7\nparaphrase = false\n")
            .expect("write");

        let cfg = load_config(tmp.path(), Some(&path)).expect("config");
        assert_eq!(cfg.top_k, Some(7));
        assert!(!cfg.paraphrase);
    }

    #[test]
    fn test_load_yaml_config() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(
            tmp.path().join(".eifmap.yaml"),
            "eifmap:\n  llm_backend: openai\n  llm_model: gpt-4o-mini\n  end_index: 25\n",
        )
        .expect("write");

        let cfg = load_config(tmp.path(), None).expect("config");
        assert_eq!(cfg.llm_model, "gpt-4o-mini");
        assert_eq!(cfg.end_index, Some(25));
    }

    #[test]
    fn test_empty_yaml_is_defaults() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("eifmap.yml");
        fs::write(&path, "").expect("write");
        let cfg = load_config(tmp.path(), Some(&path)).expect("config");
        assert_eq!(cfg.retries, RunConfig::default().retries);
    }

    #[test]
    fn test_explicit_config_invalid_type_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "retries = 'many'\n").expect("write");

        let result = load_config(tmp.path(), Some(&path));
        assert!(result.is_err(), "explicit config with invalid type should return Err");
    }

    #[test]
    fn test_explicit_config_unknown_task_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "task = 'naics'\n").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn test_explicit_unsupported_extension_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("eifmap.ini");
        fs::write(&path, "retries=1").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn test_auto_discovered_invalid_type_returns_default() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("eifmap.toml"), "flush_every = [1, 2]\n").expect("write");

        let cfg = load_config(tmp.path(), None).expect("should not error on auto-discovery");
        assert_eq!(cfg.flush_every, RunConfig::default().flush_every);
    }

    #[test]
    fn test_toml_wins_over_yaml_in_discovery_order() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("eifmap.toml"), "retries = 5\n").expect("write");
        fs::write(tmp.path().join("eifmap.yml"), "retries: 9\n").expect("write");

        let cfg = load_config(tmp.path(), None).expect("config");
        assert_eq!(cfg.retries, 5);
    }
}
