use std::collections::HashMap;

use tempfile::TempDir;

use super::*;
use crate::{adapters::Framework, Error, Result};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() -> Result<()> {
    let config = Config::default();
    assert_eq!(config.database, ".fixq/queue.db");
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.framework()?, None);
    assert!(config.repair.command.is_empty());
    config.validate()
}

#[test]
fn test_layer_overrides_only_present_keys() -> Result<()> {
    let layer: ConfigLayer = toml::from_str(
        r#"
        [retry]
        max_retries = 5

        [scan]
        framework = "pytest"
        "#,
    )?;
    let config = Config::default().merge(layer);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.framework()?, Some(Framework::Pytest));
    assert_eq!(config.database, ".fixq/queue.db");
    assert_eq!(config.scan.default_priority, 0);
    Ok(())
}

#[test]
fn test_unknown_keys_rejected() {
    let parsed: std::result::Result<ConfigLayer, _> = toml::from_str("retires = 3");
    assert!(parsed.is_err());
}

#[test]
fn test_env_overrides() -> Result<()> {
    let config = Config::default().apply_env(env(&[
        ("FIXQ_DATABASE", "/tmp/q.db"),
        ("FIXQ_MAX_RETRIES", "7"),
        ("FIXQ_DEFAULT_PRIORITY", "-2"),
    ]))?;
    assert_eq!(config.database, "/tmp/q.db");
    assert_eq!(config.retry.max_retries, 7);
    assert_eq!(config.scan.default_priority, -2);

    let bad = Config::default().apply_env(env(&[("FIXQ_MAX_RETRIES", "many")]));
    assert!(matches!(bad, Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_validation() {
    let zero = Config {
        retry: RetryConfig { max_retries: 0 },
        ..Config::default()
    };
    assert!(matches!(zero.validate(), Err(Error::Config(_))));

    let mocha = Config {
        scan: ScanConfig {
            framework: "mocha".into(),
            ..ScanConfig::default()
        },
        ..Config::default()
    };
    assert!(matches!(mocha.validate(), Err(Error::Config(_))));

    let blank = Config {
        database: "  ".into(),
        ..Config::default()
    };
    assert!(matches!(blank.validate(), Err(Error::Config(_))));
}

#[test]
fn test_explicit_file_and_relative_database() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.path().join("custom.toml");
    std::fs::write(&file, "database = \"state/q.db\"\n[repair]\ncommand = \"fix {file}\"\n")?;

    let layer = load_toml_file(&file)?;
    let config = Config::default().merge(layer);
    assert_eq!(config.repair.command, "fix {file}");
    assert_eq!(
        config.database_path(dir.path()),
        dir.path().join("state/q.db")
    );
    assert!(matches!(load_toml_file(dir.path()), Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_project_config_location() {
    let root = std::path::Path::new("/work/repo");
    assert_eq!(
        project_config_path(root),
        root.join(".fixq").join("config.toml")
    );
}
