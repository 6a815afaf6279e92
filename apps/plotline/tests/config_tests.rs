//! Tests for `plotline.toml` loading and override precedence.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use plotline::config::{Config, ENV_LOG_FORMAT, ENV_SAVES, LogFormat};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn test_full_config_parses() {
    let config = Config::from_toml_str(
        r#"
        [engine]
        strict = false

        [saves]
        database = "/tmp/slots.db"

        [log]
        format = "json"
        filter = "plotline=debug"
        "#,
    )
    .unwrap();

    assert!(!config.engine.strict);
    assert_eq!(config.saves.database, PathBuf::from("/tmp/slots.db"));
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.log.filter, "plotline=debug");
}

#[test]
fn test_partial_config_keeps_defaults() {
    let config = Config::from_toml_str("[engine]\nstrict = false\n").unwrap();
    assert!(!config.engine.strict);
    assert_eq!(config.saves.database, PathBuf::from("plotline.db"));
    assert_eq!(config.log.format, LogFormat::Text);
}

#[test]
fn test_empty_config_is_default() {
    assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
}

#[test]
fn test_unknown_keys_rejected() {
    assert!(Config::from_toml_str("[engine]\nstrictness = 1\n").is_err());
    assert!(Config::from_toml_str("[server]\nport = 8080\n").is_err());
}

#[test]
fn test_bad_log_format_rejected() {
    assert!(Config::from_toml_str("[log]\nformat = \"xml\"\n").is_err());
}

// =============================================================================
// FILES
// =============================================================================

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plotline.toml");
    std::fs::write(&path, "[saves]\ndatabase = \"game.db\"\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.saves.database, PathBuf::from("game.db"));
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

// =============================================================================
// ENVIRONMENT OVERRIDES
// =============================================================================

#[test]
fn test_env_overrides_file_values() {
    let config = Config::from_toml_str("[log]\nformat = \"text\"\n")
        .unwrap()
        .with_env_overrides(env(&[(ENV_LOG_FORMAT, "json"), (ENV_SAVES, "env.db")]));

    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.saves.database, PathBuf::from("env.db"));
}

#[test]
fn test_unrecognized_env_values_ignored() {
    let config = Config::default()
        .with_env_overrides(env(&[(ENV_LOG_FORMAT, "yaml"), (ENV_SAVES, "  ")]));
    assert_eq!(config, Config::default());
}
