//! Integration tests for static settings and server bootstrap config
//!
//! Tests cover:
//! - Loading settings from TOML and JSON files
//! - Environment variable fallback
//! - Root folder resolution priority

use proso_common::config::bootstrap::{
    resolve_root_folder, ConfigSource, ServerConfig, ROOT_FOLDER_ENV,
};
use proso_common::config::{Overrides, Settings};
use serde_json::json;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_load_toml_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proso_config.toml");
    std::fs::write(
        &path,
        r#"
[default.proso_configab]
answers_per_user = 12

[default.proso_tests.nested]
flag = true
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    let none = Overrides::new();
    assert_eq!(
        settings.get("proso_configab", "answers_per_user", &none).unwrap(),
        Some(json!(12))
    );
    assert_eq!(
        settings.get("proso_tests", "nested.flag", &none).unwrap(),
        Some(json!(true))
    );
}

#[test]
fn test_load_json_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proso_config.json");
    std::fs::write(&path, r#"{"default": {"proso_tests": {"name": "json"}}}"#).unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(
        settings.get("proso_tests", "name", &Overrides::new()).unwrap(),
        Some(json!("json"))
    );
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proso_config.yaml");
    std::fs::write(&path, "default: {}").unwrap();
    assert!(Settings::load(&path).is_err());
}

#[test]
fn test_missing_settings_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_or_default(&dir.path().join("missing.toml")).unwrap();
    assert_eq!(
        settings.global(None, &Overrides::new()).unwrap(),
        json!({})
    );
}

#[test]
#[serial]
fn test_env_fallback_is_coerced() {
    std::env::set_var("PROSO_TESTS_ENV_ONLY_LIMIT", "42");
    let settings = Settings::empty();
    let value = settings.get("proso_tests", "env_only.limit", &Overrides::new()).unwrap();
    std::env::remove_var("PROSO_TESTS_ENV_ONLY_LIMIT");

    assert_eq!(value, Some(json!(42)));
}

#[test]
#[serial]
fn test_settings_file_wins_over_env() {
    std::env::set_var("PROSO_TESTS_NAME", "from env");
    let settings = Settings::from_value(json!({"default": {"proso_tests": {"name": "from file"}}})).unwrap();
    let value = settings.get("proso_tests", "name", &Overrides::new()).unwrap();
    std::env::remove_var("PROSO_TESTS_NAME");

    assert_eq!(value, Some(json!("from file")));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    std::env::remove_var(ROOT_FOLDER_ENV);
    let config = ServerConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..ServerConfig::default()
    };

    // CLI argument wins
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config),
        PathBuf::from("/from/cli")
    );

    // Then the environment
    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));
    std::env::remove_var(ROOT_FOLDER_ENV);

    // Then the TOML file
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

    // Then the OS default
    let default = resolve_root_folder(None, &ServerConfig::default());
    assert!(default.ends_with("proso") || default.ends_with("proso_data"));
}

#[test]
fn test_server_config_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("server.toml");
    std::fs::write(
        &path,
        r#"
port = 6000

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let (config, source) = ServerConfig::load(&path).unwrap();
    assert_eq!(source, ConfigSource::File(path.clone()));
    assert_eq!(config.port, 6000);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "debug");

    let missing_path = dir.path().join("missing.toml");
    let (missing, source) = ServerConfig::load(&missing_path).unwrap();
    assert_eq!(missing, ServerConfig::default());
    assert_eq!(source, ConfigSource::Defaults(missing_path));
}
