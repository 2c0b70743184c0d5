use super::data::{path_display, Config};
use super::io::ConfigError;
use crate::core::backend::BackendKind;
use crate::core::context::{DEFAULT_CONTEXT_LENGTH, DEFAULT_TOKEN_RATIO};
use crate::core::refresh::DEFAULT_DEBOUNCE;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        backend: Some(BackendKind::KoboldCpp),
        endpoint: Some("http://gpu-box:5001".to_string()),
        context_length: Some(4096),
        ..Default::default()
    };
    config.set_default_model(BackendKind::KoboldCpp, "mythomax".to_string());
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    let mut modified = loaded;
    modified.endpoint = None;
    modified.unset_default_model(BackendKind::KoboldCpp);
    modified
        .save_to_path(&config_path)
        .expect("Failed to save config");

    let reloaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(reloaded.endpoint, None);
    assert!(reloaded.default_models.is_empty());
    assert_eq!(reloaded.backend, Some(BackendKind::KoboldCpp));
}

#[test]
fn test_backend_is_written_in_kebab_case() {
    let config = Config {
        backend: Some(BackendKind::OpenAiCompatible),
        ..Default::default()
    };
    let toml = toml::to_string_pretty(&config).expect("serialize");
    assert!(toml.contains("backend = \"open-ai-compatible\""), "{toml}");
}

#[test]
fn test_invalid_toml_reports_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "backend = [").expect("write");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn test_backend_config_uses_kind_defaults() {
    let config = Config::default();
    let backend = config.backend_config();
    assert_eq!(backend.kind, BackendKind::LlamaCpp);
    assert_eq!(backend.endpoint, BackendKind::LlamaCpp.default_endpoint());
    assert_eq!(backend.model, None);

    let mut config = Config {
        backend: Some(BackendKind::Hosted),
        ..Default::default()
    };
    config.set_default_model(BackendKind::Hosted, "mistral/7b".to_string());
    let backend = config.backend_config();
    assert_eq!(backend.endpoint, BackendKind::Hosted.default_endpoint());
    assert_eq!(backend.model.as_deref(), Some("mistral/7b"));
}

#[test]
fn test_assembly_settings_reject_invalid_ratio() {
    let config = Config {
        token_ratio: Some(0.0),
        ..Default::default()
    };
    let settings = config.assembly_settings();
    assert_eq!(settings.token_ratio, DEFAULT_TOKEN_RATIO);
    assert_eq!(settings.context_length, DEFAULT_CONTEXT_LENGTH);

    let config = Config {
        token_ratio: Some(4.0),
        context_length: Some(8192),
        ..Default::default()
    };
    let settings = config.assembly_settings();
    assert_eq!(settings.token_ratio, 4.0);
    assert_eq!(settings.context_length, 8192);
}

#[test]
fn test_refresh_debounce_and_sessions_dir_overrides() {
    let config = Config::default();
    assert_eq!(config.refresh_debounce(), DEFAULT_DEBOUNCE);

    let config = Config {
        refresh_debounce_ms: Some(250),
        sessions_dir: Some(PathBuf::from("/tmp/pads")),
        ..Default::default()
    };
    assert_eq!(config.refresh_debounce(), Duration::from_millis(250));
    assert_eq!(
        config.sessions_dir().expect("sessions dir"),
        PathBuf::from("/tmp/pads")
    );
}

#[test]
fn test_path_display_leaves_relative_paths_alone() {
    assert_eq!(path_display("relative/config.toml"), "relative/config.toml");
}
