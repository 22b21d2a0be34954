use super::load_existing_config as load_existing_config_impl;
use super::{validate_retry_attempts, validate_timeout};
use crate::config::ConfigError;
use tempfile::TempDir;

#[test]
fn load_existing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.ollama.model.is_empty());
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_falls_back_on_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "[ollama\nport = 1")
        .expect("should write broken config");

    let config = load_existing_config_impl(temp_dir.path()).expect("falls back to defaults");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn timeout_and_retry_prompts_use_setter_bounds() {
    assert!(validate_timeout(1).is_ok());
    assert!(validate_timeout(600).is_ok());
    assert!(matches!(
        validate_timeout(0),
        Err(ConfigError::InvalidTimeout(0))
    ));
    assert!(validate_timeout(601).is_err());

    assert!(validate_retry_attempts(3).is_ok());
    assert!(matches!(
        validate_retry_attempts(11),
        Err(ConfigError::InvalidRetryAttempts(11))
    ));
    assert!(validate_retry_attempts(0).is_err());
}
