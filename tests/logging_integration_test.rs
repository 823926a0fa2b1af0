//! Integration tests for logging functionality
//!
//! Only one global subscriber can be installed per test binary, so a single
//! test performs the successful initialization; the others fail before it.

use scholarly_ingest::config::LoggingConfig;
use scholarly_ingest::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, "info");
    assert!(!config.local_enabled);
    assert_eq!(config.local_path, "logs");
    assert_eq!(config.local_rotation, "daily");
}

#[test]
fn test_invalid_level_is_rejected_before_install() {
    let config = LoggingConfig::default();
    let err = init_logging("verbose", &config).err().unwrap();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_invalid_rotation_is_rejected_before_install() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        level: "info".to_string(),
        local_enabled: true,
        local_path: log_path.display().to_string(),
        local_rotation: "weekly".to_string(),
    };

    let err = init_logging("info", &config).err().unwrap();
    assert!(err.to_string().contains("Invalid log rotation"));
    assert!(!log_path.exists());
}

#[test]
fn test_file_logging_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("nested").join("logs");

    let config = LoggingConfig {
        level: "debug".to_string(),
        local_enabled: true,
        local_path: log_path.display().to_string(),
        local_rotation: "never".to_string(),
    };

    let guard = init_logging("debug", &config).expect("logging initialized");
    tracing::info!(source = "arxiv", "written to the file layer");
    drop(guard);

    assert!(log_path.is_dir());
}
