//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::IngestConfig;
use super::secret::secret_string;
use crate::domain::errors::IngestError;
use crate::domain::ids::SourceKind;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SCHOLARLY";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into IngestConfig
/// 4. Applies environment variable overrides (SCHOLARLY_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] if the file is missing or
/// unreadable, a referenced variable is unset, parsing fails, or
/// validation fails.
///
/// # Examples
///
/// ```no_run
/// use scholarly_ingest::config::loader::load_config;
///
/// let config = load_config("ingest.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<IngestConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(IngestError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        IngestError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying substitution, overrides and validation
pub fn parse_config(contents: &str) -> Result<IngestConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: IngestConfig = toml::from_str(&contents)
        .map_err(|e| IngestError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        IngestError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched. All missing variables are reported
/// together.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| IngestError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(IngestError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{key}")).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            IngestError::Configuration(format!("{ENV_PREFIX}_{key} has invalid value '{raw}'"))
        }),
        None => Ok(None),
    }
}

/// Applies environment variable overrides using the SCHOLARLY_* prefix
///
/// Variables follow the pattern `SCHOLARLY_<SECTION>_<KEY>`, for example
/// `SCHOLARLY_GLOBAL_RAW_DATA_DIR` or `SCHOLARLY_PUBMED_MAX_RECORDS`.
fn apply_env_overrides(config: &mut IngestConfig) -> Result<()> {
    if let Some(val) = env("GLOBAL_CHECKPOINT_DIR") {
        config.global.checkpoint_dir = val;
    }
    if let Some(val) = env("GLOBAL_RAW_DATA_DIR") {
        config.global.raw_data_dir = val;
    }
    if let Some(val) = parse_env("GLOBAL_COMPRESS")? {
        config.global.compress = val;
    }
    if let Some(val) = parse_env("GLOBAL_CONCURRENT_SOURCES")? {
        config.global.concurrent_sources = val;
    }

    if let Some(val) = env("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = parse_env("LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    if let Some(val) = env("PUBMED_API_KEY") {
        config.pubmed.api_key = Some(secret_string(val));
        config.pubmed.use_api_key = true;
    }
    if let Some(val) = env("OPENALEX_EMAIL") {
        config.openalex.email = val;
    }

    for source in SourceKind::ALL {
        let section = source.as_str().to_ascii_uppercase();
        if let Some(enabled) = parse_env::<bool>(&format!("{section}_ENABLED"))? {
            match source {
                SourceKind::Arxiv => config.arxiv.enabled = enabled,
                SourceKind::Pubmed => config.pubmed.enabled = enabled,
                SourceKind::OpenAlex => config.openalex.enabled = enabled,
            }
        }
        if let Some(max) = parse_env::<u64>(&format!("{section}_MAX_RECORDS"))? {
            config.set_max_records(source, max);
        }
    }

    Ok(())
}
