use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const ENV_DATABASE_PATH: &str = "PLACETAP_DATABASE_PATH";
pub const ENV_USE_MOCK_API: &str = "PLACETAP_USE_MOCK_API";
pub const ENV_LOG_LEVEL: &str = "PLACETAP_LOG_LEVEL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies `PLACETAP_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: Config) -> Result<Config, ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

fn apply_overrides_from<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.is_empty()) {
        config.database.path = Some(path);
    }

    if let Some(raw) = lookup(ENV_USE_MOCK_API) {
        config.api.use_mock = parse_bool(&raw).ok_or_else(|| ConfigError::Validation {
            message: format!("{} must be a boolean, got '{}'", ENV_USE_MOCK_API, raw),
        })?;
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.is_empty()) {
        config.logging.level = level.to_lowercase();
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let defaults = &config.defaults;
    if !(1..=10).contains(&defaults.pages)
        || !(1..=500).contains(&defaults.batch_size)
        || !(1..=100).contains(&defaults.concurrency)
    {
        return Err(ConfigError::Validation {
            message: format!(
                "Job defaults out of range: pages={}, batchSize={}, concurrency={}",
                defaults.pages, defaults.batch_size, defaults.concurrency
            ),
        });
    }

    if config.processor.global_concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "processor.globalConcurrency must be at least 1".to_string(),
        });
    }

    let mock = &config.api.mock;
    if mock.min_latency_ms > mock.max_latency_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "api.mock latency range is inverted: {} > {}",
                mock.min_latency_ms, mock.max_latency_ms
            ),
        });
    }

    if config.retry.multiplier < 1.0 {
        return Err(ConfigError::Validation {
            message: format!("retry.multiplier must be >= 1, got {}", config.retry.multiplier),
        });
    }

    if !matches!(
        config.logging.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::Validation {
            message: format!("Unknown log level: {}", config.logging.level),
        });
    }

    Ok(())
}
