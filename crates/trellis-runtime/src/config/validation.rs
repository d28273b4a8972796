//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{ExecutorsConfig, LogOutput, LoggingConfig, TrellisConfig};

/// Upper bound for a single pool's worker count.
pub const MAX_POOL_WORKERS: usize = 1024;

/// Validates the entire configuration.
pub fn validate_config(config: &TrellisConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_executors_config(&config.executors)?;
    validate_properties(config)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output = \"file\"",
        ));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module must not be empty"));
    }

    Ok(())
}

fn validate_executors_config(executors: &ExecutorsConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for pool in &executors.pools {
        if pool.name.is_empty() || pool.name.chars().any(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid executor pool name: {:?}",
                pool.name
            )));
        }

        if !seen.insert(pool.name.as_str()) {
            return Err(ConfigError::DuplicateExecutor(pool.name.clone()));
        }

        if pool.workers == 0 || pool.workers > MAX_POOL_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                name: pool.name.clone(),
                workers: pool.workers,
            });
        }
    }

    Ok(())
}

/// Every flattened key must be addressable by a `${...}` placeholder.
fn validate_properties(config: &TrellisConfig) -> ConfigResult<()> {
    let properties = config.flattened_properties();
    for (key, _) in properties.iter() {
        if trellis_core::parse_placeholder(&format!("${{{key}}}")).is_err() {
            return Err(ConfigError::validation(format!(
                "Property key {key:?} cannot be referenced by a placeholder"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, PoolConfig};
    use serde_json::json;

    fn pool(name: &str, workers: usize) -> PoolConfig {
        PoolConfig {
            name: name.to_string(),
            workers,
        }
    }

    #[test]
    fn test_validate_empty_config() {
        let config = TrellisConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_duplicate_pool() {
        let mut config = TrellisConfig::default();
        config.executors.pools = vec![pool("mail", 2), pool("mail", 4)];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateExecutor(name)) if name == "mail"
        ));
    }

    #[test]
    fn test_validate_worker_count() {
        let mut config = TrellisConfig::default();
        config.executors.pools = vec![pool("io", 0)];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidWorkerCount { workers: 0, .. })
        ));

        config.executors.pools = vec![pool("io", MAX_POOL_WORKERS + 1)];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = TrellisConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.file_path = Some("trellis.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_json_format_accepted_without_feature() {
        // Logging falls back to the full format when `json-log` is off.
        let mut config = TrellisConfig::default();
        config.logging.format = LogFormat::Json;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_property_keys() {
        let mut config = TrellisConfig::default();
        config
            .properties
            .insert("db".into(), json!({ "url": "jdbc:test" }));
        assert!(validate_config(&config).is_ok());

        config
            .properties
            .insert("bad key".into(), json!("value"));
        assert!(validate_config(&config).is_err());
    }
}
