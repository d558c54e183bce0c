//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::models::{CortexConfig, Environment};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment: {0}. Must be one of: dev, staging, prod")]
    InvalidEnvironment(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_tokens_per_worker: {0}. Must be positive")]
    InvalidMaxTokens(u64),

    #[error("Invalid max_concurrent_per_type: {0}. Must be at least 1")]
    InvalidConcurrency(usize),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `<home>/coordination/config.yaml`
    /// 3. Environment variables (`CORTEX_*` prefix, highest priority)
    ///
    /// `CORTEX_HOME` is resolved first since it decides where the YAML
    /// file lives; it defaults to the current directory.
    pub fn load() -> Result<CortexConfig> {
        let home = std::env::var("CORTEX_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let mut config: CortexConfig = Figment::new()
            .merge(Serialized::defaults(CortexConfig::default()))
            .merge(Yaml::file(home.join("coordination").join("config.yaml")))
            .merge(Env::prefixed("CORTEX_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        config.home = Some(home.to_string_lossy().to_string());
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &CortexConfig) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.limits.max_tokens_per_worker == 0 {
            return Err(ConfigError::InvalidMaxTokens(
                config.limits.max_tokens_per_worker,
            ));
        }

        if config.limits.max_concurrent_per_type == 0 {
            return Err(ConfigError::InvalidConcurrency(
                config.limits.max_concurrent_per_type,
            ));
        }

        Ok(())
    }

    /// Resolved home directory for a loaded config.
    pub fn home_of(config: &CortexConfig) -> PathBuf {
        config
            .home
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Read the environment from CORTEX_ENV, defaulting to prod.
pub fn env_from_process() -> Result<Environment, ConfigError> {
    match std::env::var("CORTEX_ENV") {
        Ok(raw) => {
            Environment::from_str(&raw).ok_or(ConfigError::InvalidEnvironment(raw))
        }
        Err(_) => Ok(Environment::Prod),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CortexConfig;

    #[test]
    fn test_defaults_validate() {
        let config = CortexConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = CortexConfig::default();
        config.logging.level = "loud".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_zero_token_limit_rejected() {
        let mut config = CortexConfig::default();
        config.limits.max_tokens_per_worker = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxTokens(0))
        ));
    }

    #[test]
    fn test_env_from_process() {
        temp_env::with_var("CORTEX_ENV", Some("staging"), || {
            assert_eq!(env_from_process().unwrap(), Environment::Staging);
        });
        temp_env::with_var("CORTEX_ENV", Some("production"), || {
            assert!(env_from_process().is_err());
        });
        temp_env::with_var("CORTEX_ENV", None::<&str>, || {
            assert_eq!(env_from_process().unwrap(), Environment::Prod);
        });
    }
}
