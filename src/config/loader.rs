//! Configuration Loader
//!
//! Environment-aware configuration loading on the `config` crate. Sources
//! are layered, later ones winning:
//!
//! 1. built-in defaults
//! 2. `<dir>/query-storage.toml` (optional)
//! 3. `<dir>/query-storage.<environment>.toml` (optional)
//! 4. `QUERY_STORAGE__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::QueryStorageConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "query-storage";
const ENV_PREFIX: &str = "QUERY_STORAGE";

pub struct ConfigManager {
    config: QueryStorageConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading query storage configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            default_lease_ms = config.lock.default_lease_ms,
            max_running_per_query = config.tasks.max_running_per_query,
            policy = ?config.priority.policy,
            executors = config.executors.types.len(),
            "✅ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: QueryStorageConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn load_and_merge_config(directory: &Path, environment: &str) -> ConfigResult<QueryStorageConfig> {
        let defaults = Config::try_from(&QueryStorageConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let base_path = directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_path = directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        for path in [&base_path, &env_path] {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
            }
        }

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_path.clone()).format(FileFormat::Toml).required(false))
            .add_source(File::from(env_path.clone()).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(directory.display().to_string(), e))?;

        merged
            .try_deserialize::<QueryStorageConfig>()
            .map_err(|e| ConfigurationError::load_error(directory.display().to_string(), e))
    }

    pub fn detect_environment() -> String {
        env::var("QUERY_STORAGE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    pub fn config(&self) -> &QueryStorageConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .finish()
    }
}
