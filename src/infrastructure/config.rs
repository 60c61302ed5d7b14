//! Configuration infrastructure
//!
//! One explicit [`AppConfig`] object is built at startup and passed into the
//! engine; nothing reads ambient globals after that point.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults (`#[serde(default)]` on every section)
//! 2. TOML file (`--config`, else `./cellfill.toml`, else `<config dir>/cellfill/cellfill.toml`)
//! 3. Environment variables prefixed `CELLFILL`, `__` between nested keys
//!    (e.g. `CELLFILL_GENERATION__PRIMARY_MODEL`)
//! 4. Command-line overrides ([`ConfigOverrides`])

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::FillOrder;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Default configuration values
pub mod defaults {
    pub const DATASET_PATH: &str = "aiml2.json";
    pub const CHECKPOINT_PATH: &str = "checkpoint.json";

    /// Parallel generation calls per batch
    pub const WORKERS: usize = 25;
    /// Batch size is this many times the worker count unless set explicitly
    pub const BATCH_SIZE_PER_WORKER: usize = 3;

    pub const API_BASE_URL: &str = "https://api.openai.com/v1";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const PRIMARY_MODEL: &str = "gpt-4.1-nano";
    pub const FALLBACK_MODEL: &str = "gpt-3.5-turbo";
    pub const SYSTEM_PROMPT: &str = "You are an AI/ML educational content assistant.";
    /// `{term}` is the entity name, `{section}` the column header
    pub const PROMPT_TEMPLATE: &str = "You are an AI/ML educational content assistant. For the term \"{term}\", please write only the content for this section:\n\n\"{section}\"\n\nDo not include any extra headings or formatting, just the prose, concise enough to fit in one spreadsheet cell.";

    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 2000;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;
    /// Accepted output must be longer than this many characters
    pub const MIN_CONTENT_CHARS: usize = 10;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 50;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_NAME: &str = "cellfill.log";

    pub const CONFIG_FILE_NAME: &str = "cellfill.toml";
    pub const ENV_PREFIX: &str = "CELLFILL";
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Dataset file (`.json` or `.csv`)
    pub dataset_path: PathBuf,

    /// Checkpoint ledger file
    pub checkpoint_path: PathBuf,

    /// Processing order of discovered tasks
    pub order: FillOrder,

    /// Maximum in-flight generation calls
    pub workers: usize,

    /// Tasks per batch; `None` means `workers * 3`
    pub batch_size: Option<usize>,

    pub generation: GenerationConfig,

    pub logging: LoggingConfig,
}

/// Generation service and retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    pub api_base_url: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    pub primary_model: String,

    /// Used only for the final attempt
    pub fallback_model: String,

    pub system_prompt: String,

    /// User prompt with `{term}` and `{section}` placeholders
    pub prompt_template: String,

    /// Attempts with the primary model before the single fallback attempt
    pub max_retries: u32,

    /// Linear backoff unit: the n-th retry waits n * this
    pub retry_base_delay_ms: u64,

    pub request_timeout_seconds: u64,

    pub min_content_chars: usize,

    /// Client-side quota shared by all workers
    pub max_requests_per_second: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the log file
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files, relative to the working directory unless absolute
    pub log_dir: PathBuf,

    pub file_name: String,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(defaults::DATASET_PATH),
            checkpoint_path: PathBuf::from(defaults::CHECKPOINT_PATH),
            order: FillOrder::Forward,
            workers: defaults::WORKERS,
            batch_size: None,
            generation: GenerationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::API_BASE_URL.to_string(),
            api_key_env: defaults::API_KEY_ENV.to_string(),
            primary_model: defaults::PRIMARY_MODEL.to_string(),
            fallback_model: defaults::FALLBACK_MODEL.to_string(),
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            prompt_template: defaults::PROMPT_TEMPLATE.to_string(),
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            min_content_chars: defaults::MIN_CONTENT_CHARS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: HashMap::new(),
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl AppConfig {
    /// Batch size in force: explicit value, else `workers * 3`.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or(self.workers * defaults::BATCH_SIZE_PER_WORKER)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Validation {
                message: "workers must be greater than 0".to_string(),
            });
        }
        if self.effective_batch_size() == 0 {
            return Err(ConfigError::Validation {
                message: "batch_size must be greater than 0".to_string(),
            });
        }
        if self.generation.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "generation.request_timeout_seconds must be greater than 0".to_string(),
            });
        }
        if self.generation.max_requests_per_second == 0 {
            return Err(ConfigError::Validation {
                message: "generation.max_requests_per_second must be greater than 0".to_string(),
            });
        }
        if self.generation.primary_model.trim().is_empty()
            || self.generation.fallback_model.trim().is_empty()
        {
            return Err(ConfigError::Validation {
                message: "primary_model and fallback_model must be set".to_string(),
            });
        }
        if !self.generation.prompt_template.contains("{term}")
            || !self.generation.prompt_template.contains("{section}")
        {
            return Err(ConfigError::Validation {
                message: "prompt_template must contain {term} and {section}".to_string(),
            });
        }
        if self.generation.primary_model == self.generation.fallback_model {
            warn!(
                "Fallback model is the same as the primary model ({})",
                self.generation.primary_model
            );
        }
        Ok(())
    }

    /// Apply command-line overrides on top of the layered configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.dataset_path {
            self.dataset_path.clone_from(path);
        }
        if let Some(path) = &overrides.checkpoint_path {
            self.checkpoint_path.clone_from(path);
        }
        if let Some(order) = overrides.order {
            self.order = order;
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = Some(batch_size);
        }
    }
}

/// Values given on the command line. `None` leaves the layered value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dataset_path: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
    pub order: Option<FillOrder>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Builds [`AppConfig`] from file and environment layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new(explicit_file: Option<PathBuf>) -> Self {
        Self {
            explicit_file,
            env_prefix: None,
        }
    }

    /// Use a different environment prefix (tests use this to stay isolated).
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Application config directory, e.g. `~/.config/cellfill`
    #[must_use]
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cellfill"))
    }

    fn discovered_file(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.explicit_file {
            return Some(explicit.clone());
        }
        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        Self::user_config_dir()
            .map(|dir| dir.join(defaults::CONFIG_FILE_NAME))
            .filter(|p| p.is_file())
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = self.discovered_file() {
            // An explicitly named file must exist; discovered ones already do.
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
            info!("Using configuration file: {:?}", path);
        }

        let prefix = self.env_prefix.as_deref().unwrap_or(defaults::ENV_PREFIX);
        builder = builder.add_source(
            config::Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(file: Option<PathBuf>) -> ConfigLoader {
        ConfigLoader::new(file).with_env_prefix("CELLFILL_TEST_UNSET_PREFIX")
    }

    #[test]
    fn defaults_mirror_the_batch_tool() {
        let config = AppConfig::default();
        assert_eq!(config.workers, 25);
        assert_eq!(config.effective_batch_size(), 75);
        assert_eq!(config.generation.max_retries, 3);
        assert_eq!(config.generation.retry_base_delay(), Duration::from_secs(2));
        assert_eq!(config.generation.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.generation.min_content_chars, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_file_overrides_defaults_partially() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cellfill.toml");
        std::fs::write(
            &path,
            r#"
workers = 8
order = "bottomup"

[generation]
primary_model = "local-small"
retry_base_delay_ms = 10
"#,
        )
        .unwrap();

        let config = isolated(Some(path)).load().unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.effective_batch_size(), 24);
        assert_eq!(config.order, FillOrder::Reverse);
        assert_eq!(config.generation.primary_model, "local-small");
        assert_eq!(config.generation.fallback_model, defaults::FALLBACK_MODEL);
        assert_eq!(config.generation.retry_base_delay_ms, 10);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = isolated(Some(dir.path().join("absent.toml"))).load();
        assert!(matches!(result, Err(ConfigError::FileLoad { .. })));
    }

    #[test]
    fn zero_workers_fail_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cellfill.toml");
        std::fs::write(&path, "workers = 0\n").unwrap();

        let result = isolated(Some(path)).load();
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = AppConfig::default();
        config.apply_overrides(&ConfigOverrides {
            dataset_path: Some(PathBuf::from("terms.csv")),
            order: Some(FillOrder::Reverse),
            workers: Some(4),
            batch_size: Some(5),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.dataset_path, PathBuf::from("terms.csv"));
        assert_eq!(config.order, FillOrder::Reverse);
        assert_eq!(config.effective_batch_size(), 5);
        assert_eq!(config.checkpoint_path, PathBuf::from(defaults::CHECKPOINT_PATH));
    }
}
