//! Infrastructure layer: file stores, configuration, logging and the
//! generation service client
//!
//! Each concern is its own file in the infrastructure/ directory; common
//! items are re-exported here.

pub mod atomic_file;
pub mod checkpoint_store;
pub mod config; // Layered configuration and defaults
pub mod dataset_store;
pub mod errors;
pub mod generation_client;
pub mod http_client;
pub mod logging;
pub mod retry_policy;

// Re-export commonly used items
pub use checkpoint_store::{CheckpointStore, LedgerSnapshot};
pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigOverrides, GenerationConfig, LoggingConfig};
pub use dataset_store::{CsvDatasetStore, DatasetStore, JsonDatasetStore, ensure_dataset_exists, open_dataset_store};
pub use errors::{EngineError, GenerationError, StoreError, StoreResult};
pub use generation_client::{ContentGenerator, GenerationClient};
pub use http_client::{CompletionBackend, CompletionRequest, OpenAiChatBackend};
pub use logging::{init_logging_with_config, log_system_info};
pub use retry_policy::RetryPolicy;
