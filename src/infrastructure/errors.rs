//! Error types for the storage and generation layers
//!
//! Transient generation failures and local storage failures are kept in
//! separate enums: the first is always absorbed by the retry policy, the second
//! decides whether a run can start or continue.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single call to the content generation service.
///
/// Every variant is transient from the point of view of the attempt plan.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("rate limited by generation service: {message}")]
    RateLimited { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("missing API key (set {env_var})")]
    MissingApiKey { env_var: String },
}

impl GenerationError {
    /// Build from an HTTP status and body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = body.chars().take(200).collect::<String>();
        if status == 429 {
            Self::RateLimited { message }
        } else {
            Self::Http { status, message }
        }
    }

    /// Classify a reqwest failure. `timeout` is the per-request bound that was in force.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Dataset and checkpoint storage failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dataset file {} not found", .0.display())]
    DatasetMissing(PathBuf),

    #[error("unsupported dataset format for {} (expected .json or .csv)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unexpected dataset shape in {}: {reason}", .path.display())]
    Shape { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures that stop a fill run.
///
/// Anything below the batch level is absorbed into a failed task slot; only
/// storage problems reach this type.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("startup failed: {0}")]
    Startup(#[source] StoreError),

    #[error("failed to persist batch {batch}: {source}")]
    Persistence {
        batch: usize,
        #[source]
        source: StoreError,
    },
}
