//! Logging system configuration and initialization
//!
//! - Console output (human readable)
//! - Daily rotated file output, optionally JSON
//! - `RUST_LOG` overrides the configured level and filters
//! - HTTP stack internals suppressed unless the level is `trace`

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the life of the process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Targets that are chatty below `trace`.
const QUIET_DIRECTIVES: &[&str] = &[
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "rustls=warn",
    "tokio=info",
    "runtime=warn",
];

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Resolve the log directory. Relative paths are taken from the working directory.
#[must_use]
pub fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    if config.log_dir.is_absolute() {
        return config.log_dir.clone();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&config.log_dir))
        .unwrap_or_else(|_| config.log_dir.clone())
}

/// Build the filter from `RUST_LOG` if set, otherwise from the config.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in QUIET_DIRECTIVES {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    for (module, level) in &config.module_filters {
        let directive = format!("{module}={level}");
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid module filter '{directive}'"))?,
        );
    }

    Ok(filter)
}

fn file_layer(log_dir: &Path, config: &LoggingConfig) -> Result<BoxedLayer> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

    let appender = rolling::daily(log_dir, &config.file_name);
    let (writer, guard) = non_blocking(appender);
    if let Ok(mut guards) = LOG_GUARDS.lock() {
        guards.push(guard);
    }

    let layer: BoxedLayer = if config.json_format {
        fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::Layer::new()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .with_ansi(false)
            .boxed()
    };
    Ok(layer)
}

fn console_layer() -> BoxedLayer {
    fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_timer(LocalTimeFormatter)
        .with_target(false)
        .boxed()
}

/// Initialize logging with the given configuration.
///
/// Fails if neither output is enabled or a global subscriber is already set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = resolve_log_directory(config);
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if config.file_output {
        layers.push(file_layer(&log_dir, config)?);
    }
    if config.console_output {
        layers.push(console_layer());
    }

    Registry::default()
        .with(layers)
        .with(build_env_filter(config)?)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!(
            "Log file: {:?} (daily rotation, json={})",
            log_dir.join(&config.file_name),
            config.json_format
        );
    }
    Ok(())
}

/// Log process information for diagnostics
pub fn log_system_info() {
    info!("=== cellfill {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}
