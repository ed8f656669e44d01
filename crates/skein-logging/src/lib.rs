//! Structured logging for Skein forwarders
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Node Context**: Tag spans with the forwarder they belong to, so
//!   several in-process forwarders can share one log stream
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use skein_logging::{SkeinSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! SkeinSubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! SkeinSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! `RUST_LOG` replaces the configured filter.

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, ConsoleFormat, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::NodeContextLayer;

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),

    /// The log directory or file could not be created
    #[error("Failed to open log output in {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rolling appender rejected its settings
    #[error("Failed to create rolling appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
}

/// Builder for configuring and installing the Skein logging subscriber
///
/// Console output is JSONL unless the config asks for pretty output. File
/// output is always JSONL.
#[derive(Debug)]
pub struct SkeinSubscriberBuilder {
    config: LogConfig,
}

impl SkeinSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output when dropped; keep it alive
    /// for the duration of the program.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set or the log file
    /// cannot be opened.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => panic!("failed to initialize logging: {e}"),
        }
    }

    /// Install the subscriber globally, reporting failures
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.config.filter_directives()));

        let registry = Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new());

        let file = match &self.config.file {
            Some(file_config) => Some(file_writer(file_config)?),
            None => None,
        };
        let jsonl = &self.config.jsonl;
        let console = &self.config.console;

        // Separate arms keep each layer stack a concrete type
        let guard = match (console.enabled, console.is_pretty(), file) {
            (true, true, Some((writer, guard))) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry
                    .with(console_layer)
                    .with(layers::jsonl_file_layer(writer, jsonl))
                    .try_init()?;
                Some(guard)
            }
            (true, false, Some((writer, guard))) => {
                registry
                    .with(layers::jsonl_file_layer(std::io::stdout, jsonl))
                    .with(layers::jsonl_file_layer(writer, jsonl))
                    .try_init()?;
                Some(guard)
            }
            (false, _, Some((writer, guard))) => {
                registry.with(layers::jsonl_file_layer(writer, jsonl)).try_init()?;
                Some(guard)
            }
            (true, true, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry.with(console_layer).try_init()?;
                None
            }
            // JSONL console only (default)
            (true, false, None) => {
                registry
                    .with(layers::jsonl_file_layer(std::io::stdout, jsonl))
                    .try_init()?;
                None
            }
            (false, _, None) => {
                registry.try_init()?;
                None
            }
        };
        Ok(guard)
    }
}

impl Default for SkeinSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the writer for file output
///
/// `Never` truncates a single file; the other strategies append to rotated
/// files.
fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&file_config.directory).map_err(|source| LoggingError::LogFile {
                path: file_config.directory.clone(),
                source,
            })?;
            let path = file_config.single_path();
            let file = File::create(&path).map_err(|source| LoggingError::LogFile { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file_config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&file_config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() {
    SkeinSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    SkeinSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for tests (warnings only)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = SkeinSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = SkeinSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(!builder.config().console.is_pretty()); // JSONL by default
    }

    #[test]
    fn test_builder_with_config() {
        let builder = SkeinSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config().default_level, "debug");
        assert!(builder.config().console.is_pretty());
    }

    #[test]
    fn test_builder_overrides() {
        let builder = SkeinSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_file_output(FileConfig::default());
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
        assert!(builder.config().file.is_some());
    }

    #[test]
    fn test_single_file_writer_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.log");
        fs::write(&path, "stale").unwrap();

        let config = FileConfig::single(dir.path(), "fw");
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_init_testing_is_idempotent() {
        init_testing();
        init_testing();
    }
}
