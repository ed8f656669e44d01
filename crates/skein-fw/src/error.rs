//! Forwarder error types

use std::path::PathBuf;

use skein_core::{FaceError, NameError, StrategyError};
use thiserror::Error;

/// Errors surfaced by the forwarder and its host runtime
#[derive(Debug, Error)]
pub enum FwError {
    /// Configuration could not be loaded or is unusable
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A strategy could not be instantiated
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// A face operation failed
    #[error("Face error: {0}")]
    Face(#[from] FaceError),

    /// A name was rejected by a table
    #[error("Name error: {0}")]
    Name(#[from] NameError),

    /// The runtime's inbound channel was closed
    #[error("Runtime channel closed")]
    ChannelClosed,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for forwarder operations
pub type FwResult<T> = Result<T, FwError>;
