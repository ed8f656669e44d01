//! Error types for Skein

use thiserror::Error;

use crate::face::FaceId;
use crate::name::Name;

/// Top-level error type for Skein
#[derive(Debug, Error)]
pub enum SkeinError {
    #[error("Name error: {0}")]
    Name(#[from] NameError),

    #[error("Face error: {0}")]
    Face(#[from] FaceError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),
}

/// Errors related to names and name URIs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid percent-encoding in component: {0}")]
    InvalidPercentEncoding(String),

    #[error("Invalid name component: {0}")]
    InvalidComponent(String),

    #[error("Name depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: usize, max: usize },
}

/// Errors related to faces
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FaceError {
    #[error("Unknown face: {0}")]
    UnknownFace(FaceId),

    #[error("Face is down: {0}")]
    FaceDown(FaceId),

    #[error("Face id already in use: {0}")]
    DuplicateId(FaceId),

    #[error("Face id is reserved: {0}")]
    ReservedId(FaceId),

    #[error("Face channel closed: {0}")]
    Closed(FaceId),

    #[error("Face queue full: {0}")]
    QueueFull(FaceId),
}

/// Errors raised while instantiating a forwarding strategy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Strategy not registered: {0}")]
    NotRegistered(Name),

    #[error("Strategy {strategy} does not support version {version}")]
    UnsupportedVersion { strategy: Name, version: u64 },

    #[error("Strategy {0} does not accept parameters")]
    ParametersNotAccepted(Name),
}

/// Result type alias using SkeinError
pub type SkeinResult<T> = Result<T, SkeinError>;
