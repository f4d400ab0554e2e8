//! Error types for Video Upscaler Pro.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for upscaler operations.
#[derive(Error, Debug)]
pub enum UpscalerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scale factor: {0}. Must be greater than 0 and at most 16.0")]
    InvalidScale(f64),

    #[error("Invalid native ratio: {0}. Supported ratios are 2 and 4")]
    InvalidNativeRatio(u32),

    #[error("Invalid frame-rate multiplier: {0}. Must be at least 1")]
    InvalidMultiplier(u32),

    #[error(
        "Output resolution ({width}x{height}, {megapixels:.1}MP) exceeds 8K limit ({limit:.1}MP)"
    )]
    ResolutionLimit {
        width: u32,
        height: u32,
        megapixels: f64,
        limit: f64,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Insufficient memory: {0}")]
    InsufficientMemory(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a failure, reported alongside failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad scale, bad multiplier, or resolution ceiling exceeded.
    Validation,
    /// Device memory exhaustion.
    Resource,
    /// The enhancement or interpolation capability failed.
    Capability,
    /// Missing input, unreadable container, or unwritable output.
    Io,
    /// The run was stopped between frames.
    Cancelled,
}

impl UpscalerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidScale(_)
            | Self::InvalidNativeRatio(_)
            | Self::InvalidMultiplier(_)
            | Self::ResolutionLimit { .. }
            | Self::InvalidParameter(_) => ErrorKind::Validation,
            Self::InsufficientMemory(_) => ErrorKind::Resource,
            Self::Capability(_) | Self::Internal(_) => ErrorKind::Capability,
            Self::Io(_)
            | Self::NotFound(_)
            | Self::UnsupportedFormat(_)
            | Self::Decoder(_)
            | Self::Encoder(_)
            | Self::Serialization(_) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result type alias for upscaler operations.
pub type Result<T> = std::result::Result<T, UpscalerError>;
