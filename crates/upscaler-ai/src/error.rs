//! Error types for the enhancement and interpolation capabilities.

use thiserror::Error;
use upscaler_core::UpscalerError;

/// Errors that can occur in AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// The requested model was not found in the cache.
    #[error("Model not found: {model_id} (expected at {path})")]
    ModelNotFound { model_id: String, path: String },

    /// Model not loaded.
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// ONNX Runtime error.
    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    Onnx(String),

    /// Preprocessing error (frame conversion, size mismatch, bad timestep).
    #[error("Preprocessing error: {0}")]
    PreprocessError(String),

    /// The model ran but produced unusable output.
    #[error("Inference error: {0}")]
    Inference(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "onnx")]
impl AiError {
    pub(crate) fn onnx(e: impl std::fmt::Display) -> Self {
        Self::Onnx(e.to_string())
    }
}

impl From<AiError> for UpscalerError {
    fn from(e: AiError) -> Self {
        UpscalerError::Capability(e.to_string())
    }
}

/// Result type alias for AI operations.
pub type AiResult<T> = std::result::Result<T, AiError>;
