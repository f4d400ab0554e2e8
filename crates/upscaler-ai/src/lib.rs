//! Video Upscaler AI - enhancement and interpolation capabilities
//!
//! Provides:
//! - The `FrameEnhancer` / `FrameInterpolator` capability traits
//! - A tiled CPU upscaler and, with `onnx`, Real-ESRGAN
//! - Optical-flow and blend interpolators and, with `onnx`, RIFE
//! - Model file lookup

pub mod capability;
pub mod error;
pub mod interpolation;
pub mod model_manager;
pub mod optical_flow;
#[cfg(feature = "onnx")]
pub mod session;
pub mod upscale;

pub use capability::{
    enhancer_memory_gb, interpolator_memory_gb, timesteps, FrameEnhancer, FrameInterpolator,
    NativeRatio, ProcessingHints,
};
pub use error::{AiError, AiResult};
pub use interpolation::{
    create_interpolator, BlendInterpolator, FlowInterpolator, InterpolatorKind,
};
pub use model_manager::{ModelId, ModelStore};
pub use upscale::{create_enhancer, TiledUpscaler};
