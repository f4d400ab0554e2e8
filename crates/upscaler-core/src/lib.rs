//! Video Upscaler Core - Foundation types
//!
//! This crate provides the fundamental types used throughout the upscaler:
//! - Frames (packed RGB24) and resampling
//! - Resolutions and the 8K output ceiling
//! - Frame rates and source metadata
//! - The error taxonomy shared by every crate

pub mod error;
pub mod frame;
pub mod metadata;
pub mod resolution;
pub mod time;

pub use error::{ErrorKind, Result, UpscalerError};
pub use frame::{Frame, ResizeFilter};
pub use metadata::VideoMetadata;
pub use resolution::{Resolution, MAX_OUTPUT_MEGAPIXELS, MAX_OUTPUT_PIXELS};
pub use time::FrameRate;

/// Pixel thresholds used when sizing batches and tiles.
pub mod memory_budget {
    use crate::Resolution;

    /// Above this output size the batch size is halved.
    pub const BATCH_HALVING_PIXELS: u64 = Resolution::UHD_4K.pixels();

    /// Above this output size batching is disabled and tiles are capped.
    pub const NEAR_8K_PIXELS: u64 = Resolution::UHD_8K.pixels() / 2;

    /// Largest tile used once output approaches 8K.
    pub const NEAR_8K_MAX_TILE: u32 = 256;
}
