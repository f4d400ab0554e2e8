//! Video Upscaler Pipeline - planning and orchestration
//!
//! This crate turns a source video into an upscaled or frame-interpolated
//! one:
//! - Scale decomposition into enhancer passes and a corrective resize
//! - Temporal expansion by an integer frame-rate multiplier
//! - Device detection and per-run resource adjustment
//! - The orchestrator that streams frames from source to sink

pub mod config;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod resources;
pub mod result;
pub mod scale_plan;
pub mod temporal;

pub use config::PipelineConfig;
pub use naming::{interpolated_output_path, preview_path, upscaled_output_path};
pub use orchestrator::{
    inspect, FrameRateTarget, FrameWindow, InterpolationJob, Orchestrator, RunState, UpscaleJob,
};
pub use progress::{CancelToken, RollingEta};
pub use resources::{DeviceInfo, DeviceKind, ResourcePlanner, ResourceProfile, TimeEstimate};
pub use result::{ProcessingMetrics, ProcessingResult};
pub use scale_plan::{plan, ScalePlan, ScaleStep};
pub use temporal::TemporalExpander;
