//! Outcome records returned by every orchestrator entry point.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use upscaler_core::{ErrorKind, UpscalerError};

/// Timing and shape of a run. Fields that do not apply to the run type
/// are left unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub total_time_secs: f64,
    /// Frames (upscaling) or frame pairs (interpolation) processed.
    pub frames_processed: u64,
    /// Mean seconds per frame or per pair.
    pub avg_time_per_unit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps_multiplier: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_frame_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_frame_count: Option<u64>,
}

/// Success flag, output location, and metrics of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub metrics: ProcessingMetrics,
}

impl ProcessingResult {
    pub fn completed(output_path: PathBuf, metrics: ProcessingMetrics) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            error: None,
            error_kind: None,
            metrics,
        }
    }

    /// A failed run. Partial output is not reported.
    pub fn failed(error: &UpscalerError) -> Self {
        Self {
            success: false,
            output_path: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            metrics: ProcessingMetrics::default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
