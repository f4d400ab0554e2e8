//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use upscaler_ai::InterpolatorKind;
use upscaler_core::{Result, UpscalerError};
use upscaler_media::EncoderSettings;

/// Environment variable overriding [`PipelineConfig::output_dir`].
pub const OUTPUT_DIR_ENV: &str = "VIDEO_UPSCALER_OUTPUT_DIR";

/// Knobs shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory for generated outputs.
    pub output_dir: PathBuf,
    /// Seconds covered by preview runs.
    pub preview_seconds: f64,
    /// Progress callback every N units.
    pub progress_every: u64,
    /// Info log checkpoint every N units.
    pub log_every: u64,
    /// Enhancer cache reclaim every N frames.
    pub reclaim_every: u64,
    /// Latency samples used for the ETA.
    pub eta_window: usize,
    /// Target frame rates above this are capped.
    pub max_target_fps: f64,
    pub interpolator: InterpolatorKind,
    /// Model directory; `None` uses the default cache location.
    pub model_dir: Option<PathBuf>,
    pub encoder: EncoderSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            preview_seconds: 5.0,
            progress_every: 10,
            log_every: 100,
            reclaim_every: 50,
            eta_window: 30,
            max_target_fps: 240.0,
            interpolator: InterpolatorKind::default(),
            model_dir: None,
            encoder: EncoderSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Read a JSON file. Missing keys take their defaults; environment
    /// overrides are applied on top.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            UpscalerError::NotFound(format!("config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| UpscalerError::Serialization(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(OUTPUT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    /// Frames in a preview window at `fps`, never zero.
    pub fn preview_frames(&self, fps: f64) -> u64 {
        ((fps * self.preview_seconds).floor() as u64).max(1)
    }
}
