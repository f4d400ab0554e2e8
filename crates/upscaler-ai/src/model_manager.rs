//! Model cache lookup.
//!
//! Resolves where model files live and whether they are present. Fetching
//! and converting weights happens outside this crate; a missing model is
//! reported as [`AiError::ModelNotFound`].

use crate::capability::NativeRatio;
use crate::error::{AiError, AiResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the model directory.
pub const MODEL_DIR_ENV: &str = "VIDEO_UPSCALER_MODEL_DIR";

/// Specification for a model file.
pub struct ModelSpec {
    /// Unique identifier.
    pub id: ModelId,
    /// Filename in the model directory.
    pub filename: &'static str,
    /// Where the original weights are published.
    pub url: &'static str,
    /// Approximate file size in bytes.
    pub size_bytes: u64,
}

/// Identifies a specific model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    /// Real-ESRGAN x2plus.
    RealEsrganX2,
    /// Real-ESRGAN x4plus.
    RealEsrganX4,
    /// Real-ESRGAN x4plus anime (6 blocks).
    RealEsrganX4Anime,
    /// RIFE v4 frame interpolation.
    RifeV4,
}

impl ModelId {
    /// Every known model.
    pub const ALL: [ModelId; 4] = [
        Self::RealEsrganX2,
        Self::RealEsrganX4,
        Self::RealEsrganX4Anime,
        Self::RifeV4,
    ];

    /// Default enhancement model for a native ratio.
    pub fn for_ratio(ratio: NativeRatio) -> Self {
        match ratio {
            NativeRatio::X2 => Self::RealEsrganX2,
            NativeRatio::X4 => Self::RealEsrganX4,
        }
    }

    /// Stable short name.
    pub fn key(&self) -> &'static str {
        match self {
            Self::RealEsrganX2 => "realesrgan_x2plus",
            Self::RealEsrganX4 => "realesrgan_x4plus",
            Self::RealEsrganX4Anime => "realesrgan_x4plus_anime",
            Self::RifeV4 => "rife_v4",
        }
    }

    /// Get the specification for this model.
    pub fn spec(&self) -> ModelSpec {
        match self {
            Self::RealEsrganX2 => ModelSpec {
                id: *self,
                filename: "RealESRGAN_x2plus.onnx",
                url: "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.2.1/RealESRGAN_x2plus.pth",
                size_bytes: 67_000_000,
            },
            Self::RealEsrganX4 => ModelSpec {
                id: *self,
                filename: "RealESRGAN_x4plus.onnx",
                url: "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.1.0/RealESRGAN_x4plus.pth",
                size_bytes: 67_000_000,
            },
            Self::RealEsrganX4Anime => ModelSpec {
                id: *self,
                filename: "RealESRGAN_x4plus_anime_6B.onnx",
                url: "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.2.2.4/RealESRGAN_x4plus_anime_6B.pth",
                size_bytes: 18_000_000,
            },
            Self::RifeV4 => ModelSpec {
                id: *self,
                filename: "rife_v4.onnx",
                url: "https://github.com/hzwer/Practical-RIFE",
                size_bytes: 21_000_000,
            },
        }
    }
}

/// Format bytes as "10.5 MB".
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Default model directory: the override variable if set, otherwise
/// `<cache dir>/video-upscaler-pro/models`.
pub fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("video-upscaler-pro")
        .join("models")
}

/// Locates model files on disk.
#[derive(Debug, Clone)]
pub struct ModelStore {
    model_dir: PathBuf,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(default_model_dir())
    }
}

impl ModelStore {
    /// Create a store rooted at `model_dir`.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Returns the path to a cached model, or `ModelNotFound`.
    pub fn ensure_model(&self, model: ModelId) -> AiResult<PathBuf> {
        let local_path = self.model_path(model);

        if local_path.is_file() {
            debug!(model = ?model, path = %local_path.display(), "Model already cached");
            return Ok(local_path);
        }

        std::fs::create_dir_all(&self.model_dir)?;

        let spec = model.spec();
        info!(
            model = model.key(),
            url = spec.url,
            size = %format_bytes(spec.size_bytes),
            "Model not cached, place the converted file in the model directory"
        );
        Err(AiError::ModelNotFound {
            model_id: model.key().to_string(),
            path: local_path.display().to_string(),
        })
    }

    /// Check if a model is already cached locally.
    pub fn is_cached(&self, model: ModelId) -> bool {
        self.model_path(model).is_file()
    }

    /// Models present in the directory.
    pub fn cached_models(&self) -> Vec<ModelId> {
        ModelId::ALL
            .into_iter()
            .filter(|m| self.is_cached(*m))
            .collect()
    }

    /// Get the local path for a model (may not exist yet).
    pub fn model_path(&self, model: ModelId) -> PathBuf {
        self.model_dir.join(model.spec().filename)
    }

    /// Get the model directory path.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}
