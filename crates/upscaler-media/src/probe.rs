//! Media file probing to get metadata without full decode.
//!
//! Runs `ffprobe -print_format json` and keeps only what the pipeline
//! needs: the primary video stream, whether audio exists, and timing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use upscaler_core::{FrameRate, Result, UpscalerError, VideoMetadata};

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: PathBuf,
    /// Duration in seconds (0 when the container does not report one)
    pub duration: f64,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Audio streams
    pub audio_streams: Vec<AudioStreamInfo>,
    /// Container format
    pub format: String,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub pixel_format: String,
    /// Frame count as stored in the container, if any.
    pub frame_count: Option<u64>,
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
}

/// Information about an audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: Option<u64>,
}

// Raw ffprobe JSON. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

fn parse_num<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

/// Locate the ffprobe binary, preferring the one next to ffmpeg.
pub fn ffprobe_path() -> PathBuf {
    let ffmpeg = ffmpeg_sidecar::paths::ffmpeg_path();
    let name = if cfg!(windows) {
        "ffprobe.exe"
    } else {
        "ffprobe"
    };
    let sibling = ffmpeg.with_file_name(name);
    if sibling.is_file() {
        return sibling;
    }
    which::which("ffprobe").unwrap_or_else(|_| PathBuf::from(name))
}

impl MediaProbe {
    /// Probe a media file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(UpscalerError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let output = Command::new(ffprobe_path())
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| UpscalerError::Decoder(format!("Failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UpscalerError::Decoder(format!(
                "Could not open video file {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Self::from_ffprobe_json(path, &json)
    }

    /// Build a probe result from ffprobe's JSON output.
    pub fn from_ffprobe_json(path: &Path, json: &str) -> Result<Self> {
        let raw: ProbeOutput = serde_json::from_str(json)
            .map_err(|e| UpscalerError::Serialization(format!("Invalid ffprobe output: {e}")))?;

        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();

        for stream in &raw.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    let frame_rate = stream
                        .r_frame_rate
                        .as_deref()
                        .and_then(FrameRate::parse)
                        .filter(|r| r.is_valid())
                        .or_else(|| stream.avg_frame_rate.as_deref().and_then(FrameRate::parse))
                        .unwrap_or(FrameRate::ZERO);
                    video_streams.push(VideoStreamInfo {
                        index: stream.index,
                        codec: stream.codec_name.clone().unwrap_or_default(),
                        width: stream.width.unwrap_or(0),
                        height: stream.height.unwrap_or(0),
                        frame_rate,
                        pixel_format: stream.pix_fmt.clone().unwrap_or_default(),
                        frame_count: parse_num(&stream.nb_frames),
                        duration: parse_num(&stream.duration),
                        bit_rate: parse_num(&stream.bit_rate),
                    });
                }
                Some("audio") => audio_streams.push(AudioStreamInfo {
                    index: stream.index,
                    codec: stream.codec_name.clone().unwrap_or_default(),
                    sample_rate: parse_num(&stream.sample_rate).unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                    bit_rate: parse_num(&stream.bit_rate),
                }),
                _ => {}
            }
        }

        let (format, duration) = match &raw.format {
            Some(f) => (
                f.format_name.clone().unwrap_or_default(),
                parse_num(&f.duration).unwrap_or(0.0),
            ),
            None => (String::new(), 0.0),
        };

        debug!(
            path = %path.display(),
            video = video_streams.len(),
            audio = audio_streams.len(),
            "Probed media file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            duration,
            video_streams,
            audio_streams,
            format,
        })
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Check if the file has audio.
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Derive pipeline metadata from the primary video stream.
    ///
    /// When the container stores no frame count, it is estimated as
    /// `round(duration * fps)`.
    pub fn metadata(&self) -> Result<VideoMetadata> {
        let video = self.primary_video().ok_or_else(|| {
            UpscalerError::UnsupportedFormat(format!(
                "No video stream in {}",
                self.path.display()
            ))
        })?;

        if video.width == 0 || video.height == 0 {
            return Err(UpscalerError::UnsupportedFormat(format!(
                "Video stream in {} reports no dimensions",
                self.path.display()
            )));
        }

        let frame_count = match video.frame_count {
            Some(n) if n > 0 => n,
            _ => {
                let duration = video.duration.unwrap_or(self.duration);
                (duration * video.frame_rate.to_fps_f64()).round().max(0.0) as u64
            }
        };

        Ok(VideoMetadata::new(
            video.width,
            video.height,
            video.frame_rate,
            frame_count,
        ))
    }
}
