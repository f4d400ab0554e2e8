//! Re-attaching the source audio track to an encoded video.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use upscaler_core::{Result, UpscalerError};

/// How the final output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxOutcome {
    /// Video stream combined with the source audio.
    WithAudio,
    /// Audio could not be attached; the video-only file was delivered.
    VideoOnly,
}

/// Runs FFmpeg to copy the video stream and re-encode the source audio.
#[derive(Debug, Clone)]
pub struct AudioMuxer {
    program: PathBuf,
}

impl Default for AudioMuxer {
    fn default() -> Self {
        Self::new(ffmpeg_sidecar::paths::ffmpeg_path())
    }
}

impl AudioMuxer {
    /// Use a specific muxer executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Executable used for muxing.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the executable can be found.
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Arguments for muxing `video` with the first audio track of `audio_source`.
    ///
    /// The audio map is optional (`?`), so sources without audio still mux.
    pub fn mux_args(video: &Path, audio_source: &Path, output: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-i".into(),
            video.to_string_lossy().into_owned(),
            "-i".into(),
            audio_source.to_string_lossy().into_owned(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0?".into(),
            "-shortest".into(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Mux `video` and the audio of `audio_source` into `output`.
    pub fn mux(&self, video: &Path, audio_source: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args(Self::mux_args(video, audio_source, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .output()
            .map_err(|e| UpscalerError::Encoder(format!("Failed to run audio muxer: {e}")))?;

        if !result.status.success() {
            return Err(UpscalerError::Encoder(format!(
                "Audio muxer exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Mux audio into `output`, falling back to delivering the video-only file.
///
/// On success the temporary video is removed. On any muxer failure the
/// temporary file is moved to `output` and [`MuxOutcome::VideoOnly`] is
/// returned; only a failure to deliver that file is an error.
pub fn mux_audio_or_fallback(
    video_only: &Path,
    output: &Path,
    audio_source: &Path,
    muxer: &AudioMuxer,
) -> Result<MuxOutcome> {
    if muxer.is_available() {
        match muxer.mux(video_only, audio_source, output) {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(video_only) {
                    debug!(error = %e, "Could not remove temporary video");
                }
                info!(output = %output.display(), "Audio track restored");
                return Ok(MuxOutcome::WithAudio);
            }
            Err(e) => warn!(error = %e, "Audio mux failed, output will have no audio"),
        }
    } else {
        warn!(
            muxer = %muxer.program().display(),
            "Audio muxer not available, output will have no audio"
        );
    }

    deliver(video_only, output)?;
    Ok(MuxOutcome::VideoOnly)
}

// Rename can fail across filesystems; copy then remove instead.
fn deliver(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| {
        UpscalerError::Encoder(format!(
            "Failed to move {} to {}: {e}",
            from.display(),
            to.display()
        ))
    })?;
    if let Err(e) = std::fs::remove_file(from) {
        debug!(error = %e, "Could not remove temporary video");
    }
    Ok(())
}
