//! Integration tests against the FFmpeg backend.
//!
//! Tests that spawn ffmpeg are ignored by default; run them with
//! `--ignored` on a machine that has it installed.

use crate::support::cpu_planner;
use std::path::{Path, PathBuf};
use std::process::Command;
use upscaler_ai::{BlendInterpolator, NativeRatio, TiledUpscaler};
use upscaler_core::Resolution;
use upscaler_media::{mux_audio_or_fallback, AudioMuxer, FfmpegBackend, MediaProbe, MuxOutcome};
use upscaler_pipeline::{
    inspect, FrameRateTarget, InterpolationJob, Orchestrator, PipelineConfig, UpscaleJob,
};

// ── Helpers ────────────────────────────────────────────────────

const MISSING_MUXER: &str = "/nonexistent/bin/ffmpeg";

/// One second of 64x48 test pattern at 10 fps with a sine audio track.
fn generate_clip(dir: &Path) -> PathBuf {
    let path = dir.join("source.mp4");
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10:duration=1"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=1"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest", "-y"])
        .arg(&path)
        .status()
        .expect("ffmpeg runs");
    assert!(status.success());
    path
}

fn backend(muxer: AudioMuxer) -> FfmpegBackend {
    FfmpegBackend {
        muxer,
        ..FfmpegBackend::default()
    }
}

// ── Audio fallback ─────────────────────────────────────────────

#[test]
fn missing_muxer_delivers_the_video_only_file() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("clip_temp.mp4");
    let output = dir.path().join("clip.mp4");
    std::fs::write(&video, b"encoded video").unwrap();

    let outcome = mux_audio_or_fallback(
        &video,
        &output,
        Path::new("source.mp4"),
        &AudioMuxer::new(MISSING_MUXER),
    )
    .unwrap();

    assert_eq!(outcome, MuxOutcome::VideoOnly);
    assert_eq!(std::fs::read(&output).unwrap(), b"encoded video");
    assert!(!video.exists());
}

#[test]
#[ignore = "requires ffmpeg"]
fn upscale_without_muxer_yields_playable_silent_video() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate_clip(dir.path());
    let output = dir.path().join("source_upscaled_2x.mp4");

    let mut o = Orchestrator::new(
        backend(AudioMuxer::new(MISSING_MUXER)),
        cpu_planner(),
        PipelineConfig::default(),
    );
    let mut enhancer = TiledUpscaler::new(NativeRatio::X2);
    let result = o.upscale_video(
        &UpscaleJob::new(&input, &output, 2.0),
        &mut enhancer,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output_path.as_deref(), Some(output.as_path()));
    let probe = MediaProbe::probe(&output).unwrap();
    assert!(probe.has_video());
    assert!(!probe.has_audio());
    let meta = probe.metadata().unwrap();
    assert_eq!(meta.resolution(), Resolution::new(128, 96));
}

#[test]
#[ignore = "requires ffmpeg"]
fn upscale_keeps_the_audio_track() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate_clip(dir.path());
    let output = dir.path().join("with_audio.mp4");

    let mut o = Orchestrator::new(
        FfmpegBackend::default(),
        cpu_planner(),
        PipelineConfig::default(),
    );
    let mut enhancer = TiledUpscaler::new(NativeRatio::X2);
    let result = o.upscale_video(
        &UpscaleJob::new(&input, &output, 3.0),
        &mut enhancer,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    let probe = MediaProbe::probe(&output).unwrap();
    assert!(probe.has_audio());
    assert_eq!(probe.metadata().unwrap().resolution(), Resolution::new(192, 144));
}

#[test]
#[ignore = "requires ffmpeg"]
fn interpolation_doubles_the_container_rate() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate_clip(dir.path());
    let output = dir.path().join("source_2xfps.mp4");

    let mut o = Orchestrator::new(
        FfmpegBackend::default(),
        cpu_planner(),
        PipelineConfig::default(),
    );
    let source = inspect(o.backend(), &input).unwrap();
    assert_eq!(source.fps(), 10.0);

    let result = o.interpolate_video(
        &InterpolationJob::new(&input, &output, FrameRateTarget::Multiplier(2)),
        &mut BlendInterpolator,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics.new_fps, Some(20.0));
    let out = MediaProbe::probe(&output).unwrap().metadata().unwrap();
    assert_eq!(out.fps(), 20.0);
    assert_eq!(out.resolution(), source.resolution());
    assert_eq!(result.metrics.output_frame_count, Some(source.frame_count * 2 - 1));
}
