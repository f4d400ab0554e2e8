//! Integration tests for frame-rate interpolation.
//!
//! Exercises `Orchestrator::interpolate_video` with the marker
//! interpolator, which stamps each synthesized frame with its timestep.

use crate::support::{clip, is_interpolated, orchestrator, MarkerInterpolator, MemoryBackend};
use std::path::Path;
use upscaler_ai::{create_interpolator, BlendInterpolator, InterpolatorKind, ModelStore};
use upscaler_core::{ErrorKind, FrameRate, VideoMetadata};
use upscaler_pipeline::{FrameRateTarget, InterpolationJob, RunState};

// ── Helpers ────────────────────────────────────────────────────

fn job(input: &str, rate: FrameRateTarget) -> InterpolationJob {
    InterpolationJob::new(input, format!("{input}.out.mp4"), rate)
}

// ── Cardinality and ordering ───────────────────────────────────

#[test]
fn triple_rate_inserts_two_frames_per_pair() {
    let backend = MemoryBackend::new();
    backend.add_source("walk.mp4", clip(16, 16, 10), true);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);

    let result = o.interpolate_video(
        &job("walk.mp4", FrameRateTarget::Multiplier(3)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(o.state(), RunState::Completed);
    assert_eq!(result.metrics.fps_multiplier, Some(3));
    assert_eq!(result.metrics.original_fps, Some(30.0));
    assert_eq!(result.metrics.new_fps, Some(90.0));
    assert_eq!(result.metrics.original_frame_count, Some(10));
    assert_eq!(result.metrics.output_frame_count, Some(28));
    assert_eq!(result.metrics.frames_processed, 9);
    assert_eq!(interp.calls, 18);

    let sink = backend.only_sink();
    assert!(sink.finished);
    assert_eq!(sink.frames(), 28);
    assert_eq!(sink.spec.frame_rate.to_fps_f64(), 90.0);
    assert_eq!(sink.spec.audio_source.as_deref(), Some(Path::new("walk.mp4")));

    for (pos, marker) in sink.markers.iter().enumerate() {
        match pos % 3 {
            0 => {
                assert!(!is_interpolated(*marker), "position {pos}");
                assert_eq!(marker[1] as usize, pos / 3);
            }
            1 => assert_eq!(*marker, [255, 0, 33], "position {pos}"),
            _ => assert_eq!(*marker, [255, 0, 67], "position {pos}"),
        }
    }
}

#[test]
fn output_length_follows_pairs_times_multiplier_plus_one() {
    for (frames, m) in [(2u64, 2u32), (5, 4), (12, 3), (7, 8)] {
        let backend = MemoryBackend::new();
        backend.add_source("c.mp4", clip(8, 8, frames), false);
        let mut interp = MarkerInterpolator::default();
        let mut o = orchestrator(&backend);
        let result = o.interpolate_video(
            &job("c.mp4", FrameRateTarget::Multiplier(m)),
            &mut interp,
            |_, _, _| {},
        );

        assert!(result.success);
        let expected = (frames - 1) * m as u64 + 1;
        assert_eq!(backend.only_sink().frames(), expected, "{frames} frames at {m}x");
        assert_eq!(interp.calls, (frames - 1) * (m as u64 - 1));
    }
}

#[test]
fn single_frame_input_passes_through() {
    let backend = MemoryBackend::new();
    backend.add_source("still.mp4", clip(8, 8, 1), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let result = o.interpolate_video(
        &job("still.mp4", FrameRateTarget::Multiplier(2)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.frames_processed, 0);
    assert_eq!(backend.only_sink().frames(), 1);
    assert_eq!(interp.calls, 0);
}

// ── Rate resolution ────────────────────────────────────────────

#[test]
fn target_fps_doubles_film_rate() {
    let backend = MemoryBackend::new();
    backend.add_source("film.mp4", VideoMetadata::new(16, 16, FrameRate::FPS_24, 20), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let result = o.interpolate_video(
        &job("film.mp4", FrameRateTarget::Fps(48.0)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.fps_multiplier, Some(2));
    assert_eq!(result.metrics.new_fps, Some(48.0));
    assert_eq!(backend.only_sink().frames(), 39);
}

#[test]
fn very_high_targets_are_capped() {
    let backend = MemoryBackend::new();
    backend.add_source("fast.mp4", clip(8, 8, 5), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let result = o.interpolate_video(
        &job("fast.mp4", FrameRateTarget::Multiplier(16)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.fps_multiplier, Some(8));
    assert_eq!(result.metrics.new_fps, Some(240.0));
    assert_eq!(backend.only_sink().frames(), 33);
}

#[test]
fn multiplier_below_two_copies_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.mp4");
    std::fs::write(&input, b"container bytes").unwrap();

    for (i, rate) in [FrameRateTarget::Multiplier(1), FrameRateTarget::Fps(40.0)]
        .into_iter()
        .enumerate()
    {
        let backend = MemoryBackend::new();
        backend.add_source(&input, clip(16, 16, 30), true);
        let output = dir.path().join(format!("out_{i}.mp4"));
        let mut interp = MarkerInterpolator::default();
        let mut o = orchestrator(&backend);

        let result = o.interpolate_video(
            &InterpolationJob::new(&input, &output, rate),
            &mut interp,
            |_, _, _| {},
        );

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output_path.as_deref(), Some(output.as_path()));
        assert_eq!(result.metrics.fps_multiplier, Some(1));
        assert_eq!(result.metrics.new_fps, result.metrics.original_fps);
        assert_eq!(std::fs::read(&output).unwrap(), b"container bytes");
        assert_eq!(interp.calls, 0);
        assert!(backend.sinks().is_empty());
    }
}

#[test]
fn doubling_a_160fps_source_stays_under_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fast.mp4");
    let output = dir.path().join("fast_out.mp4");
    std::fs::write(&input, b"high rate").unwrap();

    let backend = MemoryBackend::new();
    backend.add_source(&input, VideoMetadata::new(8, 8, FrameRate::new(160, 1), 12), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);

    let result = o.interpolate_video(
        &InterpolationJob::new(&input, &output, FrameRateTarget::Multiplier(2)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics.fps_multiplier, Some(1));
    assert_eq!(result.metrics.new_fps, Some(160.0));
    assert_eq!(std::fs::read(&output).unwrap(), b"high rate");
    assert!(backend.sinks().is_empty());
    assert_eq!(interp.calls, 0);
}

#[test]
fn rates_just_under_the_cap_never_round_past_it() {
    let backend = MemoryBackend::new();
    backend.add_source("odd.mp4", VideoMetadata::new(8, 8, FrameRate::new(85, 1), 6), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);

    let result = o.interpolate_video(
        &job("odd.mp4", FrameRateTarget::Fps(239.0)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics.fps_multiplier, Some(2));
    let sink = backend.only_sink();
    assert_eq!(sink.spec.frame_rate.to_fps_f64(), 170.0);
    assert_eq!(sink.frames(), 11);
}

#[test]
fn zero_multiplier_is_rejected() {
    let backend = MemoryBackend::new();
    backend.add_source("z.mp4", clip(8, 8, 10), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let result = o.interpolate_video(
        &job("z.mp4", FrameRateTarget::Multiplier(0)),
        &mut interp,
        |_, _, _| {},
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert!(backend.sinks().is_empty());
}

// ── Progress and cancellation ──────────────────────────────────

#[test]
fn progress_counts_frame_pairs() {
    let backend = MemoryBackend::new();
    backend.add_source("pairs.mp4", clip(8, 8, 31), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let mut seen = Vec::new();

    let result = o.interpolate_video(
        &job("pairs.mp4", FrameRateTarget::Multiplier(2)),
        &mut interp,
        |done, total, _| seen.push((done, total)),
    );

    assert!(result.success);
    assert_eq!(seen, vec![(10, 30), (20, 30), (30, 30)]);
}

#[test]
fn cancelled_interpolation_leaves_sink_unfinished() {
    let backend = MemoryBackend::new();
    backend.add_source("long.mp4", clip(8, 8, 50), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);
    let cancel = o.cancel_token();

    let result = o.interpolate_video(
        &job("long.mp4", FrameRateTarget::Multiplier(2)),
        &mut interp,
        |done, _, _| {
            if done == 10 {
                cancel.cancel();
            }
        },
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    let sink = backend.only_sink();
    assert_eq!(sink.frames(), 20);
    assert!(!sink.finished);
}

#[test]
fn preview_interpolates_the_opening_seconds() {
    let backend = MemoryBackend::new();
    backend.add_source("show.mp4", clip(8, 8, 300), false);
    let mut interp = MarkerInterpolator::default();
    let mut o = orchestrator(&backend);

    let result = o.interpolate_preview(
        Path::new("show.mp4"),
        Path::new("show_preview.mp4"),
        FrameRateTarget::Multiplier(2),
        &mut interp,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.original_frame_count, Some(150));
    assert_eq!(backend.only_sink().frames(), 299);
}

// ── Built-in interpolators ─────────────────────────────────────

#[test]
fn missing_model_falls_back_with_equal_cardinality() {
    let models = tempfile::tempdir().unwrap();
    let mut fallback =
        create_interpolator(InterpolatorKind::Rife, &ModelStore::new(models.path()));
    assert_eq!(fallback.name(), "optical-flow");

    let backend = MemoryBackend::new();
    backend.add_source("real.mp4", clip(16, 16, 4), false);

    let mut o = orchestrator(&backend);
    let flow = o.interpolate_video(
        &job("real.mp4", FrameRateTarget::Multiplier(2)),
        fallback.as_mut(),
        |_, _, _| {},
    );
    let blend = o.interpolate_video(
        &job("real.mp4", FrameRateTarget::Multiplier(2)),
        &mut BlendInterpolator,
        |_, _, _| {},
    );

    assert!(flow.success, "{:?}", flow.error);
    assert!(blend.success, "{:?}", blend.error);
    let sinks = backend.sinks();
    assert_eq!(sinks.len(), 2);
    assert_eq!(sinks[0].frames(), 7);
    assert_eq!(sinks[1].frames(), 7);
    // Originals are unchanged in both runs.
    assert_eq!(sinks[0].markers[0], sinks[1].markers[0]);
    assert_eq!(sinks[0].markers[6], sinks[1].markers[6]);
}
