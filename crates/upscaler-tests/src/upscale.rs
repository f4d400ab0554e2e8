//! Integration tests for spatial upscaling.
//!
//! Drives `Orchestrator::upscale_video` over in-memory sources with a
//! scripted enhancer and checks what reaches the sink.

use crate::support::{
    clip, orchestrator, MemoryBackend, ProgressLog, ScriptedEnhancer, SOURCE_BLUE,
};
use std::path::Path;
use upscaler_ai::{NativeRatio, TiledUpscaler};
use upscaler_core::{ErrorKind, FrameRate, Resolution};
use upscaler_pipeline::{plan, RunState, ScaleStep, UpscaleJob};

// ── Helpers ────────────────────────────────────────────────────

fn run(
    backend: &MemoryBackend,
    job: &UpscaleJob,
    enhancer: &mut ScriptedEnhancer,
) -> (upscaler_pipeline::ProcessingResult, ProgressLog) {
    let mut log = ProgressLog::default();
    let mut o = orchestrator(backend);
    let result = o.upscale_video(job, enhancer, |done, total, eta| {
        log.calls.push((done, total, eta))
    });
    (result, log)
}

// ── Native and composed ratios ─────────────────────────────────

#[test]
fn native_four_x_upscale_of_sd_clip() {
    let backend = MemoryBackend::new();
    backend.add_source("sd.mp4", clip(640, 480, 150), true);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);

    let steps = plan(4.0, 4, Resolution::new(640, 480)).unwrap();
    assert_eq!(steps.steps(), &[ScaleStep::Enhance { ratio: NativeRatio::X4 }]);

    let (result, _) = run(
        &backend,
        &UpscaleJob::new("sd.mp4", "out/sd_upscaled_4x.mp4", 4.0),
        &mut enhancer,
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output_path.as_deref(),
        Some(Path::new("out/sd_upscaled_4x.mp4"))
    );
    assert_eq!(result.metrics.frames_processed, 150);
    assert_eq!(result.metrics.output_resolution.as_deref(), Some("2560x1920"));
    assert_eq!(result.metrics.input_resolution.as_deref(), Some("640x480"));
    assert_eq!(result.metrics.scale_factor, Some(4.0));
    assert_eq!(result.metrics.original_fps, Some(30.0));
    assert_eq!(result.metrics.new_fps, Some(30.0));
    assert_eq!(enhancer.calls, 150);

    let sink = backend.only_sink();
    assert!(sink.finished);
    assert_eq!(sink.frames(), 150);
    assert_eq!(sink.resampled, 0);
    assert_eq!(sink.spec.resolution, Resolution::new(2560, 1920));
    assert_eq!(sink.spec.frame_rate, FrameRate::FPS_30);
    assert_eq!(sink.spec.audio_source.as_deref(), Some(Path::new("sd.mp4")));
}

#[test]
fn frames_reach_the_sink_in_source_order() {
    let backend = MemoryBackend::new();
    backend.add_source("order.mp4", clip(32, 24, 40), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);

    let (result, _) = run(
        &backend,
        &UpscaleJob::new("order.mp4", "order_2x.mp4", 2.0),
        &mut enhancer,
    );
    assert!(result.success);

    let sink = backend.only_sink();
    let greens: Vec<u8> = sink.markers.iter().map(|m| m[1]).collect();
    assert_eq!(greens, (0..40).collect::<Vec<u8>>());
    assert!(sink.markers.iter().all(|m| m[2] == SOURCE_BLUE));
    assert!(sink.spec.audio_source.is_none());
}

#[test]
fn arbitrary_scale_plans_enhance_then_resize() {
    let full_hd = plan(2.5, 4, Resolution::new(1920, 1080)).unwrap();
    assert_eq!(full_hd.target(), Resolution::new(4800, 2700));
    assert_eq!(
        full_hd.steps(),
        &[
            ScaleStep::Enhance { ratio: NativeRatio::X4 },
            ScaleStep::Resize { width: 4800, height: 2700 },
        ]
    );

    // Same plan shape at a tenth of the size.
    let backend = MemoryBackend::new();
    backend.add_source("hd.mp4", clip(192, 108, 12), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("hd.mp4", "hd_2.5x.mp4", 2.5),
        &mut enhancer,
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics.output_resolution.as_deref(), Some("480x270"));
    assert_eq!(enhancer.calls, 12);
    let sink = backend.only_sink();
    assert_eq!(sink.spec.resolution, Resolution::new(480, 270));
    assert_eq!(sink.frames(), 12);
    assert_eq!(sink.resampled, 0);
}

#[test]
fn nine_x_uses_one_pass_and_a_resize() {
    let p = plan(9.0, 4, Resolution::new(320, 240)).unwrap();
    assert_eq!(p.enhancer_passes(), 1);
    assert!(p.has_resize());
    assert_eq!(p.target(), Resolution::new(2880, 2160));

    let backend = MemoryBackend::new();
    backend.add_source("small.mp4", clip(320, 240, 3), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("small.mp4", "small_9x.mp4", 9.0),
        &mut enhancer,
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(enhancer.calls, 3);
    assert_eq!(backend.only_sink().spec.resolution, Resolution::new(2880, 2160));
}

#[test]
fn sixteen_x_composes_two_native_passes() {
    let p = plan(16.0, 4, Resolution::new(40, 30)).unwrap();
    assert_eq!(p.enhancer_passes(), 2);
    assert!(!p.has_resize());

    let backend = MemoryBackend::new();
    backend.add_source("tiny.mp4", clip(40, 30, 5), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("tiny.mp4", "tiny_16x.mp4", 16.0),
        &mut enhancer,
    );

    assert!(result.success);
    assert_eq!(enhancer.calls, 10);
    assert_eq!(backend.only_sink().spec.resolution, Resolution::new(640, 480));
}

#[test]
fn small_scale_only_resamples() {
    let backend = MemoryBackend::new();
    backend.add_source("near.mp4", clip(64, 48, 4), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("near.mp4", "near_1.25x.mp4", 1.25),
        &mut enhancer,
    );

    assert!(result.success);
    assert_eq!(enhancer.calls, 0);
    let sink = backend.only_sink();
    assert_eq!(sink.spec.resolution, Resolution::new(80, 60));
    assert_eq!(sink.frames(), 4);
}

#[test]
fn tiled_upscaler_runs_end_to_end() {
    let backend = MemoryBackend::new();
    backend.add_source("real.mp4", clip(24, 16, 6), false);
    let mut enhancer = TiledUpscaler::new(NativeRatio::X2);
    let mut o = orchestrator(&backend);
    let result = o.upscale_video(
        &UpscaleJob::new("real.mp4", "real_3x.mp4", 3.0),
        &mut enhancer,
        |_, _, _| {},
    );

    assert!(result.success, "{:?}", result.error);
    let sink = backend.only_sink();
    assert_eq!(sink.spec.resolution, Resolution::new(72, 48));
    assert_eq!(sink.frames(), 6);
    assert_eq!(sink.resampled, 0);
}

// ── Resolution ceiling ─────────────────────────────────────────

#[test]
fn output_above_8k_is_rejected_before_any_work() {
    let backend = MemoryBackend::new();
    backend.add_source("fhd.mp4", clip(1920, 1080, 10), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let mut o = orchestrator(&backend);
    let result = o.upscale_video(
        &UpscaleJob::new("fhd.mp4", "fhd_8x.mp4", 8.0),
        &mut enhancer,
        |_, _, _| panic!("no progress expected"),
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert!(result.error.unwrap().contains("8K"));
    assert_eq!(enhancer.calls, 0);
    assert!(backend.sinks().is_empty());
    assert_eq!(o.state(), RunState::Failed);
}

#[test]
fn exact_8k_output_is_accepted_with_near_8k_tiling() {
    let backend = MemoryBackend::new();
    backend.add_source("fhd.mp4", clip(1920, 1080, 300), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("fhd.mp4", "fhd_4x.mp4", 4.0).with_range(0..1),
        &mut enhancer,
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics.output_resolution.as_deref(), Some("7680x4320"));
    let hints = enhancer.hints.expect("configured before streaming");
    assert_eq!(hints.batch_size, 1);
    assert_eq!(hints.tile_size, 256);
}

#[test]
fn portrait_output_under_the_pixel_ceiling_is_accepted() {
    // 3296x5856 is taller than 8K is high but has fewer pixels.
    let backend = MemoryBackend::new();
    backend.add_source("tall.mp4", clip(824, 1464, 30), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X4);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("tall.mp4", "tall_4x.mp4", 4.0).with_range(0..1),
        &mut enhancer,
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(backend.only_sink().spec.resolution, Resolution::new(3296, 5856));
}

#[test]
fn invalid_scale_is_a_validation_failure() {
    let backend = MemoryBackend::new();
    backend.add_source("a.mp4", clip(64, 48, 10), false);
    for scale in [0.0, -2.0, 16.5, f64::NAN] {
        let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
        let (result, _) = run(&backend, &UpscaleJob::new("a.mp4", "b.mp4", scale), &mut enhancer);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation), "scale {scale}");
    }
    assert!(backend.sinks().is_empty());
}

// ── Progress, reclaim and cancellation ─────────────────────────

#[test]
fn progress_fires_every_ten_frames_and_reclaims_every_fifty() {
    let backend = MemoryBackend::new();
    backend.add_source("p.mp4", clip(16, 16, 125), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, log) = run(&backend, &UpscaleJob::new("p.mp4", "p_2x.mp4", 2.0), &mut enhancer);

    assert!(result.success);
    assert_eq!(log.done_counts(), (1..=12).map(|i| i * 10).collect::<Vec<u64>>());
    assert!(log.calls.iter().all(|&(_, total, eta)| total == 125 && eta >= 0.0));
    assert_eq!(enhancer.reclaims, 2);
}

#[test]
fn cancel_stops_at_the_next_frame_boundary() {
    let backend = MemoryBackend::new();
    backend.add_source("long.mp4", clip(16, 16, 200), true);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let mut o = orchestrator(&backend);
    let cancel = o.cancel_token();
    let mut seen = Vec::new();

    let result = o.upscale_video(
        &UpscaleJob::new("long.mp4", "long_2x.mp4", 2.0),
        &mut enhancer,
        |done, _, _| {
            seen.push(done);
            if done == 20 {
                cancel.cancel();
            }
        },
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(seen, vec![10, 20]);
    assert_eq!(enhancer.calls, 20);
    assert_eq!(o.state(), RunState::Failed);

    let sink = backend.only_sink();
    assert_eq!(sink.frames(), 20);
    assert!(!sink.finished);
}

#[test]
fn enhancer_failure_fails_the_run() {
    let backend = MemoryBackend::new();
    backend.add_source("f.mp4", clip(16, 16, 10), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2).failing_on(4);
    let (result, _) = run(&backend, &UpscaleJob::new("f.mp4", "f_2x.mp4", 2.0), &mut enhancer);

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Capability));
    assert!(result.error.unwrap().contains("scripted failure"));
    let sink = backend.only_sink();
    assert_eq!(sink.frames(), 3);
    assert!(!sink.finished);
}

#[test]
fn decode_failure_is_an_io_failure() {
    let backend = MemoryBackend::new();
    backend.add_failing_source("broken.mp4", clip(16, 16, 10), 5);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("broken.mp4", "broken_2x.mp4", 2.0),
        &mut enhancer,
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Io));
    assert_eq!(enhancer.calls, 5);
}

#[test]
fn missing_input_is_an_io_failure() {
    let backend = MemoryBackend::new();
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, _) = run(&backend, &UpscaleJob::new("nope.mp4", "x.mp4", 2.0), &mut enhancer);

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Io));
    assert!(result.output_path.is_none());
}

// ── Windows and previews ───────────────────────────────────────

#[test]
fn preview_covers_the_first_five_seconds() {
    let backend = MemoryBackend::new();
    backend.add_source("movie.mp4", clip(16, 16, 900), true);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let mut o = orchestrator(&backend);
    let result = o.upscale_preview(
        Path::new("movie.mp4"),
        Path::new("movie_preview.mp4"),
        2.0,
        &mut enhancer,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.frames_processed, 150);
    assert_eq!(backend.only_sink().frames(), 150);
}

#[test]
fn preview_of_a_short_clip_processes_every_frame() {
    let backend = MemoryBackend::new();
    backend.add_source("short.mp4", clip(16, 16, 45), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let mut o = orchestrator(&backend);
    let result = o.upscale_preview(
        Path::new("short.mp4"),
        Path::new("short_preview.mp4"),
        2.0,
        &mut enhancer,
        |_, _, _| {},
    );

    assert!(result.success);
    assert_eq!(result.metrics.frames_processed, 45);
}

#[test]
fn mid_clip_range_drops_audio() {
    let backend = MemoryBackend::new();
    backend.add_source("talk.mp4", clip(16, 16, 100), true);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("talk.mp4", "talk_2x.mp4", 2.0).with_range(40..60),
        &mut enhancer,
    );

    assert!(result.success);
    let sink = backend.only_sink();
    assert_eq!(sink.frames(), 20);
    assert_eq!(sink.markers[0][1], 40);
    assert!(sink.spec.audio_source.is_none());
}

#[test]
fn empty_range_fails_without_output() {
    let backend = MemoryBackend::new();
    backend.add_source("c.mp4", clip(16, 16, 10), false);
    let mut enhancer = ScriptedEnhancer::new(NativeRatio::X2);
    let (result, _) = run(
        &backend,
        &UpscaleJob::new("c.mp4", "c_2x.mp4", 2.0).with_range(20..30),
        &mut enhancer,
    );

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Io));
    assert!(backend.sinks().is_empty());
}
