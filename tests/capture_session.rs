//! Capture session integration tests against the scripted in-memory graph.

use std::time::Duration;

use framegrab::{
    AudioFormat, CaptureCounts, CaptureOptions, CaptureSession, Completion, ErrorCategory,
    GrabError, MediaGraph, MediaKind, MediaType, MemoryGraph, PixelLayout, SampleLayout,
    ScriptedSample, VideoFormat,
};

const FRAME_BYTES: usize = 2 * 2 * 3;
const AUDIO_BUFFER_BYTES: usize = 200 * 4;

fn video_type(frame_interval: i64) -> MediaType {
    MediaType::Video(VideoFormat {
        width: 2,
        height: 2,
        layout: PixelLayout::Native("yuv420p".into()),
        frame_interval,
    })
}

fn audio_type() -> MediaType {
    MediaType::Audio(AudioFormat {
        channels: 2,
        sample_rate: 8_000,
        bits_per_sample: 16,
        layout: SampleLayout::Native("s16".into()),
    })
}

/// `count` frames at 25 fps, frame `i` filled with `i`.
fn video_samples(count: usize) -> Vec<ScriptedSample> {
    (0..count)
        .map(|i| ScriptedSample::new(i as f64 / 25.0, vec![i as u8; FRAME_BYTES]))
        .collect()
}

/// `count` buffers of 200 stereo 16-bit sample frames (25 ms each).
fn audio_samples(count: usize) -> Vec<ScriptedSample> {
    (0..count)
        .map(|i| ScriptedSample::new(i as f64 * 0.025, vec![i as u8; AUDIO_BUFFER_BYTES]))
        .collect()
}

fn av_graph(frames: usize, buffers: usize) -> MemoryGraph {
    let mut graph = MemoryGraph::new();
    graph.add_rendered_stream(video_type(400_000), video_samples(frames)).unwrap();
    graph.add_rendered_stream(audio_type(), audio_samples(buffers)).unwrap();
    graph
}

fn fast_poll() -> CaptureOptions {
    CaptureOptions::new().with_poll_interval(Duration::from_millis(2))
}

// ── Full capture ───────────────────────────────────────────────────

#[test]
fn unrestricted_run_captures_everything() {
    let mut session = CaptureSession::from_graph(av_graph(10, 8)).expect("Failed to splice");
    session.run().expect("Run failed");

    assert_eq!(
        session.capture_counts(),
        CaptureCounts {
            video_streams: 1,
            audio_streams: 1
        }
    );
    assert!(!session.early_stop_occurred());

    let video = session.video_info(0).unwrap();
    assert_eq!((video.width, video.height, video.rate), (2, 2, 25));
    assert_eq!(video.frames_captured, 10);
    assert_eq!(video.frames_total, 10);
    assert!(!video.total_is_estimate);

    let audio = session.audio_info(0).unwrap();
    assert_eq!((audio.channels, audio.rate, audio.bits), (2, 8_000, 16));
    assert_eq!(audio.frames_captured, 8);
    assert_eq!(audio.frames_total, 8);
}

#[test]
fn frames_hold_the_delivered_bytes() {
    let mut session = CaptureSession::from_graph(av_graph(5, 3)).unwrap();
    session.run().unwrap();

    assert_eq!(session.video_frame(0, 3).unwrap(), vec![3u8; FRAME_BYTES]);
    assert_eq!(session.audio_frame(0, 2).unwrap(), vec![2u8; AUDIO_BUFFER_BYTES]);
    assert_eq!(
        session.frame(MediaKind::Video, 0, 0).unwrap(),
        session.video_frame(0, 0).unwrap()
    );
}

#[test]
fn info_queries_are_idempotent() {
    let mut session = CaptureSession::from_graph(av_graph(6, 2)).unwrap();
    session.run().unwrap();

    assert_eq!(session.video_info(0).unwrap(), session.video_info(0).unwrap());
    assert_eq!(session.audio_info(0).unwrap(), session.audio_info(0).unwrap());
    assert_eq!(session.capture_counts(), session.capture_counts());
}

#[test]
fn missing_buffers_are_not_counted() {
    let mut samples = video_samples(4);
    samples.insert(2, ScriptedSample::missing(0.05));
    let mut graph = MemoryGraph::new();
    graph.add_rendered_stream(video_type(400_000), samples).unwrap();

    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.run().unwrap();

    let info = session.video_info(0).unwrap();
    assert_eq!(info.frames_captured, 4);
    assert_eq!(info.frames_total, 4);
}

// ── Lookups ────────────────────────────────────────────────────────

#[test]
fn lookups_before_any_delivery_are_out_of_range() {
    let session = CaptureSession::from_graph(av_graph(3, 3)).unwrap();
    assert!(matches!(
        session.video_frame(0, 0),
        Err(GrabError::FrameOutOfRange { .. })
    ));
}

#[test]
fn bad_indices_are_reported() {
    let mut session = CaptureSession::from_graph(av_graph(3, 3)).unwrap();
    session.run().unwrap();

    let error = session.video_frame(1, 0).unwrap_err();
    assert!(matches!(
        error,
        GrabError::StreamOutOfRange {
            kind: MediaKind::Video,
            stream_index: 1,
            stream_count: 1
        }
    ));
    assert_eq!(error.category(), ErrorCategory::NotFound);

    assert!(matches!(
        session.audio_frame(0, 3),
        Err(GrabError::FrameOutOfRange {
            frame_index: 3,
            frames_captured: 3
        })
    ));
    assert!(matches!(
        session.frame(MediaKind::Unknown, 0, 0),
        Err(GrabError::InvalidArgument(_))
    ));
    assert!(session.video_info(2).is_err());
    assert!(session.audio_info(1).is_err());
}

// ── Disabling ──────────────────────────────────────────────────────

#[test]
fn disabled_video_captures_nothing() {
    let mut session = CaptureSession::from_graph(av_graph(5, 5)).unwrap();
    session.disable_video();
    session.run().unwrap();

    assert_eq!(session.capture_counts().video_streams, 0);
    assert_eq!(session.capture_counts().audio_streams, 1);
    assert_eq!(session.video_info(0).unwrap().frames_captured, 0);
    assert!(session.video_frame(0, 0).is_err());
    assert_eq!(session.audio_info(0).unwrap().frames_captured, 5);
}

#[test]
fn disabled_audio_captures_nothing() {
    let mut session = CaptureSession::from_graph(av_graph(5, 5)).unwrap();
    session.disable_audio();
    session.run().unwrap();

    assert_eq!(session.capture_counts().audio_streams, 0);
    assert_eq!(session.audio_info(0).unwrap().frames_captured, 0);
    assert_eq!(session.video_info(0).unwrap().frames_captured, 5);
}

// ── Frame indices and early stop ───────────────────────────────────

#[test]
fn satisfied_index_selection_stops_early() {
    let mut graph = av_graph(200, 200).with_sample_delay(Duration::from_millis(2));
    graph = graph.with_duration(None, Some(200));
    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.set_frame_indices(&[2, 4]).unwrap();
    session.disable_audio();

    session.run_with_options(&fast_poll()).expect("Run failed");

    assert!(session.early_stop_occurred());
    let engine = &session.video_engines()[0];
    assert!(engine.is_done());
    assert!(engine.frames_delivered() < 200);

    let info = session.video_info(0).unwrap();
    assert_eq!(info.frames_captured, 2);
    assert_eq!(info.frames_total, 200);
    // Delivery N carries frame N - 1.
    assert_eq!(session.video_frame(0, 0).unwrap(), vec![1u8; FRAME_BYTES]);
    assert_eq!(session.video_frame(0, 1).unwrap(), vec![3u8; FRAME_BYTES]);
}

#[test]
fn early_stop_estimates_total_from_media_time() {
    let mut graph = MemoryGraph::new()
        .with_sample_delay(Duration::from_millis(2))
        .with_duration(Some(80_000_000), None);
    graph.add_rendered_stream(video_type(400_000), video_samples(200)).unwrap();
    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.set_frame_indices(&[1]).unwrap();

    session.run_with_options(&fast_poll()).unwrap();

    assert!(session.early_stop_occurred());
    let info = session.video_info(0).unwrap();
    assert_eq!(info.frames_total, 200);
    assert!(info.total_is_estimate);
}

#[test]
fn enabled_audio_prevents_early_stop() {
    let graph = av_graph(20, 20).with_sample_delay(Duration::from_millis(1));
    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.set_frame_indices(&[1]).unwrap();

    session.run_with_options(&fast_poll()).unwrap();

    assert!(!session.early_stop_occurred());
    assert_eq!(session.video_info(0).unwrap().frames_captured, 1);
    assert_eq!(session.video_info(0).unwrap().frames_total, 20);
    assert_eq!(session.audio_info(0).unwrap().frames_captured, 20);
}

#[test]
fn frame_indices_leave_audio_unrestricted() {
    let mut session = CaptureSession::from_graph(av_graph(6, 4)).unwrap();
    session.set_frame_indices(&[3]).unwrap();
    session.run().unwrap();

    assert_eq!(session.video_info(0).unwrap().frames_captured, 1);
    assert_eq!(session.video_frame(0, 0).unwrap(), vec![2u8; FRAME_BYTES]);
    assert_eq!(session.audio_info(0).unwrap().frames_captured, 4);
}

#[test]
fn frame_numbers_start_at_one() {
    let mut session = CaptureSession::from_graph(av_graph(1, 1)).unwrap();
    let error = session.set_frame_indices(&[0, 2]).unwrap_err();
    assert_eq!(error.category(), ErrorCategory::InvalidArgument);
}

// ── Time window ────────────────────────────────────────────────────

#[test]
fn time_window_applies_to_every_stream() {
    let mut session = CaptureSession::from_graph(av_graph(50, 40)).unwrap();
    session.set_time_window(0.42, 0.82).unwrap();
    session.run().unwrap();

    // Frames 10..=19 start inside the window.
    let video = session.video_info(0).unwrap();
    assert_eq!(video.frames_captured, 10);
    assert_eq!(session.video_frame(0, 0).unwrap(), vec![10u8; FRAME_BYTES]);
    assert_eq!(session.video_frame(0, 9).unwrap(), vec![19u8; FRAME_BYTES]);

    // 0.4 s of 8 kHz stereo 16-bit audio, cut on whole sample frames.
    let engine = &session.audio_engines()[0];
    let captured = engine.captured_bytes();
    assert_eq!(captured % 4, 0);
    assert!(captured.abs_diff(12_800) <= 8, "captured {captured} bytes");
    assert!(engine.is_done());
    assert!(!session.early_stop_occurred());
}

#[test]
fn invalid_time_windows_are_rejected() {
    let mut session = CaptureSession::from_graph(av_graph(1, 1)).unwrap();
    for (start, stop) in [(2.0, 1.0), (1.0, 1.0), (-1.0, 2.0), (f64::NAN, 1.0)] {
        let error = session.set_time_window(start, stop).unwrap_err();
        assert_eq!(error.category(), ErrorCategory::InvalidArgument);
    }
    assert!(session.set_time_window(1.0, 0.0).is_ok());
}

#[test]
fn reconfiguring_clears_previous_captures() {
    let mut session = CaptureSession::from_graph(av_graph(4, 4)).unwrap();
    session.run().unwrap();
    assert_eq!(session.video_info(0).unwrap().frames_captured, 4);

    session.set_time_window(0.0, 0.0).unwrap();
    assert_eq!(session.video_info(0).unwrap().frames_captured, 0);
    assert_eq!(session.audio_info(0).unwrap().frames_captured, 0);

    session.run().unwrap();
    assert_eq!(session.video_info(0).unwrap().frames_captured, 4);
}

// ── Rate reconciliation ────────────────────────────────────────────

#[test]
fn unknown_rate_is_derived_from_duration() {
    let mut graph = MemoryGraph::new().with_duration(Some(20_000_000), Some(50));
    graph.add_rendered_stream(video_type(0), video_samples(3)).unwrap();
    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.run().unwrap();

    let info = session.video_info(0).unwrap();
    assert_eq!(info.rate, 25);
    assert_eq!(info.frames_total, 3);
}

#[test]
fn time_window_uses_rate_derived_from_duration() {
    let mut graph = MemoryGraph::new().with_duration(Some(20_000_000), Some(50));
    graph.add_rendered_stream(video_type(0), video_samples(50)).unwrap();
    let mut session = CaptureSession::from_graph(graph).unwrap();
    assert_eq!(session.video_engines()[0].rate(), 25);

    session.set_time_window(0.02, 1.02).unwrap();
    session.run_with_options(&fast_poll()).unwrap();

    let engine = &session.video_engines()[0];
    assert!(engine.is_done());
    let info = session.video_info(0).unwrap();
    assert_eq!(info.rate, 25);
    assert_eq!(info.frames_captured, 25);
    assert_eq!(session.video_frame(0, 0).unwrap(), vec![0u8; FRAME_BYTES]);
    assert_eq!(session.video_frame(0, 24).unwrap(), vec![24u8; FRAME_BYTES]);
}

#[test]
fn unknown_rate_without_duration_reports_one() {
    let mut graph = MemoryGraph::new();
    graph.add_rendered_stream(video_type(0), video_samples(3)).unwrap();
    let mut session = CaptureSession::from_graph(graph).unwrap();
    session.run().unwrap();

    assert_eq!(session.video_info(0).unwrap().rate, 1);
}

// ── Graph ownership ────────────────────────────────────────────────

#[test]
fn running_removes_the_clock_by_default() {
    let mut graph = av_graph(3, 0);
    assert!(graph.clock_enabled());
    {
        let mut session = CaptureSession::from_graph(&mut graph).unwrap();
        session.run().unwrap();
        assert_eq!(session.video_info(0).unwrap().frames_captured, 3);
    }
    assert!(!graph.clock_enabled());
}

#[test]
fn clock_can_be_kept() {
    let mut graph = MemoryGraph::new();
    let samples = (0..3)
        .map(|i| ScriptedSample::new(f64::from(i) * 0.01, vec![0; FRAME_BYTES]))
        .collect();
    graph.add_rendered_stream(video_type(400_000), samples).unwrap();
    {
        let mut session = CaptureSession::from_graph(&mut graph).unwrap();
        let options = fast_poll().with_clock_disabled(false);
        session.run_with_options(&options).unwrap();
        assert_eq!(session.video_info(0).unwrap().frames_captured, 3);
    }
    assert!(graph.clock_enabled());
}

#[test]
fn teardown_detaches_the_engines() {
    let mut session = CaptureSession::from_graph(av_graph(4, 2)).unwrap();
    session.run().unwrap();
    let engine = session.video_engines()[0].clone();

    let mut graph = session.teardown().expect("Teardown failed");
    assert_eq!(engine.frames_delivered(), 4);

    graph.run().unwrap();
    while graph.wait_for_completion(Duration::from_millis(50)).unwrap() == Completion::Timeout {}
    graph.stop().unwrap();

    assert_eq!(engine.frames_delivered(), 4);
    assert_eq!(engine.frames_captured(), 4);
}

#[test]
fn teardown_releases_interceptors_and_discard_sinks() {
    let session = CaptureSession::from_graph(av_graph(1, 1)).unwrap();
    let spliced: Vec<_> = session
        .splices()
        .iter()
        .flat_map(|splice| [splice.interceptor, Some(splice.discard)])
        .flatten()
        .collect();
    assert_eq!(spliced.len(), 4);

    let graph = session.teardown().expect("Teardown failed");
    let nodes = graph.nodes().unwrap();
    assert!(spliced.iter().all(|node| !nodes.contains(node)));
    assert!(
        nodes
            .iter()
            .all(|&node| !graph.is_interceptor(node).unwrap() && !graph.is_discard(node).unwrap())
    );
    // Source and decoder for each of the two streams.
    assert_eq!(nodes.len(), 4);
}

#[test]
fn splices_are_recorded() {
    let session = CaptureSession::from_graph(av_graph(1, 1)).unwrap();
    let kinds: Vec<MediaKind> = session.splices().iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Audio]);
    assert!(
        session
            .splices()
            .iter()
            .all(|splice| session.graph().is_discard(splice.discard).unwrap())
    );
}

#[test]
fn graph_without_sinks_has_no_streams() {
    let mut session = CaptureSession::from_graph(MemoryGraph::new()).unwrap();
    session.run().unwrap();
    assert_eq!(session.capture_counts(), CaptureCounts::default());
    assert!(session.video_info(0).is_err());
}

// ── Saving ─────────────────────────────────────────────────────────

#[test]
fn save_video_frame_writes_an_image() {
    let mut session = CaptureSession::from_graph(av_graph(3, 0)).unwrap();
    session.run().unwrap();

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("frame.png");
    session.save_video_frame(0, 2, &path).expect("Save failed");

    let image = image::open(&path).expect("Failed to read image").to_rgb8();
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(image.get_pixel(1, 1).0, [2, 2, 2]);
}

#[test]
fn save_audio_wav_writes_every_buffer() {
    let mut session = CaptureSession::from_graph(av_graph(0, 5)).unwrap();
    session.run().unwrap();

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("audio.wav");
    session.save_audio_wav(0, &path).expect("Save failed");

    let reader = hound::WavReader::open(&path).expect("Failed to read WAV");
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, 5 * AUDIO_BUFFER_BYTES / 2);
}

#[test]
fn saving_a_missing_frame_fails() {
    let mut session = CaptureSession::from_graph(av_graph(1, 0)).unwrap();
    session.run().unwrap();

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let result = session.save_video_frame(0, 5, directory.path().join("missing.png"));
    assert!(matches!(result, Err(GrabError::FrameOutOfRange { .. })));
}
