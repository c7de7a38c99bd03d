//! FFmpeg-backed graph integration tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`.

use std::path::Path;

use framegrab::{
    CaptureOptions, CaptureSession, FfmpegGraph, FfmpegLogLevel, MediaGraph, MediaKind,
    TimeFormat, introspection, set_ffmpeg_log_level,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

#[test]
fn render_file_builds_a_playback_graph() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let graph = FfmpegGraph::render_file(path).expect("Failed to render file");
    assert_eq!(graph.path(), Path::new(path));
    assert!(graph.clock_enabled());

    let nodes = graph.nodes().unwrap();
    let sinks: Vec<_> = nodes
        .iter()
        .copied()
        .filter(|&node| introspection::is_terminal_sink(&graph, node).unwrap())
        .collect();
    assert!(!sinks.is_empty(), "expected at least one renderer");
    for sink in sinks {
        assert!(graph.node_name(sink).unwrap().starts_with("Renderer"));
        assert!(introspection::connected_peer(&graph, sink).unwrap().is_some());
    }
    assert!(graph.duration(TimeFormat::MediaTime).is_some_and(|time| time > 0));
}

#[test]
fn selected_frames_are_captured_as_rgb24() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }
    set_ffmpeg_log_level(FfmpegLogLevel::Error);

    let mut session = CaptureSession::open(path).expect("Failed to open test video");
    session.set_frame_indices(&[1, 10, 20]).unwrap();
    session.disable_audio();
    session.run().expect("Capture failed");

    let info = session.video_info(0).unwrap();
    assert_eq!(info.frames_captured, 3);
    assert!(info.rate > 0);
    let frame = session.video_frame(0, 0).unwrap();
    assert_eq!(frame.len(), info.width as usize * info.height as usize * 3);
}

#[test]
fn time_window_spans_audio_and_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut session = CaptureSession::open(path).expect("Failed to open test video");
    let counts = session.capture_counts();
    session.set_time_window(0.5, 1.5).unwrap();
    session.run_with_options(&CaptureOptions::new()).expect("Capture failed");

    if counts.video_streams > 0 {
        let info = session.video_info(0).unwrap();
        assert!(info.frames_captured > 0);
        assert!(info.frames_captured as u32 <= info.rate + 1);
    }
    if counts.audio_streams > 0 {
        let info = session.audio_info(0).unwrap();
        assert_eq!(info.bits, 16);
        let engine = &session.audio_engines()[0];
        let bytes_per_second = info.rate as usize * info.channels as usize * 2;
        // About one second of audio; packet timestamps jitter a little.
        let captured = engine.captured_bytes();
        assert_eq!(captured % engine.stride(), 0);
        assert!(captured.abs_diff(bytes_per_second) <= bytes_per_second / 20);
    }
}

#[test]
fn teardown_releases_spliced_nodes() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut session = CaptureSession::open(path).expect("Failed to open test video");
    session.set_frame_indices(&[1]).unwrap();
    session.disable_audio();
    session.run().unwrap();
    let kinds: Vec<MediaKind> = session.splices().iter().map(|s| s.kind).collect();

    let graph = session.teardown().expect("Teardown failed");
    let sinks = graph
        .nodes()
        .unwrap()
        .into_iter()
        .filter(|&node| introspection::is_terminal_sink(&graph, node).unwrap())
        .count();
    assert!(!kinds.is_empty());
    assert_eq!(sinks, 0);
}
