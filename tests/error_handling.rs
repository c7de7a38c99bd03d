//! Error handling integration tests.
//!
//! These tests verify that meaningful errors are returned for various
//! failure conditions.

use std::path::Path;

use framegrab::{
    CanonicalFormat, CaptureSession, ErrorCategory, GrabError, MediaKind, MemoryGraph,
};

#[test]
fn open_nonexistent_file() {
    let result = CaptureSession::open("this_file_does_not_exist.mp4");
    let error = result.unwrap_err();
    assert_eq!(error.category(), ErrorCategory::PipelineError);

    let error_message = error.to_string();
    assert!(
        error_message.contains("Failed to open media file"),
        "Error message should mention file open failure: {error_message}",
    );
    assert!(error_message.contains("this_file_does_not_exist.mp4"));
}

#[test]
fn open_invalid_file() {
    // Create a temporary file with garbage content.
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let result = CaptureSession::open(&invalid_file_path);
    assert!(
        matches!(result, Err(GrabError::FileOpen { .. })),
        "Expected a file open error for invalid media"
    );
}

#[test]
fn frame_out_of_range() {
    let path = "tests/fixtures/sample_video.mp4";
    if !Path::new(path).exists() {
        return;
    }

    let mut session = CaptureSession::open(path).expect("Failed to open test video");
    session.set_frame_indices(&[1]).expect("Failed to select frames");
    session.disable_audio();
    session.run().expect("Capture failed");

    let result = session.video_frame(0, 999_999);
    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("out of range"),
        "Error message should mention out of range: {error_message}",
    );
}

#[test]
fn stream_out_of_range_names_the_kind() {
    let session = CaptureSession::from_graph(MemoryGraph::new()).expect("Failed to splice");
    let error = session.audio_info(3).unwrap_err();
    assert_eq!(
        error.to_string(),
        "audio stream 3 is out of range (session has 0)"
    );
}

#[test]
fn categories_group_variants() {
    let cases = [
        (
            GrabError::InvalidArgument("x".into()),
            ErrorCategory::InvalidArgument,
        ),
        (
            GrabError::StreamOutOfRange {
                kind: MediaKind::Video,
                stream_index: 0,
                stream_count: 0,
            },
            ErrorCategory::NotFound,
        ),
        (
            GrabError::FrameOutOfRange {
                frame_index: 1,
                frames_captured: 0,
            },
            ErrorCategory::NotFound,
        ),
        (
            GrabError::UnsupportedFormat {
                requested: CanonicalFormat::Pcm,
                negotiated: "audio 44100 Hz 2 ch 32-bit fltp".into(),
            },
            ErrorCategory::UnsupportedFormat,
        ),
        (
            GrabError::OutOfMemory { requested: 1 << 40 },
            ErrorCategory::OutOfMemory,
        ),
        (
            GrabError::Disconnected("renderer".into()),
            ErrorCategory::Disconnected,
        ),
        (GrabError::Cancelled, ErrorCategory::Cancelled),
        (
            GrabError::PipelineError("run failed".into()),
            ErrorCategory::PipelineError,
        ),
    ];
    for (error, category) in cases {
        assert_eq!(error.category(), category, "{error}");
    }
}

#[test]
fn unsupported_format_names_both_sides() {
    let error = GrabError::UnsupportedFormat {
        requested: CanonicalFormat::Rgb24,
        negotiated: "video 2x2 yuv420p".into(),
    };
    let message = error.to_string();
    assert!(message.contains("video rgb24"), "{message}");
    assert!(message.contains("yuv420p"), "{message}");
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let error: GrabError = io.into();
    assert_eq!(error.category(), ErrorCategory::PipelineError);
    assert!(error.to_string().starts_with("I/O error"));
}

#[test]
fn saving_into_a_missing_directory_fails() {
    let mut graph = MemoryGraph::new();
    graph.add_rendered_stream(
        framegrab::MediaType::Audio(framegrab::AudioFormat {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            layout: framegrab::SampleLayout::Pcm,
        }),
        vec![framegrab::ScriptedSample::new(0.0, vec![0; 16])],
    )
    .unwrap();
    let mut session = CaptureSession::from_graph(graph).expect("Failed to splice");
    session.run().expect("Capture failed");

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("missing").join("out.wav");
    assert!(session.save_audio_wav(0, path).is_err());
}
