//! Progress and cancellation integration tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use framegrab::{
    CancellationToken, CaptureOptions, CaptureSession, GrabError, MediaType, MemoryGraph,
    PixelLayout, ProgressCallback, ProgressInfo, ScriptedSample, VideoFormat,
};

fn slow_video_graph(frames: usize, delay: Duration) -> MemoryGraph {
    let mut graph = MemoryGraph::new().with_sample_delay(delay);
    let format = MediaType::Video(VideoFormat {
        width: 1,
        height: 1,
        layout: PixelLayout::Rgb24,
        frame_interval: 400_000,
    });
    let samples = (0..frames)
        .map(|i| ScriptedSample::new(i as f64 / 25.0, vec![i as u8; 3]))
        .collect();
    graph.add_rendered_stream(format, samples).unwrap();
    graph
}

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports
            .lock()
            .expect("recorder lock poisoned")
            .push(info.clone());
    }
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_token_cancel() {
    let token = CancellationToken::new();
    token.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
}

#[test]
fn cancellation_token_default_trait() {
    let token = CancellationToken::default();
    assert!(!token.is_cancelled());
}

#[test]
fn cancelled_capture_returns_error() {
    let token = CancellationToken::new();
    token.cancel(); // Cancel immediately.

    let options = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(2))
        .with_cancellation(token);

    let mut session =
        CaptureSession::from_graph(slow_video_graph(100, Duration::from_millis(5))).unwrap();
    let result = session.run_with_options(&options);

    assert!(matches!(result, Err(GrabError::Cancelled)));
    assert!(!session.early_stop_occurred());
    // Whatever arrived before the cancel stays readable.
    assert!(session.video_info(0).unwrap().frames_captured < 100);
}

#[test]
fn cancelling_from_another_thread() {
    let token = CancellationToken::new();
    let options = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(2))
        .with_cancellation(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
    });

    let mut session =
        CaptureSession::from_graph(slow_video_graph(500, Duration::from_millis(5))).unwrap();
    let result = session.run_with_options(&options);
    canceller.join().expect("canceller panicked");

    assert!(matches!(result, Err(GrabError::Cancelled)));
}

#[test]
fn session_runs_again_after_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let cancelled = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(1))
        .with_cancellation(token);

    let mut session =
        CaptureSession::from_graph(slow_video_graph(20, Duration::from_millis(2))).unwrap();
    assert!(session.run_with_options(&cancelled).is_err());

    session.set_frame_indices(&[]).unwrap();
    session.run().expect("Second run failed");
    assert_eq!(session.video_info(0).unwrap().frames_captured, 20);
}

// ── ProgressCallback ───────────────────────────────────────────────

#[test]
fn progress_reports_final_totals() {
    let recorder = Arc::new(Recorder::default());
    let options = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(2))
        .with_progress(recorder.clone());

    let mut session =
        CaptureSession::from_graph(slow_video_graph(20, Duration::from_millis(1))).unwrap();
    session.run_with_options(&options).unwrap();

    let reports = recorder.reports.lock().unwrap();
    let last = reports.last().expect("at least the final report is sent");
    assert_eq!(last.samples_delivered, 20);
    assert_eq!(last.samples_captured, 20);
    assert_eq!(last.video_streams, 1);
    assert_eq!(last.video_streams_done, 0);
}

#[test]
fn progress_is_monotonic() {
    let recorder = Arc::new(Recorder::default());
    let options = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(2))
        .with_progress(recorder.clone());

    let mut session =
        CaptureSession::from_graph(slow_video_graph(30, Duration::from_millis(2))).unwrap();
    session.run_with_options(&options).unwrap();

    let reports = recorder.reports.lock().unwrap();
    assert!(reports.len() > 1, "expected reports while running");
    for pair in reports.windows(2) {
        assert!(pair[0].samples_delivered <= pair[1].samples_delivered);
        assert!(pair[0].elapsed <= pair[1].elapsed);
    }
}

#[test]
fn progress_counts_finished_video_streams() {
    let recorder = Arc::new(Recorder::default());
    let options = CaptureOptions::new()
        .with_poll_interval(Duration::from_millis(2))
        .with_progress(recorder.clone());

    let mut session =
        CaptureSession::from_graph(slow_video_graph(100, Duration::from_millis(2))).unwrap();
    session.set_frame_indices(&[1, 2]).unwrap();
    session.run_with_options(&options).unwrap();

    assert!(session.early_stop_occurred());
    let reports = recorder.reports.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!(last.video_streams_done, 1);
    assert_eq!(last.samples_captured, 2);
}

#[test]
fn disabled_streams_are_not_reported() {
    let recorder = Arc::new(Recorder::default());
    let options = CaptureOptions::new().with_progress(recorder.clone());

    let mut session =
        CaptureSession::from_graph(slow_video_graph(5, Duration::ZERO)).unwrap();
    session.disable_video();
    session.run_with_options(&options).unwrap();

    let reports = recorder.reports.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!(last.video_streams, 0);
    assert_eq!(last.samples_delivered, 0);
}
