//! Progress reporting and cancellation support.
//!
//! A capture run blocks the calling thread in a poll loop. On every poll
//! tick the session hands a [`ProgressInfo`] snapshot to the configured
//! [`ProgressCallback`] and checks its [`CancellationToken`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framegrab::{CaptureOptions, CaptureSession, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!(
//!             "{:.1}s: {} delivered, {} captured",
//!             info.elapsed.as_secs_f64(),
//!             info.samples_delivered,
//!             info.samples_captured,
//!         );
//!     }
//! }
//!
//! let mut session = CaptureSession::open("input.mp4")?;
//! let options = CaptureOptions::new().with_progress(Arc::new(PrintProgress));
//! session.run_with_options(&options)?;
//! # Ok::<(), framegrab::GrabError>(())
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::engine::SelectionEngine;

/// A snapshot of a running capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressInfo {
    /// Wall-clock time since the graph was started.
    pub elapsed: Duration,
    /// Samples delivered to all enabled engines so far.
    pub samples_delivered: u64,
    /// Buffers captured by all engines so far.
    pub samples_captured: u64,
    /// Enabled video streams that have passed the end of their selection.
    pub video_streams_done: usize,
    /// Enabled video streams.
    pub video_streams: usize,
}

/// Receives progress snapshots while a capture runs.
///
/// Callbacks run on the thread that called
/// [`run_with_options`](crate::CaptureSession::run_with_options). They
/// observe but cannot halt the run; use [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called once per poll tick and once after the run ends.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share the flag, so a token can be cancelled from any thread while
/// another thread is blocked in a capture run.
///
/// ```
/// use framegrab::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds snapshots from the session's engines and emits them.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>) -> Self {
        Self {
            callback,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn report(&self, video: &[SelectionEngine], audio: &[SelectionEngine]) {
        let enabled = || {
            video
                .iter()
                .chain(audio)
                .filter(|engine| !engine.is_disabled())
        };
        let enabled_video = || video.iter().filter(|engine| !engine.is_disabled());

        let info = ProgressInfo {
            elapsed: self.start_time.elapsed(),
            samples_delivered: enabled().map(SelectionEngine::frames_delivered).sum(),
            samples_captured: enabled().map(|engine| engine.frames_captured() as u64).sum(),
            video_streams_done: enabled_video().filter(|engine| engine.is_done()).count(),
            video_streams: enabled_video().count(),
        };
        self.callback.on_progress(&info);
    }
}
