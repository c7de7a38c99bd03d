//! Capture run configuration.
//!
//! [`CaptureOptions`] is a builder that threads the poll interval, clock
//! handling, progress callbacks and cancellation through
//! [`CaptureSession::run_with_options`](crate::CaptureSession::run_with_options)
//! without widening its signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framegrab::{CancellationToken, CaptureOptions};
//!
//! let token = CancellationToken::new();
//! let options = CaptureOptions::new()
//!     .with_poll_interval(Duration::from_millis(20))
//!     .with_cancellation(token.clone());
//! assert_eq!(options.poll_interval(), Duration::from_millis(20));
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// How often the session checks for completion by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for one capture run.
#[derive(Clone)]
pub struct CaptureOptions {
    pub(crate) poll_interval: Duration,
    pub(crate) disable_clock: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for CaptureOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CaptureOptions")
            .field("poll_interval", &self.poll_interval)
            .field("disable_clock", &self.disable_clock)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureOptions {
    /// Defaults: 100 ms poll interval, clock disabled during the run, no
    /// progress callback, no cancellation.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            disable_clock: true,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// How long each completion wait blocks. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Whether to remove the graph's reference clock before running, so
    /// samples are delivered as fast as they decode. On by default.
    #[must_use]
    pub fn with_clock_disabled(mut self, disable: bool) -> Self {
        self.disable_clock = disable;
        self
    }

    /// Attach a progress callback, invoked on every poll tick.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token. A cancelled run stops the graph and
    /// returns [`GrabError::Cancelled`](crate::GrabError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The configured poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether the clock is removed for the run.
    pub fn clock_disabled(&self) -> bool {
        self.disable_clock
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
