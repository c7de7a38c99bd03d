//! Per-stream information reported after a capture run.
//!
//! These are the values returned by
//! [`CaptureSession::video_info`](crate::CaptureSession::video_info),
//! [`CaptureSession::audio_info`](crate::CaptureSession::audio_info) and
//! [`CaptureSession::capture_counts`](crate::CaptureSession::capture_counts).
//! They are computed on demand from the engines and the graph's duration
//! answers, so asking twice between runs gives the same result.

/// Information about one intercepted video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second. Never 0; an unknown rate is reported as 1.
    pub rate: u32,
    /// Frames held in memory.
    pub frames_captured: usize,
    /// Frames in the stream: the frames delivered, or after an early stop
    /// the framework's frame count.
    pub frames_total: u64,
    /// Whether `frames_total` was estimated from media time and rate.
    pub total_is_estimate: bool,
}

/// Information about one intercepted audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct AudioInfo {
    /// Interleaved channels.
    pub channels: u16,
    /// Samples per second per channel.
    pub rate: u32,
    /// Bits per sample per channel.
    pub bits: u16,
    /// Buffers held in memory.
    pub frames_captured: usize,
    /// Buffers delivered during the run.
    pub frames_total: u64,
}

/// Number of intercepted streams per kind.
///
/// A kind whose first engine is disabled reports 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureCounts {
    /// Video streams.
    pub video_streams: usize,
    /// Audio streams.
    pub audio_streams: usize,
}
