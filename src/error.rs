//! Error types for the `framegrab` crate.
//!
//! This module defines [`GrabError`], the unified error type returned by all
//! fallible operations in the crate, and [`ErrorCategory`], the coarse
//! classification callers can match on without caring about the individual
//! variant. Errors carry context (stream indices, node ids, formats) so that a
//! failed splice or lookup can be diagnosed from the message alone.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use hound::Error as WavError;
use image::ImageError;
use thiserror::Error;

use crate::graph::{CanonicalFormat, MediaKind, NodeId};

/// The unified error type for all `framegrab` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GrabError {
    /// The media file could not be opened or rendered into a graph.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::CaptureSession::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// An argument was null, empty, or outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested stream index does not exist for this media kind.
    #[error("{kind} stream {stream_index} is out of range (session has {stream_count})")]
    StreamOutOfRange {
        /// Media kind of the stream list that was indexed.
        kind: MediaKind,
        /// Requested stream index.
        stream_index: usize,
        /// Number of streams of that kind.
        stream_count: usize,
    },

    /// The requested captured frame does not exist.
    #[error("Captured frame {frame_index} is out of range ({frames_captured} captured)")]
    FrameOutOfRange {
        /// Requested index into the captured buffer list.
        frame_index: usize,
        /// Number of buffers the engine holds.
        frames_captured: usize,
    },

    /// A node id did not refer to a node in the graph.
    #[error("No such node in graph: {0}")]
    NodeNotFound(NodeId),

    /// The interceptor negotiated a format other than the one it requested.
    #[error("Unsupported format: requested {requested}, negotiated {negotiated}")]
    UnsupportedFormat {
        /// Canonical format that was requested.
        requested: CanonicalFormat,
        /// Description of the format the connection ended up with.
        negotiated: String,
    },

    /// A private copy of a sample could not be allocated.
    #[error("Out of memory while copying {requested} bytes")]
    OutOfMemory {
        /// Size of the allocation that failed.
        requested: usize,
    },

    /// An operation of the underlying media framework failed.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A graph connection that the operation relies on is missing.
    #[error("Expected connection is absent: {0}")]
    Disconnected(String),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Capture cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while writing captured data.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while saving a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An error from the `hound` crate while writing a WAV file.
    #[error("WAV encoding error: {0}")]
    WavError(#[from] WavError),
}

/// Coarse classification of a [`GrabError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Null, empty, or out-of-domain input.
    InvalidArgument,
    /// A stream, frame, or node lookup failed.
    NotFound,
    /// Negotiated format diverges from the requested canonical one.
    UnsupportedFormat,
    /// Allocation failure.
    OutOfMemory,
    /// The media framework (or file I/O around it) failed.
    PipelineError,
    /// A graph connection was absent mid-operation.
    Disconnected,
    /// The caller cancelled the run.
    Cancelled,
}

impl GrabError {
    /// Classify this error.
    ///
    /// # Example
    ///
    /// ```
    /// use framegrab::{ErrorCategory, GrabError};
    ///
    /// let error = GrabError::InvalidArgument("empty index set".into());
    /// assert_eq!(error.category(), ErrorCategory::InvalidArgument);
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match self {
            GrabError::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            GrabError::StreamOutOfRange { .. }
            | GrabError::FrameOutOfRange { .. }
            | GrabError::NodeNotFound(_) => ErrorCategory::NotFound,
            GrabError::UnsupportedFormat { .. } => ErrorCategory::UnsupportedFormat,
            GrabError::OutOfMemory { .. } => ErrorCategory::OutOfMemory,
            GrabError::Disconnected(_) => ErrorCategory::Disconnected,
            GrabError::Cancelled => ErrorCategory::Cancelled,
            GrabError::FileOpen { .. }
            | GrabError::PipelineError(_)
            | GrabError::FfmpegError(_)
            | GrabError::IoError(_)
            | GrabError::ImageError(_)
            | GrabError::WavError(_) => ErrorCategory::PipelineError,
        }
    }
}

impl From<FfmpegError> for GrabError {
    fn from(error: FfmpegError) -> Self {
        GrabError::FfmpegError(error.to_string())
    }
}
