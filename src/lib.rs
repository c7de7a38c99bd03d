//! # framegrab
//!
//! Capture selected video frames and audio/video time windows from a media
//! pipeline into memory.
//!
//! `framegrab` taps into a render graph (sources feeding decoders feeding
//! renderers) without changing how it plays. Every terminal sink is
//! replaced: an interceptor node is spliced in front of it and the sink
//! itself is swapped for a discard sink. Each interceptor feeds a
//! [`SelectionEngine`] that decides, sample by sample, what to keep.
//!
//! ## Quick Start
//!
//! ### Grab specific frames
//!
//! ```no_run
//! use framegrab::CaptureSession;
//!
//! let mut session = CaptureSession::open("input.mp4")?;
//! session.set_frame_indices(&[1, 100, 200])?;
//! session.disable_audio();
//! session.run()?;
//!
//! let first = session.video_frame(0, 0)?; // packed RGB24
//! # Ok::<(), framegrab::GrabError>(())
//! ```
//!
//! ### Grab a time window
//!
//! ```no_run
//! use framegrab::CaptureSession;
//!
//! let mut session = CaptureSession::open("input.mp4")?;
//! session.set_time_window(10.0, 12.5)?;
//! session.run()?;
//! session.save_audio_wav(0, "window.wav")?;
//! # Ok::<(), framegrab::GrabError>(())
//! ```
//!
//! ## Selection modes
//!
//! - **Frame indices**: video frames are numbered from 1 in delivery order.
//!   Once every video stream is past its largest index and no audio is being
//!   captured, the run stops early.
//! - **Time window**: the part of each sample inside `[start, stop)` is kept,
//!   cut on whole frames (video) or whole sample frames (audio).
//! - **Unrestricted**: everything is kept.
//!
//! ## Frameworks
//!
//! The core only talks to the [`MediaGraph`] trait. [`FfmpegGraph`] renders
//! files with FFmpeg; [`MemoryGraph`] is a scripted in-process graph for
//! tests and synthetic data.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed for [`FfmpegGraph`].

pub mod config;
mod conversion;
pub mod engine;
pub mod error;
pub mod graph;
pub mod introspection;
pub mod metadata;
pub mod progress;
pub mod rewrite;
pub mod session;

pub use config::{CaptureOptions, DEFAULT_POLL_INTERVAL};
pub use engine::{Delivery, SelectionEngine};
pub use error::{ErrorCategory, GrabError};
pub use graph::{
    AudioFormat, CanonicalFormat, Completion, FfmpegGraph, MediaGraph, MediaKind, MediaType,
    MemoryGraph, NodeId, PinDirection, PinId, PixelLayout, SampleCallback, SampleLayout,
    ScriptedSample, TimeFormat, VideoFormat,
    ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level},
};
pub use metadata::{AudioInfo, CaptureCounts, VideoInfo};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use rewrite::{Splice, SplicedGraph, rewrite};
pub use session::CaptureSession;
