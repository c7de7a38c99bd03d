//! Per-stream sample selection.
//!
//! A [`SelectionEngine`] sits behind one interceptor node and sees every
//! sample that passes through it. For each delivery it decides whether to
//! keep the sample and which byte range of it to keep, copies that range into
//! a private buffer (the delivered buffer is only valid during the callback),
//! and appends it to an ordered capture list.
//!
//! Three policies exist, selected by configuration:
//!
//! - **Index set** ([`set_frame_indices`](SelectionEngine::set_frame_indices)):
//!   samples are numbered from 1 in delivery order; members of the set are
//!   kept whole. The first sample numbered past the largest member marks the
//!   engine done.
//! - **Time window** ([`set_time_window`](SelectionEngine::set_time_window)):
//!   the part of each sample that falls inside `[start, stop)` is kept, using
//!   the stream's rate and bytes-per-unit stride to turn times into byte
//!   offsets. A sample that starts at or past `stop` marks the engine done.
//! - **Unrestricted**: every sample is kept whole.
//!
//! # Threading
//!
//! Deliveries arrive on the framework's worker thread, one at a time.
//! Configuration and reads happen on the controlling thread, and only while
//! the graph is stopped. The `done`, `disabled` and drop counters are atomics
//! so the controller can poll them mid-run; everything else sits behind a
//! mutex that, under that contract, is never contended.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::{
    error::GrabError,
    graph::{CanonicalFormat, MediaKind, MediaType, SampleCallback},
};

/// What a single delivery did to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The engine is disabled; the sample was ignored and not counted.
    Ignored,
    /// The byte range `[offset, offset + length)` was captured.
    Captured {
        /// First captured byte within the delivered buffer.
        offset: usize,
        /// Number of bytes captured.
        length: usize,
    },
    /// The sample was counted but nothing was selected from it.
    Skipped,
    /// The stream is past its selection; nothing was captured.
    Done,
}

#[derive(Debug, Default)]
struct Selection {
    /// 1-based number of the most recent delivery in this epoch.
    frame_number: u64,
    frames: Vec<Vec<u8>>,
    indices: Vec<u64>,
    start_time: f64,
    stop_time: f64,
    last_sample_time: Option<f64>,
}

impl Selection {
    /// Start a new configuration epoch.
    fn reset(&mut self) {
        self.frame_number = 0;
        self.frames.clear();
        self.last_sample_time = None;
    }
}

#[derive(Debug)]
struct EngineShared {
    format: MediaType,
    rate: u32,
    stride: usize,
    selection: Mutex<Selection>,
    disabled: AtomicBool,
    done: AtomicBool,
    dropped: AtomicU64,
}

/// Selection state for one intercepted stream.
///
/// Cloning yields another handle to the same engine; the graph holds one as
/// its [`SampleCallback`] and the capture session holds another.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    shared: Arc<EngineShared>,
}

impl SelectionEngine {
    /// Create an engine for a stream negotiated as `format`.
    ///
    /// Video rate is derived from the frame interval (`10_000_000 /
    /// interval`, 0 when unknown) and the stride is one whole RGB24 frame.
    /// Audio rate is the sample rate and the stride is one interleaved
    /// sample across all channels.
    ///
    /// # Errors
    ///
    /// [`GrabError::UnsupportedFormat`] when `format` is not canonical or
    /// its bit depth is not a whole number of bytes.
    pub fn new(format: MediaType) -> Result<Self, GrabError> {
        let (rate, stride) = match &format {
            MediaType::Video(video) if CanonicalFormat::Rgb24.matches(&format) => {
                let rate = if video.frame_interval > 0 {
                    (10_000_000 / video.frame_interval) as u32
                } else {
                    0
                };
                (rate, video.width as usize * video.height as usize * 3)
            }
            MediaType::Audio(audio) if CanonicalFormat::Pcm.matches(&format) => {
                if audio.bits_per_sample == 0 || audio.bits_per_sample % 8 != 0 {
                    return Err(GrabError::UnsupportedFormat {
                        requested: CanonicalFormat::Pcm,
                        negotiated: format.to_string(),
                    });
                }
                let stride = audio.bits_per_sample as usize / 8 * audio.channels as usize;
                (audio.sample_rate, stride)
            }
            _ => {
                let requested = CanonicalFormat::for_kind(format.kind())
                    .unwrap_or(CanonicalFormat::Rgb24);
                return Err(GrabError::UnsupportedFormat {
                    requested,
                    negotiated: format.to_string(),
                });
            }
        };
        Ok(Self::with_timing(format, rate, stride))
    }

    /// Create an engine with an explicit rate and stride.
    pub fn with_timing(format: MediaType, rate: u32, stride: usize) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                format,
                rate,
                stride,
                selection: Mutex::new(Selection::default()),
                disabled: AtomicBool::new(false),
                done: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.shared
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one delivered sample.
    ///
    /// # Errors
    ///
    /// - [`GrabError::InvalidArgument`] for a delivery without a buffer.
    /// - [`GrabError::OutOfMemory`] when the private copy cannot be
    ///   allocated; the sample is dropped and counted in
    ///   [`dropped_samples`](Self::dropped_samples).
    pub fn deliver(&self, sample_time: f64, buffer: Option<&[u8]>) -> Result<Delivery, GrabError> {
        if self.is_disabled() {
            return Ok(Delivery::Ignored);
        }
        let buffer = buffer.ok_or_else(|| {
            GrabError::InvalidArgument("sample delivered without a buffer".to_string())
        })?;

        let mut selection = self.selection();
        selection.frame_number += 1;
        selection.last_sample_time = Some(sample_time);

        if self.is_done() {
            return Ok(Delivery::Done);
        }

        let (offset, length) = if !selection.indices.is_empty() {
            let number = selection.frame_number;
            let last = selection.indices.iter().copied().max().unwrap_or(0);
            if number > last {
                self.shared.done.store(true, Ordering::SeqCst);
                return Ok(Delivery::Done);
            }
            if selection.indices.contains(&number) {
                (0, buffer.len())
            } else {
                (0, 0)
            }
        } else if selection.stop_time != 0.0 {
            match window_bounds(
                selection.start_time,
                selection.stop_time,
                sample_time,
                self.shared.rate,
                self.shared.stride,
                buffer.len(),
            ) {
                Some(bounds) => bounds,
                None => {
                    self.shared.done.store(true, Ordering::SeqCst);
                    return Ok(Delivery::Done);
                }
            }
        } else {
            (0, buffer.len())
        };

        if length == 0 {
            return Ok(Delivery::Skipped);
        }

        let mut copy = Vec::new();
        if copy.try_reserve_exact(length).is_err() || selection.frames.try_reserve(1).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(GrabError::OutOfMemory { requested: length });
        }
        copy.extend_from_slice(&buffer[offset..offset + length]);
        selection.frames.push(copy);

        Ok(Delivery::Captured { offset, length })
    }

    /// Select samples by 1-based delivery number.
    ///
    /// Starts a new epoch: captured buffers, the delivery counter and the
    /// done flag are reset and any time window is cleared. An empty slice
    /// returns the engine to unrestricted capture.
    pub fn set_frame_indices(&self, indices: &[u64]) {
        let mut selection = self.selection();
        selection.reset();
        selection.indices = indices.to_vec();
        selection.start_time = 0.0;
        selection.stop_time = 0.0;
        self.shared.done.store(false, Ordering::SeqCst);
        self.shared.dropped.store(0, Ordering::Relaxed);
    }

    /// Select the `[start, stop)` window, in seconds.
    ///
    /// Starts a new epoch like [`set_frame_indices`](Self::set_frame_indices)
    /// and clears any index set. A `stop` of 0 returns the engine to
    /// unrestricted capture.
    pub fn set_time_window(&self, start: f64, stop: f64) {
        let mut selection = self.selection();
        selection.reset();
        selection.indices.clear();
        selection.start_time = start;
        selection.stop_time = stop;
        self.shared.done.store(false, Ordering::SeqCst);
        self.shared.dropped.store(0, Ordering::Relaxed);
    }

    /// Ignore all further deliveries.
    pub fn disable(&self) {
        self.shared.disabled.store(true, Ordering::SeqCst);
    }

    /// Whether deliveries are being ignored.
    pub fn is_disabled(&self) -> bool {
        self.shared.disabled.load(Ordering::SeqCst)
    }

    /// Whether the stream has passed the end of its selection.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::SeqCst)
    }

    /// Media kind of the stream.
    pub fn kind(&self) -> MediaKind {
        self.shared.format.kind()
    }

    /// The negotiated format this engine was created with.
    pub fn format(&self) -> &MediaType {
        &self.shared.format
    }

    /// Nominal units per second (frames for video, samples for audio).
    pub fn rate(&self) -> u32 {
        self.shared.rate
    }

    /// Bytes per unit (one frame for video, one sample frame for audio).
    pub fn stride(&self) -> usize {
        self.shared.stride
    }

    /// Deliveries counted in this epoch.
    pub fn frames_delivered(&self) -> u64 {
        self.selection().frame_number
    }

    /// Buffers captured in this epoch.
    pub fn frames_captured(&self) -> usize {
        self.selection().frames.len()
    }

    /// Presentation time of the most recent delivery in this epoch.
    pub fn last_sample_time(&self) -> Option<f64> {
        self.selection().last_sample_time
    }

    /// Samples dropped because their copy could not be allocated.
    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// A copy of captured buffer `index`.
    pub fn frame(&self, index: usize) -> Option<Vec<u8>> {
        self.selection().frames.get(index).cloned()
    }

    /// Length of captured buffer `index`.
    pub fn frame_len(&self, index: usize) -> Option<usize> {
        self.selection().frames.get(index).map(Vec::len)
    }

    /// Total bytes captured in this epoch.
    pub fn captured_bytes(&self) -> usize {
        self.selection().frames.iter().map(Vec::len).sum()
    }

    /// Call `visit` with every captured buffer, in capture order.
    pub fn for_each_frame<F>(&self, mut visit: F) -> Result<(), GrabError>
    where
        F: FnMut(usize, &[u8]) -> Result<(), GrabError>,
    {
        let selection = self.selection();
        for (index, frame) in selection.frames.iter().enumerate() {
            visit(index, frame)?;
        }
        Ok(())
    }
}

impl SampleCallback for SelectionEngine {
    fn on_sample(&self, sample_time: f64, buffer: Option<&[u8]>) -> Result<(), GrabError> {
        self.deliver(sample_time, buffer).map(|_| ())
    }
}

/// Byte range of a `length`-byte sample at `sample_time` that falls inside
/// `[start, stop)`. `None` when the sample lies entirely past `stop`.
pub(crate) fn window_bounds(
    start: f64,
    stop: f64,
    sample_time: f64,
    rate: u32,
    stride: usize,
    length: usize,
) -> Option<(usize, usize)> {
    let rate = f64::from(rate);
    let stride = stride as i64;
    let length = length as i64;

    let offset = (((start - sample_time) * rate).floor() as i64)
        .saturating_mul(stride)
        .clamp(0, length);
    let end = (((stop - sample_time) * rate).floor() as i64)
        .saturating_mul(stride)
        .min(length);

    let admitted = end - offset;
    if admitted < 0 {
        None
    } else {
        Some((offset as usize, admitted as usize))
    }
}
