//! The capture session controller.
//!
//! A [`CaptureSession`] owns a spliced graph and the [`SelectionEngine`]s
//! behind its interceptors. It configures the engines, runs the graph to
//! completion (or until every video selection is satisfied), and hands the
//! captured buffers back out.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::CaptureSession;
//!
//! let mut session = CaptureSession::open("input.mp4")?;
//! session.set_frame_indices(&[1, 25, 50])?;
//! session.disable_audio();
//! session.run()?;
//!
//! let info = session.video_info(0)?;
//! println!("{}x{} at {} fps", info.width, info.height, info.rate);
//! for index in 0..info.frames_captured {
//!     session.save_video_frame(0, index, format!("frame_{index}.png"))?;
//! }
//! # Ok::<(), framegrab::GrabError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::Path,
};

use crate::{
    config::CaptureOptions,
    conversion,
    engine::SelectionEngine,
    error::GrabError,
    graph::{
        Completion, FfmpegGraph, MediaGraph, MediaKind, MediaType, TimeFormat,
    },
    metadata::{AudioInfo, CaptureCounts, VideoInfo},
    progress::ProgressTracker,
    rewrite::{self, Splice},
};

/// A spliced graph plus the engines capturing from it.
///
/// `G` is the framework's graph, held for the session's lifetime. Pass
/// `&mut graph` to keep ownership with the caller; [`teardown`] hands an
/// owned graph back.
///
/// [`teardown`]: CaptureSession::teardown
pub struct CaptureSession<G: MediaGraph> {
    graph: G,
    video: Vec<SelectionEngine>,
    audio: Vec<SelectionEngine>,
    splices: Vec<Splice>,
    early_stop: bool,
    interrupted: bool,
}

impl<G: MediaGraph> Debug for CaptureSession<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CaptureSession")
            .field("video_streams", &self.video.len())
            .field("audio_streams", &self.audio.len())
            .field("splices", &self.splices.len())
            .field("early_stop", &self.early_stop)
            .finish_non_exhaustive()
    }
}

impl CaptureSession<FfmpegGraph> {
    /// Render `path` with FFmpeg and splice every audio and video stream.
    ///
    /// # Errors
    ///
    /// [`GrabError::FileOpen`] if the file cannot be rendered, or any error
    /// from [`from_graph`](CaptureSession::from_graph).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GrabError> {
        Self::from_graph(FfmpegGraph::render_file(path)?)
    }
}

impl<G: MediaGraph> CaptureSession<G> {
    /// Splice an interceptor in front of every audio and video sink of an
    /// already-built graph.
    ///
    /// # Errors
    ///
    /// The first error [`rewrite`](crate::rewrite) hits. The graph is left
    /// partially spliced and should be dropped.
    pub fn from_graph(mut graph: G) -> Result<Self, GrabError> {
        let spliced = rewrite::rewrite(&mut graph)?;
        log::info!(
            "Capture session ready: {} video, {} audio streams",
            spliced.video.len(),
            spliced.audio.len()
        );
        Ok(Self {
            graph,
            video: spliced.video,
            audio: spliced.audio,
            splices: spliced.splices,
            early_stop: false,
            interrupted: false,
        })
    }

    /// Run the graph with default [`CaptureOptions`].
    pub fn run(&mut self) -> Result<(), GrabError> {
        self.run_with_options(&CaptureOptions::default())
    }

    /// Run the graph until it completes, every enabled video selection is
    /// satisfied, or `options` cancels the run.
    ///
    /// Early stopping only happens when no audio stream is enabled, since
    /// audio engines never decide they are done on their own.
    ///
    /// # Errors
    ///
    /// - [`GrabError::Cancelled`] if the cancellation token fired. Buffers
    ///   captured up to that point stay readable.
    /// - Any framework error from starting, waiting on or stopping the graph.
    pub fn run_with_options(&mut self, options: &CaptureOptions) -> Result<(), GrabError> {
        self.early_stop = false;
        self.interrupted = false;

        if options.disable_clock {
            self.graph.set_clock_enabled(false)?;
        }
        self.graph.run()?;
        log::info!(
            "Capture started (poll every {:?})",
            options.poll_interval
        );

        let tracker = ProgressTracker::new(options.progress.clone());
        let outcome = self.poll(options, &tracker);

        // Stopping after completion rewinds the graph for the next run.
        let stopped = self.graph.stop();
        tracker.report(&self.video, &self.audio);
        outcome?;
        stopped?;

        log::info!(
            "Capture finished: {} video, {} audio buffers{}",
            self.video.iter().map(SelectionEngine::frames_captured).sum::<usize>(),
            self.audio.iter().map(SelectionEngine::frames_captured).sum::<usize>(),
            if self.early_stop { " (stopped early)" } else { "" }
        );
        Ok(())
    }

    fn poll(&mut self, options: &CaptureOptions, tracker: &ProgressTracker) -> Result<(), GrabError> {
        loop {
            match self.graph.wait_for_completion(options.poll_interval)? {
                Completion::Complete | Completion::Stopped => return Ok(()),
                Completion::Timeout => {}
            }
            tracker.report(&self.video, &self.audio);

            if options.is_cancelled() {
                log::info!("Capture cancelled");
                self.interrupted = true;
                return Err(GrabError::Cancelled);
            }
            if self.selection_satisfied() {
                log::info!("All video selections satisfied; stopping early");
                self.early_stop = true;
                self.interrupted = true;
                return Ok(());
            }
        }
    }

    /// No enabled audio stream, and every enabled video stream done.
    fn selection_satisfied(&self) -> bool {
        if self.audio.iter().any(|engine| !engine.is_disabled()) {
            return false;
        }
        self.video
            .iter()
            .filter(|engine| !engine.is_disabled())
            .all(SelectionEngine::is_done)
    }

    fn engines(&self, kind: MediaKind) -> &[SelectionEngine] {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
            MediaKind::Unknown => &[],
        }
    }

    fn engine(&self, kind: MediaKind, stream_index: usize) -> Result<&SelectionEngine, GrabError> {
        let engines = self.engines(kind);
        engines
            .get(stream_index)
            .ok_or(GrabError::StreamOutOfRange {
                kind,
                stream_index,
                stream_count: engines.len(),
            })
    }

    /// Dimensions, rate and frame counts of video stream `stream_index`.
    ///
    /// The total starts as the number of frames delivered. After an early
    /// stop it is replaced by the framework's frame count when one is
    /// available, or else estimated from the media duration and rate. The
    /// rate is the one the engine cuts time windows with.
    pub fn video_info(&self, stream_index: usize) -> Result<VideoInfo, GrabError> {
        let engine = self.engine(MediaKind::Video, stream_index)?;
        let (width, height) = match engine.format() {
            MediaType::Video(video) => (video.width, video.height),
            _ => (0, 0),
        };

        let rate = engine.rate();
        let mut frames_total = engine.frames_delivered();
        let mut total_is_estimate = false;

        let seconds = self
            .graph
            .duration(TimeFormat::MediaTime)
            .filter(|&time| time > 0)
            .map(|time| time as f64 / 10_000_000.0);

        match self.graph.duration(TimeFormat::Frame) {
            Some(frames) => {
                if self.interrupted {
                    frames_total = frames.max(0) as u64;
                }
            }
            None => {
                if let Some(seconds) = seconds.filter(|_| self.interrupted && rate > 0) {
                    frames_total = (f64::from(rate) * seconds) as u64;
                    total_is_estimate = true;
                }
            }
        }

        Ok(VideoInfo {
            width,
            height,
            rate: rate.max(1),
            frames_captured: engine.frames_captured(),
            frames_total,
            total_is_estimate,
        })
    }

    /// Channels, rate, bit depth and buffer counts of audio stream
    /// `stream_index`.
    pub fn audio_info(&self, stream_index: usize) -> Result<AudioInfo, GrabError> {
        let engine = self.engine(MediaKind::Audio, stream_index)?;
        let (channels, rate, bits) = match engine.format() {
            MediaType::Audio(audio) => (audio.channels, audio.sample_rate, audio.bits_per_sample),
            _ => (0, 0, 0),
        };
        Ok(AudioInfo {
            channels,
            rate,
            bits,
            frames_captured: engine.frames_captured(),
            frames_total: engine.frames_delivered(),
        })
    }

    /// Intercepted streams per kind, 0 for a kind whose first engine is
    /// disabled.
    pub fn capture_counts(&self) -> CaptureCounts {
        let count = |engines: &[SelectionEngine]| match engines.first() {
            Some(first) if first.is_disabled() => 0,
            _ => engines.len(),
        };
        CaptureCounts {
            video_streams: count(&self.video),
            audio_streams: count(&self.audio),
        }
    }

    /// A copy of captured buffer `frame_index` of the given stream.
    ///
    /// # Errors
    ///
    /// - [`GrabError::InvalidArgument`] for [`MediaKind::Unknown`].
    /// - [`GrabError::StreamOutOfRange`] for a bad stream index.
    /// - [`GrabError::FrameOutOfRange`] when the engine has never received a
    ///   sample or holds no buffer at `frame_index`.
    pub fn frame(
        &self,
        kind: MediaKind,
        stream_index: usize,
        frame_index: usize,
    ) -> Result<Vec<u8>, GrabError> {
        if kind == MediaKind::Unknown {
            return Err(GrabError::InvalidArgument(
                "frames can only be read from video or audio streams".to_string(),
            ));
        }
        let engine = self.engine(kind, stream_index)?;
        let out_of_range = || GrabError::FrameOutOfRange {
            frame_index,
            frames_captured: engine.frames_captured(),
        };
        if engine.frames_delivered() == 0 {
            return Err(out_of_range());
        }
        engine.frame(frame_index).ok_or_else(out_of_range)
    }

    /// [`frame`](Self::frame) for a video stream.
    pub fn video_frame(&self, stream_index: usize, frame_index: usize) -> Result<Vec<u8>, GrabError> {
        self.frame(MediaKind::Video, stream_index, frame_index)
    }

    /// [`frame`](Self::frame) for an audio stream.
    pub fn audio_frame(&self, stream_index: usize, frame_index: usize) -> Result<Vec<u8>, GrabError> {
        self.frame(MediaKind::Audio, stream_index, frame_index)
    }

    /// Capture only the listed video frames, numbered from 1 in delivery
    /// order, on every video stream. Audio streams are unaffected.
    ///
    /// Clears previously captured video buffers. An empty slice restores
    /// unrestricted capture.
    ///
    /// # Errors
    ///
    /// [`GrabError::InvalidArgument`] if an index is 0.
    pub fn set_frame_indices(&mut self, indices: &[u64]) -> Result<(), GrabError> {
        if indices.contains(&0) {
            return Err(GrabError::InvalidArgument(
                "frame numbers start at 1".to_string(),
            ));
        }
        for engine in &self.video {
            engine.set_frame_indices(indices);
        }
        Ok(())
    }

    /// Capture only `[start, stop)` seconds on every stream.
    ///
    /// Clears all captured buffers. `stop == 0.0` restores unrestricted
    /// capture.
    ///
    /// # Errors
    ///
    /// [`GrabError::InvalidArgument`] for non-finite or negative times, or a
    /// non-zero `stop` that is not after `start`.
    pub fn set_time_window(&mut self, start: f64, stop: f64) -> Result<(), GrabError> {
        if !start.is_finite() || !stop.is_finite() || start < 0.0 || stop < 0.0 {
            return Err(GrabError::InvalidArgument(format!(
                "invalid time window [{start}, {stop})"
            )));
        }
        if stop != 0.0 && stop <= start {
            return Err(GrabError::InvalidArgument(format!(
                "time window [{start}, {stop}) is empty"
            )));
        }
        for engine in self.video.iter().chain(&self.audio) {
            engine.set_time_window(start, stop);
        }
        Ok(())
    }

    /// Stop capturing video. Cannot be undone for this session.
    pub fn disable_video(&mut self) {
        for engine in &self.video {
            engine.disable();
        }
    }

    /// Stop capturing audio. Cannot be undone for this session.
    pub fn disable_audio(&mut self) {
        for engine in &self.audio {
            engine.disable();
        }
    }

    /// Whether the last run was stopped because every video selection was
    /// satisfied.
    pub fn early_stop_occurred(&self) -> bool {
        self.early_stop
    }

    /// Video engines, in sink discovery order.
    pub fn video_engines(&self) -> &[SelectionEngine] {
        &self.video
    }

    /// Audio engines, in sink discovery order.
    pub fn audio_engines(&self) -> &[SelectionEngine] {
        &self.audio
    }

    /// Every sink the session replaced.
    pub fn splices(&self) -> &[Splice] {
        &self.splices
    }

    /// The underlying graph.
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Save captured video frame `frame_index` of `stream_index` as an
    /// image. The format follows the file extension.
    pub fn save_video_frame<P: AsRef<Path>>(
        &self,
        stream_index: usize,
        frame_index: usize,
        path: P,
    ) -> Result<(), GrabError> {
        let info = self.video_info(stream_index)?;
        let buffer = self.video_frame(stream_index, frame_index)?;
        let image = conversion::rgb_image(info.width, info.height, buffer)?;
        image.save(path.as_ref())?;
        log::debug!("Saved video frame {frame_index} to {}", path.as_ref().display());
        Ok(())
    }

    /// Write every captured buffer of audio stream `stream_index`, in
    /// capture order, to a WAV file.
    pub fn save_audio_wav<P: AsRef<Path>>(
        &self,
        stream_index: usize,
        path: P,
    ) -> Result<(), GrabError> {
        let info = self.audio_info(stream_index)?;
        let engine = self.engine(MediaKind::Audio, stream_index)?;
        let mut buffers = Vec::with_capacity(info.frames_captured);
        engine.for_each_frame(|_, buffer| {
            buffers.push(buffer.to_vec());
            Ok(())
        })?;
        conversion::write_wav(
            path.as_ref(),
            info.channels,
            info.rate,
            info.bits,
            buffers.iter().map(Vec::as_slice),
        )?;
        log::debug!(
            "Saved {} audio buffers to {}",
            buffers.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Remove every interceptor and discard sink the rewrite added, then give
    /// the graph back.
    ///
    /// The decoders that fed the original sinks are left with unconnected
    /// outputs. Engine handles obtained from
    /// [`video_engines`](Self::video_engines) keep their captured buffers.
    pub fn teardown(mut self) -> Result<G, GrabError> {
        self.graph.stop()?;
        for splice in &self.splices {
            if let Some(interceptor) = splice.interceptor {
                self.graph.clear_sample_callback(interceptor)?;
                self.graph.remove_node(interceptor)?;
            }
            self.graph.remove_node(splice.discard)?;
        }
        log::debug!(
            "Capture session torn down, released {} spliced sinks",
            self.splices.len()
        );
        Ok(self.graph)
    }
}
