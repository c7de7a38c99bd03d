//! A render graph backed by FFmpeg.
//!
//! [`FfmpegGraph::render_file`] probes a media file and builds the graph a
//! player would: one source node with an output pin per stream, a decoder
//! node behind each pin, and a renderer at the end of every chain. Splicing
//! an interceptor in front of a renderer makes the decoder deliver that
//! stream in the interceptor's canonical format (RGB24 through the software
//! scaler, packed signed 16-bit PCM through the resampler).
//!
//! Playback happens on a worker thread that opens its own demuxer, so no
//! FFmpeg context ever crosses a thread boundary. Streams whose chain has no
//! interceptor are not decoded at all.
//!
//! FFmpeg's own console output is controlled separately from the `log`
//! facade; see [`set_ffmpeg_log_level`].

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::{Audio as AudioDecoder, Video as VideoDecoder},
    format::{Pixel, Sample, sample::Type as SampleType},
    frame::{Audio as AudioFrame, Video as VideoFrame},
    media::Type,
    software::{
        resampling::Context as ResamplingContext,
        scaling::{Context as ScalingContext, Flags as ScalingFlags},
    },
    util::log::Level,
};

use super::{
    AudioFormat, CanonicalFormat, Completion, MediaGraph, MediaType, NodeId, PinDirection, PinId,
    PixelLayout, SampleCallback, SampleLayout, TimeFormat, VideoFormat,
    topology::{NodeRole, Playback, Topology},
};
use crate::{conversion, error::GrabError};

/// A file rendered into a decode graph. See the [module documentation](self).
pub struct FfmpegGraph {
    path: PathBuf,
    topology: Topology,
    /// Source output pin → FFmpeg stream index.
    streams: HashMap<PinId, usize>,
    clock_enabled: bool,
    media_time: Option<i64>,
    frame_count: Option<i64>,
    playback: Option<Playback>,
}

impl Debug for FfmpegGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegGraph")
            .field("path", &self.path)
            .field("nodes", &self.topology.nodes().len())
            .field("streams", &self.streams.len())
            .field("clock_enabled", &self.clock_enabled)
            .field("media_time", &self.media_time)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl FfmpegGraph {
    /// Probe `path` and build its default playback graph.
    ///
    /// # Errors
    ///
    /// [`GrabError::FileOpen`] if FFmpeg cannot be initialised, the file
    /// cannot be opened, or a stream's decoder cannot be created.
    pub fn render_file<P: AsRef<Path>>(path: P) -> Result<Self, GrabError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Rendering media file: {}", path.display());

        let open_error = |reason: String| GrabError::FileOpen {
            path: path.clone(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;
        let input = ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let mut offers = Vec::new();
        let mut frame_count = None;
        for stream in input.streams() {
            let index = stream.index();
            let parameters = stream.parameters();
            let medium = parameters.medium();
            let media = match medium {
                Type::Video => {
                    let decoder = CodecContext::from_parameters(parameters)
                        .and_then(|context| context.decoder().video())
                        .map_err(|error| {
                            open_error(format!(
                                "Failed to create video decoder for stream {index}: {error}"
                            ))
                        })?;
                    if frame_count.is_none() && stream.frames() > 0 {
                        frame_count = Some(stream.frames());
                    }
                    MediaType::Video(VideoFormat {
                        width: decoder.width(),
                        height: decoder.height(),
                        layout: PixelLayout::Native(format!("{:?}", decoder.format()).to_lowercase()),
                        frame_interval: frame_interval(stream.avg_frame_rate(), stream.rate()),
                    })
                }
                Type::Audio => {
                    let decoder = CodecContext::from_parameters(parameters)
                        .and_then(|context| context.decoder().audio())
                        .map_err(|error| {
                            open_error(format!(
                                "Failed to create audio decoder for stream {index}: {error}"
                            ))
                        })?;
                    MediaType::Audio(AudioFormat {
                        channels: decoder.channels(),
                        sample_rate: decoder.rate(),
                        bits_per_sample: (decoder.format().bytes() * 8) as u16,
                        layout: SampleLayout::Native(format!("{:?}", decoder.format()).to_lowercase()),
                    })
                }
                other => MediaType::Other(format!("{other:?}").to_lowercase()),
            };
            offers.push((index, media));
        }

        let duration_microseconds = input.duration();
        let media_time = (duration_microseconds > 0).then(|| duration_microseconds * 10);

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut topology = Topology::new();
        let source = topology.add_node(
            format!("Source: {file_name}"),
            NodeRole::Source,
            0,
            offers.iter().map(|(_, media)| Some(media.clone())).collect(),
        );

        let mut streams = HashMap::new();
        for (pin_index, (stream_index, media)) in offers.into_iter().enumerate() {
            let source_pin = PinId {
                node: source,
                index: pin_index,
            };
            streams.insert(source_pin, stream_index);

            let label = media.kind();
            let decoder = topology.add_node(
                format!("Decoder (stream {stream_index})"),
                NodeRole::Transform,
                1,
                vec![Some(media)],
            );
            let renderer = topology.add_node(
                format!("Renderer ({label}, stream {stream_index})"),
                NodeRole::Renderer,
                1,
                Vec::new(),
            );
            topology.connect(source_pin, PinId { node: decoder, index: 0 }, negotiate)?;
            topology.connect(
                PinId { node: decoder, index: 1 },
                PinId { node: renderer, index: 0 },
                negotiate,
            )?;
        }

        log::info!(
            "Rendered {} ({} streams, {} nodes)",
            path.display(),
            streams.len(),
            topology.nodes().len()
        );

        Ok(Self {
            path,
            topology,
            streams,
            clock_enabled: true,
            media_time,
            frame_count,
            playback: None,
        })
    }

    /// Path of the rendered file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the reference clock is currently enabled.
    pub fn clock_enabled(&self) -> bool {
        self.clock_enabled
    }
}

/// FFmpeg converts any decoded stream to the requested canonical layout.
fn negotiate(offered: &MediaType, requested: CanonicalFormat) -> MediaType {
    match (offered, requested) {
        (MediaType::Video(video), CanonicalFormat::Rgb24) => MediaType::Video(VideoFormat {
            layout: PixelLayout::Rgb24,
            ..video.clone()
        }),
        (MediaType::Audio(audio), CanonicalFormat::Pcm) => MediaType::Audio(AudioFormat {
            bits_per_sample: 16,
            layout: SampleLayout::Pcm,
            ..audio.clone()
        }),
        _ => offered.clone(),
    }
}

/// Average time per frame in 100 ns units, or 0 when no rate is known.
fn frame_interval(average: Rational, fallback: Rational) -> i64 {
    [average, fallback]
        .into_iter()
        .find(|rate| rate.numerator() > 0 && rate.denominator() > 0)
        .map(|rate| {
            (10_000_000.0 * f64::from(rate.denominator()) / f64::from(rate.numerator())).round()
                as i64
        })
        .unwrap_or(0)
}

/// One stream the worker decodes, with the callbacks its samples go to.
struct StreamPlan {
    stream_index: usize,
    target: MediaType,
    callbacks: Vec<Arc<dyn SampleCallback>>,
}

enum Converter {
    Video {
        decoder: VideoDecoder,
        scaler: ScalingContext,
        width: u32,
        height: u32,
        converted: VideoFrame,
    },
    Audio {
        decoder: AudioDecoder,
        resampler: ResamplingContext,
        bytes_per_frame: usize,
        converted: AudioFrame,
    },
}

struct ActiveStream {
    converter: Converter,
    time_base: f64,
    start_pts: i64,
    callbacks: Vec<Arc<dyn SampleCallback>>,
}

/// Wall-clock pacing of deliveries against presentation time.
struct Pacer {
    enabled: bool,
    started: Instant,
}

impl Pacer {
    fn wait_until(&self, sample_time: f64) {
        if !self.enabled || sample_time <= 0.0 {
            return;
        }
        let due = Duration::from_secs_f64(sample_time);
        if let Some(remaining) = due.checked_sub(self.started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}

impl ActiveStream {
    fn open(input: &ffmpeg_next::format::context::Input, plan: StreamPlan) -> Result<Self, GrabError> {
        let stream = input.stream(plan.stream_index).ok_or_else(|| {
            GrabError::PipelineError(format!("stream {} vanished from input", plan.stream_index))
        })?;
        let context = CodecContext::from_parameters(stream.parameters())?;

        let converter = match &plan.target {
            MediaType::Video(video) => {
                let decoder = context.decoder().video()?;
                let scaler = ScalingContext::get(
                    decoder.format(),
                    decoder.width(),
                    decoder.height(),
                    Pixel::RGB24,
                    video.width,
                    video.height,
                    ScalingFlags::BILINEAR,
                )?;
                Converter::Video {
                    decoder,
                    scaler,
                    width: video.width,
                    height: video.height,
                    converted: VideoFrame::empty(),
                }
            }
            MediaType::Audio(audio) => {
                let decoder = context.decoder().audio()?;
                let resampler = ResamplingContext::get(
                    decoder.format(),
                    decoder.channel_layout(),
                    decoder.rate(),
                    Sample::I16(SampleType::Packed),
                    decoder.channel_layout(),
                    decoder.rate(),
                )?;
                Converter::Audio {
                    decoder,
                    resampler,
                    bytes_per_frame: 2 * usize::from(audio.channels),
                    converted: AudioFrame::empty(),
                }
            }
            MediaType::Other(name) => {
                return Err(GrabError::PipelineError(format!(
                    "cannot decode {name} stream {}",
                    plan.stream_index
                )));
            }
        };

        let start_time = stream.start_time();
        Ok(Self {
            converter,
            time_base: f64::from(stream.time_base()),
            start_pts: if start_time == i64::MIN { 0 } else { start_time },
            callbacks: plan.callbacks,
        })
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<(), ffmpeg_next::Error> {
        match &mut self.converter {
            Converter::Video { decoder, .. } => decoder.send_packet(packet),
            Converter::Audio { decoder, .. } => decoder.send_packet(packet),
        }
    }

    fn send_eof(&mut self) -> Result<(), ffmpeg_next::Error> {
        match &mut self.converter {
            Converter::Video { decoder, .. } => decoder.send_eof(),
            Converter::Audio { decoder, .. } => decoder.send_eof(),
        }
    }

    fn sample_time(&self, pts: Option<i64>) -> f64 {
        let pts = pts.unwrap_or(self.start_pts);
        (pts - self.start_pts) as f64 * self.time_base
    }

    /// Deliver every frame the decoder has ready.
    fn drain(&mut self, pacer: &Pacer, stop: &AtomicBool) -> Result<(), GrabError> {
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            let (sample_time, buffer) = match &mut self.converter {
                Converter::Video {
                    decoder,
                    scaler,
                    width,
                    height,
                    converted,
                } => {
                    let mut decoded = VideoFrame::empty();
                    if decoder.receive_frame(&mut decoded).is_err() {
                        return Ok(());
                    }
                    scaler.run(&decoded, converted)?;
                    let buffer = conversion::pack_rows(
                        converted.data(0),
                        converted.stride(0),
                        *width as usize * 3,
                        *height as usize,
                    );
                    (decoded.pts(), buffer)
                }
                Converter::Audio {
                    decoder,
                    resampler,
                    bytes_per_frame,
                    converted,
                } => {
                    let mut decoded = AudioFrame::empty();
                    if decoder.receive_frame(&mut decoded).is_err() {
                        return Ok(());
                    }
                    resampler.run(&decoded, converted)?;
                    let length = converted.samples() * *bytes_per_frame;
                    let data = converted.data(0);
                    let buffer = data[..length.min(data.len())].to_vec();
                    (decoded.pts(), buffer)
                }
            };

            let sample_time = self.sample_time(sample_time);
            pacer.wait_until(sample_time);
            for callback in &self.callbacks {
                if let Err(error) = callback.on_sample(sample_time, Some(&buffer)) {
                    log::debug!("Sample at {sample_time:.3}s rejected: {error}");
                }
            }
        }
    }
}

fn decode(
    path: &Path,
    plans: Vec<StreamPlan>,
    clock_enabled: bool,
    stop: &AtomicBool,
) -> Result<(), GrabError> {
    let mut input = ffmpeg_next::format::input(&path)?;

    let mut active = HashMap::new();
    for plan in plans {
        let stream_index = plan.stream_index;
        active.insert(stream_index, ActiveStream::open(&input, plan)?);
    }

    let pacer = Pacer {
        enabled: clock_enabled,
        started: Instant::now(),
    };

    for (stream, packet) in input.packets() {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(decoding) = active.get_mut(&stream.index()) else {
            continue;
        };
        if let Err(error) = decoding.send_packet(&packet) {
            log::warn!("Dropping packet on stream {}: {error}", stream.index());
            continue;
        }
        decoding.drain(&pacer, stop)?;
    }

    for decoding in active.values_mut() {
        decoding.send_eof()?;
        decoding.drain(&pacer, stop)?;
    }
    Ok(())
}

impl MediaGraph for FfmpegGraph {
    fn nodes(&self) -> Result<Vec<NodeId>, GrabError> {
        Ok(self.topology.nodes())
    }

    fn node_name(&self, node: NodeId) -> Result<String, GrabError> {
        self.topology.node_name(node)
    }

    fn pins(&self, node: NodeId) -> Result<Vec<PinId>, GrabError> {
        self.topology.pins(node)
    }

    fn pin_direction(&self, pin: PinId) -> Result<PinDirection, GrabError> {
        self.topology.pin_direction(pin)
    }

    fn connected_to(&self, pin: PinId) -> Result<Option<PinId>, GrabError> {
        self.topology.connected_to(pin)
    }

    fn connection_media_type(&self, pin: PinId) -> Result<MediaType, GrabError> {
        self.topology.connection_media_type(pin)
    }

    fn add_interceptor(&mut self, requested: CanonicalFormat) -> Result<NodeId, GrabError> {
        Ok(self.topology.add_interceptor(requested))
    }

    fn set_sample_callback(
        &mut self,
        interceptor: NodeId,
        callback: Arc<dyn SampleCallback>,
    ) -> Result<(), GrabError> {
        self.topology.set_callback(interceptor, Some(callback))
    }

    fn clear_sample_callback(&mut self, interceptor: NodeId) -> Result<(), GrabError> {
        self.topology.set_callback(interceptor, None)
    }

    fn add_discard_sink(&mut self) -> Result<NodeId, GrabError> {
        Ok(self.topology.add_discard_sink())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), GrabError> {
        self.topology.remove_node(node)
    }

    fn connect(&mut self, output: PinId, input: PinId) -> Result<(), GrabError> {
        self.topology.connect(output, input, negotiate)
    }

    fn disconnect(&mut self, pin: PinId) -> Result<(), GrabError> {
        self.topology.disconnect(pin)
    }

    fn set_clock_enabled(&mut self, enabled: bool) -> Result<(), GrabError> {
        self.clock_enabled = enabled;
        Ok(())
    }

    fn run(&mut self) -> Result<(), GrabError> {
        if self.playback.as_ref().is_some_and(|p| !p.is_finished()) {
            return Err(GrabError::PipelineError(
                "graph is already running".to_string(),
            ));
        }

        let mut plans = Vec::new();
        for source_pin in self.topology.source_pins() {
            let chain = self.topology.chain_from(source_pin)?;
            if chain.callbacks.is_empty() {
                continue;
            }
            let (Some(&stream_index), Some(target)) =
                (self.streams.get(&chain.source_pin), chain.intercepted)
            else {
                continue;
            };
            plans.push(StreamPlan {
                stream_index,
                target,
                callbacks: chain.callbacks,
            });
        }

        log::debug!(
            "Starting FFmpeg playback of {} ({} decoded streams, clock={})",
            self.path.display(),
            plans.len(),
            self.clock_enabled
        );

        let path = self.path.clone();
        let clock_enabled = self.clock_enabled;
        let playback = Playback::spawn("ffmpeg-graph", move |stop| {
            decode(&path, plans, clock_enabled, &stop)
        })?;
        self.playback = Some(playback);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), GrabError> {
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
        Ok(())
    }

    fn wait_for_completion(&mut self, timeout: Duration) -> Result<Completion, GrabError> {
        match self.playback.as_mut() {
            Some(playback) => playback.wait(timeout),
            None => Ok(Completion::Stopped),
        }
    }

    fn duration(&self, format: TimeFormat) -> Option<i64> {
        match format {
            TimeFormat::MediaTime => self.media_time,
            TimeFormat::Frame => self.frame_count,
        }
    }
}

/// FFmpeg's internal log verbosity.
///
/// This governs what the FFmpeg libraries print to stderr while a graph is
/// rendered or decoded. It is independent of the crate's own `log` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Conditions the process cannot survive.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl From<Level> for FfmpegLogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set FFmpeg's internal log verbosity.
///
/// ```no_run
/// framegrab::set_ffmpeg_log_level(framegrab::FfmpegLogLevel::Error);
/// ```
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// FFmpeg's current internal log verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level().ok().map(FfmpegLogLevel::from)
}
