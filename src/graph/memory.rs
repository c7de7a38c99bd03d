//! An in-process, scripted media framework.
//!
//! [`MemoryGraph`] holds a render graph whose sources emit samples supplied by
//! the caller. Running it spawns one worker thread that pushes every scripted
//! sample, in presentation-time order across all streams, through the chain
//! downstream of its source pin and into the callbacks of any interceptors on
//! the way.
//!
//! # Example
//!
//! ```
//! use framegrab::{CaptureSession, MediaType, MemoryGraph, PixelLayout, ScriptedSample, VideoFormat};
//!
//! let mut graph = MemoryGraph::new();
//! let format = VideoFormat {
//!     width: 2,
//!     height: 1,
//!     layout: PixelLayout::Native("yuv420p".into()),
//!     frame_interval: 400_000,
//! };
//! let samples = (0..3)
//!     .map(|i| ScriptedSample::new(i as f64 / 25.0, vec![i as u8; 6]))
//!     .collect();
//! graph.add_rendered_stream(MediaType::Video(format), samples)?;
//!
//! let mut session = CaptureSession::from_graph(graph)?;
//! session.run()?;
//! assert_eq!(session.video_info(0)?.frames_captured, 3);
//! # Ok::<(), framegrab::GrabError>(())
//! ```

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};

use super::{
    CanonicalFormat, Completion, MediaGraph, MediaType, NodeId, PinDirection, PinId,
    SampleCallback, TimeFormat,
    topology::{NodeRole, Playback, Topology},
};
use crate::error::GrabError;

/// One sample a [`MemoryGraph`] source will emit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedSample {
    /// Presentation time in seconds.
    pub time: f64,
    /// Payload. `None` is delivered as a missing buffer.
    pub data: Option<Vec<u8>>,
}

impl ScriptedSample {
    /// A sample carrying `data` at `time` seconds.
    pub fn new(time: f64, data: Vec<u8>) -> Self {
        Self {
            time,
            data: Some(data),
        }
    }

    /// A delivery without a payload.
    pub fn missing(time: f64) -> Self {
        Self { time, data: None }
    }
}

/// A scripted render graph. See the [module documentation](self).
pub struct MemoryGraph {
    topology: Topology,
    scripts: HashMap<PinId, Vec<ScriptedSample>>,
    format_conversion: bool,
    sample_delay: Duration,
    clock_enabled: bool,
    media_time: Option<i64>,
    frame_count: Option<i64>,
    playback: Option<Playback>,
}

impl Debug for MemoryGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MemoryGraph")
            .field("nodes", &self.topology.nodes().len())
            .field("format_conversion", &self.format_conversion)
            .field("sample_delay", &self.sample_delay)
            .field("clock_enabled", &self.clock_enabled)
            .field("running", &self.playback.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// An empty graph with format conversion on, no delay, and the clock on.
    pub fn new() -> Self {
        Self {
            topology: Topology::new(),
            scripts: HashMap::new(),
            format_conversion: true,
            sample_delay: Duration::ZERO,
            clock_enabled: true,
            media_time: None,
            frame_count: None,
            playback: None,
        }
    }

    /// Whether interceptors get their canonical format on connect.
    ///
    /// When disabled, an interceptor receives the upstream type unchanged,
    /// which is how a framework that cannot convert behaves.
    #[must_use]
    pub fn with_format_conversion(mut self, enabled: bool) -> Self {
        self.format_conversion = enabled;
        self
    }

    /// Sleep for `delay` before every delivery.
    #[must_use]
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    /// Answers for [`MediaGraph::duration`]: media time in 100 ns units and
    /// total video frames.
    #[must_use]
    pub fn with_duration(mut self, media_time: Option<i64>, frame_count: Option<i64>) -> Self {
        self.media_time = media_time;
        self.frame_count = frame_count;
        self
    }

    /// Add a source node with one output pin per `(type, samples)` entry.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        streams: Vec<(MediaType, Vec<ScriptedSample>)>,
    ) -> NodeId {
        let offers = streams.iter().map(|(media, _)| Some(media.clone())).collect();
        let node = self.topology.add_node(name, NodeRole::Source, 0, offers);
        for (index, (_, samples)) in streams.into_iter().enumerate() {
            self.scripts.insert(PinId { node, index }, samples);
        }
        node
    }

    /// Add a one-input, one-output node producing `output`.
    pub fn add_transform(&mut self, name: impl Into<String>, output: MediaType) -> NodeId {
        self.topology
            .add_node(name, NodeRole::Transform, 1, vec![Some(output)])
    }

    /// Add a node with arbitrary pin counts, e.g. a splitter or a mixer.
    /// Samples only travel through its first output pin.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        inputs: usize,
        outputs: Vec<MediaType>,
    ) -> NodeId {
        let offers = outputs.into_iter().map(Some).collect();
        self.topology.add_node(name, NodeRole::Transform, inputs, offers)
    }

    /// Add a renderer: one input pin, no outputs.
    pub fn add_renderer(&mut self, name: impl Into<String>) -> NodeId {
        self.topology
            .add_node(name, NodeRole::Renderer, 1, Vec::new())
    }

    /// Add a complete `source → decoder → renderer` chain for one stream and
    /// return the renderer.
    ///
    /// # Errors
    ///
    /// Propagates the connection error if the chain cannot be wired.
    pub fn add_rendered_stream(
        &mut self,
        media: MediaType,
        samples: Vec<ScriptedSample>,
    ) -> Result<NodeId, GrabError> {
        let label = media.kind();
        let source = self.add_source(format!("{label} source"), vec![(media.clone(), samples)]);
        let decoder = self.add_transform(format!("{label} decoder"), media);
        let renderer = self.add_renderer(format!("{label} renderer"));

        let pin = |node, index| PinId { node, index };
        let passthrough = |media: &MediaType, _: CanonicalFormat| media.clone();
        self.topology
            .connect(pin(source, 0), pin(decoder, 0), passthrough)?;
        self.topology
            .connect(pin(decoder, 1), pin(renderer, 0), passthrough)?;
        Ok(renderer)
    }

    /// Whether `node` is an interceptor.
    pub fn is_interceptor(&self, node: NodeId) -> Result<bool, GrabError> {
        self.topology.is_interceptor(node)
    }

    /// Whether `node` is a discard sink.
    pub fn is_discard(&self, node: NodeId) -> Result<bool, GrabError> {
        self.topology.is_discard(node)
    }

    /// Whether the reference clock is currently enabled.
    pub fn clock_enabled(&self) -> bool {
        self.clock_enabled
    }

    fn negotiate(conversion: bool) -> impl Fn(&MediaType, CanonicalFormat) -> MediaType {
        move |offered: &MediaType, requested: CanonicalFormat| {
            if conversion && offered.kind() == requested.kind() {
                offered.to_canonical().unwrap_or_else(|| offered.clone())
            } else {
                offered.clone()
            }
        }
    }
}

struct ScheduledSample {
    time: f64,
    data: Option<Vec<u8>>,
    callbacks: Arc<Vec<Arc<dyn SampleCallback>>>,
}

impl MediaGraph for MemoryGraph {
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
        let negotiate = Self::negotiate(self.format_conversion);
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

        let mut schedule = Vec::new();
        for source_pin in self.topology.source_pins() {
            let chain = self.topology.chain_from(source_pin)?;
            let callbacks = Arc::new(chain.callbacks);
            for sample in self.scripts.get(&source_pin).into_iter().flatten() {
                schedule.push(ScheduledSample {
                    time: sample.time,
                    data: sample.data.clone(),
                    callbacks: Arc::clone(&callbacks),
                });
            }
        }
        // Stable, so samples sharing a timestamp keep their script order.
        schedule.sort_by(|a, b| a.time.total_cmp(&b.time));

        let clock_enabled = self.clock_enabled;
        let sample_delay = self.sample_delay;
        log::debug!(
            "Starting memory graph playback ({} samples, clock={})",
            schedule.len(),
            clock_enabled
        );

        let playback = Playback::spawn("memory-graph", move |stop| {
            let started = Instant::now();
            for sample in schedule {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if clock_enabled && sample.time > 0.0 {
                    let due = Duration::from_secs_f64(sample.time);
                    if let Some(remaining) = due.checked_sub(started.elapsed()) {
                        std::thread::sleep(remaining);
                    }
                }
                if !sample_delay.is_zero() {
                    std::thread::sleep(sample_delay);
                }
                for callback in sample.callbacks.iter() {
                    if let Err(error) = callback.on_sample(sample.time, sample.data.as_deref()) {
                        log::debug!("Sample at {:.3}s rejected: {error}", sample.time);
                    }
                }
            }
            Ok(())
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
