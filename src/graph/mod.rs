//! The media framework boundary.
//!
//! A capture session never decodes anything itself. It drives a render graph
//! owned by some media framework through the [`MediaGraph`] trait: node
//! enumeration, pin introspection, splicing (add/remove/connect/disconnect),
//! media-type queries, playback control and duration queries.
//!
//! Two frameworks ship with the crate:
//!
//! - [`FfmpegGraph`] renders a media file into a source → decoder → renderer
//!   graph and decodes it with FFmpeg on a worker thread.
//! - [`MemoryGraph`] is a scripted, in-process graph whose sources emit
//!   caller-supplied samples. It is what the test-suite runs against and is
//!   handy for feeding synthetic data through the selection logic.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::error::GrabError;

pub mod ffmpeg;
pub mod memory;
pub(crate) mod topology;

pub use ffmpeg::FfmpegGraph;
pub use memory::{MemoryGraph, ScriptedSample};

/// Opaque handle to a node in a graph.
///
/// Handles are plain values; holding one does not keep the node alive, and
/// dropping one releases nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the graph's node table.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "node#{}", self.0)
    }
}

/// A connection point on a node, addressed by node and pin position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId {
    /// Node owning the pin.
    pub node: NodeId,
    /// Position of the pin on its node.
    pub index: usize,
}

impl Display for PinId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.node, self.index)
    }
}

/// Direction of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    /// Samples flow into the node through this pin.
    Input,
    /// Samples flow out of the node through this pin.
    Output,
}

/// Media kind carried by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video frames.
    Video,
    /// Audio sample buffers.
    Audio,
    /// Anything else (subtitles, MIDI, data streams...).
    Unknown,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Pixel layout of a video connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// Packed 8-bit RGB, 3 bytes per pixel, no row padding.
    Rgb24,
    /// Any framework-native layout, named for diagnostics.
    Native(String),
}

/// Sample layout of an audio connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampleLayout {
    /// Interleaved signed integer PCM.
    Pcm,
    /// Any framework-native layout, named for diagnostics.
    Native(String),
}

/// Format of a video connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub layout: PixelLayout,
    /// Average time per frame in 100 ns units; 0 when unknown.
    pub frame_interval: i64,
}

/// Format of an audio connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Bits per sample per channel.
    pub bits_per_sample: u16,
    /// Sample layout.
    pub layout: SampleLayout,
}

/// Media type negotiated on (or offered by) a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// A video connection.
    Video(VideoFormat),
    /// An audio connection.
    Audio(AudioFormat),
    /// Any other connection, named for diagnostics.
    Other(String),
}

impl MediaType {
    /// The media kind of this type.
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaType::Video(_) => MediaKind::Video,
            MediaType::Audio(_) => MediaKind::Audio,
            MediaType::Other(_) => MediaKind::Unknown,
        }
    }

    /// The canonical form of this type, keeping its dimensions and rates.
    ///
    /// Audio without a known bit depth becomes 16-bit PCM. Returns `None`
    /// for [`MediaType::Other`].
    pub fn to_canonical(&self) -> Option<MediaType> {
        match self {
            MediaType::Video(video) => Some(MediaType::Video(VideoFormat {
                layout: PixelLayout::Rgb24,
                ..video.clone()
            })),
            MediaType::Audio(audio) => Some(MediaType::Audio(AudioFormat {
                bits_per_sample: if audio.bits_per_sample == 0 {
                    16
                } else {
                    audio.bits_per_sample
                },
                layout: SampleLayout::Pcm,
                ..audio.clone()
            })),
            MediaType::Other(_) => None,
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaType::Video(video) => {
                let layout = match &video.layout {
                    PixelLayout::Rgb24 => "rgb24",
                    PixelLayout::Native(name) => name.as_str(),
                };
                write!(f, "video {}x{} {layout}", video.width, video.height)
            }
            MediaType::Audio(audio) => {
                let layout = match &audio.layout {
                    SampleLayout::Pcm => "pcm",
                    SampleLayout::Native(name) => name.as_str(),
                };
                write!(
                    f,
                    "audio {} Hz {} ch {}-bit {layout}",
                    audio.sample_rate, audio.channels, audio.bits_per_sample
                )
            }
            MediaType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// The fixed sample layouts an interceptor requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalFormat {
    /// Packed RGB24 video.
    Rgb24,
    /// Interleaved integer PCM audio.
    Pcm,
}

impl CanonicalFormat {
    /// The canonical format for a media kind, if it has one.
    pub fn for_kind(kind: MediaKind) -> Option<Self> {
        match kind {
            MediaKind::Video => Some(CanonicalFormat::Rgb24),
            MediaKind::Audio => Some(CanonicalFormat::Pcm),
            MediaKind::Unknown => None,
        }
    }

    /// The media kind this format belongs to.
    pub fn kind(self) -> MediaKind {
        match self {
            CanonicalFormat::Rgb24 => MediaKind::Video,
            CanonicalFormat::Pcm => MediaKind::Audio,
        }
    }

    /// Whether `media` is in this canonical layout.
    pub fn matches(self, media: &MediaType) -> bool {
        matches!(
            (self, media),
            (
                CanonicalFormat::Rgb24,
                MediaType::Video(VideoFormat {
                    layout: PixelLayout::Rgb24,
                    ..
                })
            ) | (
                CanonicalFormat::Pcm,
                MediaType::Audio(AudioFormat {
                    layout: SampleLayout::Pcm,
                    ..
                })
            )
        )
    }
}

impl Display for CanonicalFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CanonicalFormat::Rgb24 => write!(f, "video rgb24"),
            CanonicalFormat::Pcm => write!(f, "audio pcm"),
        }
    }
}

/// Receiver of the samples passing through an interceptor node.
///
/// Invoked on the framework's delivery thread, once per sample and never
/// re-entrantly for the same interceptor. `buffer` is only valid for the
/// duration of the call; `None` models a delivery without a payload.
/// Errors are for the framework's bookkeeping only and must not stop the
/// stream.
pub trait SampleCallback: Send + Sync {
    /// Handle one delivered sample with presentation time `sample_time`
    /// (seconds).
    fn on_sample(&self, sample_time: f64, buffer: Option<&[u8]>) -> Result<(), GrabError>;
}

/// Outcome of [`MediaGraph::wait_for_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// All streams reached their end.
    Complete,
    /// The timeout elapsed while playback was still running.
    Timeout,
    /// Playback is not running (never started, or stopped).
    Stopped,
}

/// Unit for [`MediaGraph::duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// 100 ns units.
    MediaTime,
    /// Video frames.
    Frame,
}

/// Operations a media framework exposes to the capture core.
///
/// Every operation reports failure through [`GrabError`]; the core checks
/// and propagates each one. Node enumeration order must be stable for an
/// unchanged graph, since stream indices are derived from it.
pub trait MediaGraph {
    /// All nodes currently in the graph, in enumeration order.
    fn nodes(&self) -> Result<Vec<NodeId>, GrabError>;

    /// Display name of a node.
    fn node_name(&self, node: NodeId) -> Result<String, GrabError>;

    /// All pins of a node, in pin order.
    fn pins(&self, node: NodeId) -> Result<Vec<PinId>, GrabError>;

    /// Direction of a pin.
    fn pin_direction(&self, pin: PinId) -> Result<PinDirection, GrabError>;

    /// The pin connected to `pin`, if any.
    fn connected_to(&self, pin: PinId) -> Result<Option<PinId>, GrabError>;

    /// Media type negotiated on the connection at `pin`.
    ///
    /// Fails with [`GrabError::Disconnected`] when the pin is unconnected.
    fn connection_media_type(&self, pin: PinId) -> Result<MediaType, GrabError>;

    /// Create an interceptor node requesting `requested` on its input and add
    /// it to the graph. The node has one input and one output pin.
    fn add_interceptor(&mut self, requested: CanonicalFormat) -> Result<NodeId, GrabError>;

    /// Route the samples passing through `interceptor` to `callback`.
    fn set_sample_callback(
        &mut self,
        interceptor: NodeId,
        callback: Arc<dyn SampleCallback>,
    ) -> Result<(), GrabError>;

    /// Detach any callback from `interceptor`, dropping the framework's
    /// reference to it.
    fn clear_sample_callback(&mut self, interceptor: NodeId) -> Result<(), GrabError>;

    /// Create a discard sink (one input, no outputs) and add it to the graph.
    fn add_discard_sink(&mut self) -> Result<NodeId, GrabError>;

    /// Remove a node, breaking all of its connections.
    fn remove_node(&mut self, node: NodeId) -> Result<(), GrabError>;

    /// Connect an output pin to an input pin, negotiating a media type.
    fn connect(&mut self, output: PinId, input: PinId) -> Result<(), GrabError>;

    /// Break the connection at `pin` (both ends). A no-op when unconnected.
    fn disconnect(&mut self, pin: PinId) -> Result<(), GrabError>;

    /// Enable or disable the reference clock. Without a clock the graph
    /// delivers as fast as it can decode.
    fn set_clock_enabled(&mut self, enabled: bool) -> Result<(), GrabError>;

    /// Start playback.
    fn run(&mut self) -> Result<(), GrabError>;

    /// Stop playback. Deliveries already dispatched may still complete.
    fn stop(&mut self) -> Result<(), GrabError>;

    /// Block for at most `timeout` waiting for playback to complete.
    fn wait_for_completion(&mut self, timeout: Duration) -> Result<Completion, GrabError>;

    /// Total duration of the rendered media, if the framework knows it.
    fn duration(&self, format: TimeFormat) -> Option<i64>;
}

impl<G: MediaGraph + ?Sized> MediaGraph for &mut G {
    fn nodes(&self) -> Result<Vec<NodeId>, GrabError> {
        (**self).nodes()
    }

    fn node_name(&self, node: NodeId) -> Result<String, GrabError> {
        (**self).node_name(node)
    }

    fn pins(&self, node: NodeId) -> Result<Vec<PinId>, GrabError> {
        (**self).pins(node)
    }

    fn pin_direction(&self, pin: PinId) -> Result<PinDirection, GrabError> {
        (**self).pin_direction(pin)
    }

    fn connected_to(&self, pin: PinId) -> Result<Option<PinId>, GrabError> {
        (**self).connected_to(pin)
    }

    fn connection_media_type(&self, pin: PinId) -> Result<MediaType, GrabError> {
        (**self).connection_media_type(pin)
    }

    fn add_interceptor(&mut self, requested: CanonicalFormat) -> Result<NodeId, GrabError> {
        (**self).add_interceptor(requested)
    }

    fn set_sample_callback(
        &mut self,
        interceptor: NodeId,
        callback: Arc<dyn SampleCallback>,
    ) -> Result<(), GrabError> {
        (**self).set_sample_callback(interceptor, callback)
    }

    fn clear_sample_callback(&mut self, interceptor: NodeId) -> Result<(), GrabError> {
        (**self).clear_sample_callback(interceptor)
    }

    fn add_discard_sink(&mut self) -> Result<NodeId, GrabError> {
        (**self).add_discard_sink()
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), GrabError> {
        (**self).remove_node(node)
    }

    fn connect(&mut self, output: PinId, input: PinId) -> Result<(), GrabError> {
        (**self).connect(output, input)
    }

    fn disconnect(&mut self, pin: PinId) -> Result<(), GrabError> {
        (**self).disconnect(pin)
    }

    fn set_clock_enabled(&mut self, enabled: bool) -> Result<(), GrabError> {
        (**self).set_clock_enabled(enabled)
    }

    fn run(&mut self) -> Result<(), GrabError> {
        (**self).run()
    }

    fn stop(&mut self) -> Result<(), GrabError> {
        (**self).stop()
    }

    fn wait_for_completion(&mut self, timeout: Duration) -> Result<Completion, GrabError> {
        (**self).wait_for_completion(timeout)
    }

    fn duration(&self, format: TimeFormat) -> Option<i64> {
        (**self).duration(format)
    }
}
