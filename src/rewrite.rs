//! Splicing interceptors into a render graph.
//!
//! [`rewrite`] walks a graph once, finds every terminal sink and turns
//!
//! ```text
//! upstream ──▶ renderer
//! ```
//!
//! into
//!
//! ```text
//! upstream ──▶ interceptor ──▶ discard sink
//! ```
//!
//! for audio and video sinks, attaching a fresh [`SelectionEngine`] to each
//! interceptor. Sinks of any other kind are still swapped for a discard sink
//! so that nothing reaches an external output, but get no interceptor.

use std::sync::Arc;

use crate::{
    engine::SelectionEngine,
    error::GrabError,
    graph::{CanonicalFormat, MediaGraph, MediaKind, MediaType, NodeId, PinId, TimeFormat},
    introspection,
};

/// What was done to one terminal sink.
#[derive(Debug, Clone)]
pub struct Splice {
    /// Name of the sink that was replaced.
    pub sink_name: String,
    /// Media kind that reached the sink.
    pub kind: MediaKind,
    /// The inserted interceptor, for audio and video sinks.
    pub interceptor: Option<NodeId>,
    /// Format negotiated into the interceptor.
    pub format: Option<MediaType>,
    /// The discard sink now terminating the chain.
    pub discard: NodeId,
}

/// Result of [`rewrite`]: engines per media kind in sink discovery order,
/// plus a record of every splice.
#[derive(Debug, Default)]
pub struct SplicedGraph {
    /// One engine per intercepted video sink.
    pub video: Vec<SelectionEngine>,
    /// One engine per intercepted audio sink.
    pub audio: Vec<SelectionEngine>,
    /// Every replaced sink, in discovery order.
    pub splices: Vec<Splice>,
}

/// Intercept every audio and video sink in `graph`.
///
/// The first failing graph operation aborts the rewrite. Splices made before
/// it stay in place, so the graph should be discarded.
///
/// # Errors
///
/// - [`GrabError::Disconnected`] if a terminal sink has no upstream.
/// - [`GrabError::UnsupportedFormat`] if an interceptor could not negotiate
///   its canonical format.
/// - Any error the framework reports for an individual graph operation.
pub fn rewrite<G: MediaGraph + ?Sized>(graph: &mut G) -> Result<SplicedGraph, GrabError> {
    let mut sinks = Vec::new();
    for node in graph.nodes()? {
        if introspection::is_terminal_sink(&*graph, node)? {
            sinks.push(node);
        }
    }
    log::debug!("Found {} terminal sinks", sinks.len());

    let mut spliced = SplicedGraph::default();
    for sink in sinks {
        let sink_name = graph.node_name(sink)?;
        let upstream = introspection::upstream_pin(&*graph, sink)?.ok_or_else(|| {
            GrabError::Disconnected(format!("sink '{sink_name}' ({sink}) has no upstream"))
        })?;
        let kind = introspection::connected_media_kind(&*graph, sink)?.unwrap_or(MediaKind::Unknown);

        let (feed, interception) = match CanonicalFormat::for_kind(kind) {
            Some(requested) => {
                let (interceptor, engine) = intercept(graph, sink, upstream, requested)?;
                let format = engine.format().clone();
                let output = introspection::output_pin(&*graph, interceptor)?.ok_or_else(|| {
                    GrabError::PipelineError(format!("interceptor {interceptor} has no output pin"))
                })?;
                match kind {
                    MediaKind::Video => spliced.video.push(engine),
                    _ => spliced.audio.push(engine),
                }
                (output, Some((interceptor, format)))
            }
            None => {
                log::warn!("Sink '{sink_name}' renders an unrecognized media kind; not intercepting");
                (upstream, None)
            }
        };

        let discard = replace_with_discard(graph, sink, feed)?;
        log::info!("Replaced {kind} sink '{sink_name}' with {discard}");

        let (interceptor, format) = interception.unzip();
        spliced.splices.push(Splice {
            sink_name,
            kind,
            interceptor,
            format,
            discard,
        });
    }

    Ok(spliced)
}

/// Put an interceptor between `upstream` and `sink`, attach an engine to it
/// and return both.
fn intercept<G: MediaGraph + ?Sized>(
    graph: &mut G,
    sink: NodeId,
    upstream: PinId,
    requested: CanonicalFormat,
) -> Result<(NodeId, SelectionEngine), GrabError> {
    let sink_input = introspection::input_pin(&*graph, sink)?
        .ok_or_else(|| GrabError::PipelineError(format!("{sink} has no input pin")))?;

    let interceptor = graph.add_interceptor(requested)?;
    let interceptor_input = introspection::input_pin(&*graph, interceptor)?.ok_or_else(|| {
        GrabError::PipelineError(format!("interceptor {interceptor} has no input pin"))
    })?;
    let interceptor_output = introspection::output_pin(&*graph, interceptor)?.ok_or_else(|| {
        GrabError::PipelineError(format!("interceptor {interceptor} has no output pin"))
    })?;

    graph.disconnect(upstream)?;
    graph.connect(upstream, interceptor_input)?;

    // The format is fixed here, once, for the life of the engine.
    let negotiated = graph.connection_media_type(interceptor_input)?;
    if !requested.matches(&negotiated) {
        return Err(GrabError::UnsupportedFormat {
            requested,
            negotiated: negotiated.to_string(),
        });
    }
    let mut engine = SelectionEngine::new(negotiated)?;
    if engine.kind() == MediaKind::Video {
        let rate = video_rate(&*graph, engine.rate());
        if rate != engine.rate() {
            log::debug!("Video frame interval unknown, cutting time windows at {rate} fps");
            engine = SelectionEngine::with_timing(engine.format().clone(), rate, engine.stride());
        }
    }
    graph.set_sample_callback(interceptor, Arc::new(engine.clone()))?;

    graph.connect(interceptor_output, sink_input)?;
    log::debug!("Spliced {interceptor} ({}) upstream of {sink}", engine.format());
    Ok((interceptor, engine))
}

/// Frame rate for a video engine: the interval-derived `rate` when known,
/// else frame count over media time. Never 0.
fn video_rate<G: MediaGraph + ?Sized>(graph: &G, rate: u32) -> u32 {
    if rate > 0 {
        return rate;
    }
    let frames = graph.duration(TimeFormat::Frame).filter(|&frames| frames > 0);
    let time = graph.duration(TimeFormat::MediaTime).filter(|&time| time > 0);
    match (frames, time) {
        (Some(frames), Some(time)) => ((frames as f64 / (time as f64 / 10_000_000.0)) as u32).max(1),
        _ => 1,
    }
}

/// Swap `sink` for a new discard sink fed by `feed`.
fn replace_with_discard<G: MediaGraph + ?Sized>(
    graph: &mut G,
    sink: NodeId,
    feed: PinId,
) -> Result<NodeId, GrabError> {
    let discard = graph.add_discard_sink()?;
    let discard_input = introspection::input_pin(&*graph, discard)?
        .ok_or_else(|| GrabError::PipelineError(format!("discard sink {discard} has no input pin")))?;

    graph.disconnect(feed)?;
    graph.remove_node(sink)?;
    graph.connect(feed, discard_input)?;
    Ok(discard)
}
