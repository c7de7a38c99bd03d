//! Node table and playback plumbing shared by the bundled frameworks.
//!
//! [`Topology`] stores nodes, their pins and the negotiated connections, and
//! implements the structural half of [`MediaGraph`](super::MediaGraph).
//! [`Playback`] owns the worker thread a framework decodes on.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    thread::JoinHandle,
    time::Duration,
};

use super::{CanonicalFormat, Completion, MediaType, NodeId, PinDirection, PinId, SampleCallback};
use crate::error::GrabError;

/// What a node does in the graph.
pub(crate) enum NodeRole {
    /// Produces samples on its output pins.
    Source,
    /// Consumes one stream and produces another (decoders, converters).
    Transform,
    /// A framework renderer: the sinks a capture session replaces.
    Renderer,
    /// Exposes passing samples to a callback.
    Interceptor {
        requested: CanonicalFormat,
        callback: Option<Arc<dyn SampleCallback>>,
    },
    /// Accepts and drops everything.
    Discard,
}

struct PinEntry {
    direction: PinDirection,
    peer: Option<PinId>,
    negotiated: Option<MediaType>,
    /// What an output pin produces on its own. Interceptor outputs have no
    /// offer; they forward whatever their input negotiated.
    offer: Option<MediaType>,
}

struct NodeEntry {
    name: String,
    role: NodeRole,
    pins: Vec<PinEntry>,
}

/// One path from a source pin to the end of its chain.
pub(crate) struct DeliveryChain {
    /// Source output pin the chain starts at.
    pub source_pin: PinId,
    /// Callbacks of the interceptors along the chain, upstream first.
    pub callbacks: Vec<Arc<dyn SampleCallback>>,
    /// Media type negotiated into the first interceptor, if there is one.
    pub intercepted: Option<MediaType>,
}

#[derive(Default)]
pub(crate) struct Topology {
    nodes: Vec<Option<NodeEntry>>,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node with `inputs` input pins and one output pin per entry of
    /// `outputs` (each entry being that pin's offer).
    pub(crate) fn add_node(
        &mut self,
        name: impl Into<String>,
        role: NodeRole,
        inputs: usize,
        outputs: Vec<Option<MediaType>>,
    ) -> NodeId {
        let mut pins = Vec::with_capacity(inputs + outputs.len());
        for _ in 0..inputs {
            pins.push(PinEntry {
                direction: PinDirection::Input,
                peer: None,
                negotiated: None,
                offer: None,
            });
        }
        for offer in outputs {
            pins.push(PinEntry {
                direction: PinDirection::Output,
                peer: None,
                negotiated: None,
                offer,
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeEntry {
            name: name.into(),
            role,
            pins,
        }));
        id
    }

    pub(crate) fn add_interceptor(&mut self, requested: CanonicalFormat) -> NodeId {
        let name = format!("Interceptor ({requested})");
        self.add_node(
            name,
            NodeRole::Interceptor {
                requested,
                callback: None,
            },
            1,
            vec![None],
        )
    }

    pub(crate) fn add_discard_sink(&mut self) -> NodeId {
        self.add_node("Discard Sink", NodeRole::Discard, 1, Vec::new())
    }

    fn node(&self, node: NodeId) -> Result<&NodeEntry, GrabError> {
        self.nodes
            .get(node.0)
            .and_then(Option::as_ref)
            .ok_or(GrabError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry, GrabError> {
        self.nodes
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .ok_or(GrabError::NodeNotFound(node))
    }

    fn pin(&self, pin: PinId) -> Result<&PinEntry, GrabError> {
        self.node(pin.node)?
            .pins
            .get(pin.index)
            .ok_or_else(|| GrabError::InvalidArgument(format!("{pin} does not exist")))
    }

    fn pin_mut(&mut self, pin: PinId) -> Result<&mut PinEntry, GrabError> {
        self.node_mut(pin.node)?
            .pins
            .get_mut(pin.index)
            .ok_or_else(|| GrabError::InvalidArgument(format!("{pin} does not exist")))
    }

    pub(crate) fn nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    pub(crate) fn node_name(&self, node: NodeId) -> Result<String, GrabError> {
        Ok(self.node(node)?.name.clone())
    }

    pub(crate) fn is_interceptor(&self, node: NodeId) -> Result<bool, GrabError> {
        Ok(matches!(self.node(node)?.role, NodeRole::Interceptor { .. }))
    }

    pub(crate) fn is_discard(&self, node: NodeId) -> Result<bool, GrabError> {
        Ok(matches!(self.node(node)?.role, NodeRole::Discard))
    }

    pub(crate) fn pins(&self, node: NodeId) -> Result<Vec<PinId>, GrabError> {
        let count = self.node(node)?.pins.len();
        Ok((0..count).map(|index| PinId { node, index }).collect())
    }

    pub(crate) fn pin_direction(&self, pin: PinId) -> Result<PinDirection, GrabError> {
        Ok(self.pin(pin)?.direction)
    }

    pub(crate) fn connected_to(&self, pin: PinId) -> Result<Option<PinId>, GrabError> {
        Ok(self.pin(pin)?.peer)
    }

    pub(crate) fn connection_media_type(&self, pin: PinId) -> Result<MediaType, GrabError> {
        let entry = self.pin(pin)?;
        match (&entry.peer, &entry.negotiated) {
            (Some(_), Some(media)) => Ok(media.clone()),
            _ => Err(GrabError::Disconnected(format!("{pin} is not connected"))),
        }
    }

    pub(crate) fn set_callback(
        &mut self,
        interceptor: NodeId,
        new_callback: Option<Arc<dyn SampleCallback>>,
    ) -> Result<(), GrabError> {
        match &mut self.node_mut(interceptor)?.role {
            NodeRole::Interceptor { callback, .. } => {
                *callback = new_callback;
                Ok(())
            }
            _ => Err(GrabError::InvalidArgument(format!(
                "{interceptor} is not an interceptor"
            ))),
        }
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> Result<(), GrabError> {
        for pin in self.pins(node)? {
            self.disconnect(pin)?;
        }
        self.nodes[node.0] = None;
        Ok(())
    }

    /// What `output` would deliver if connected now.
    fn offered(&self, output: PinId) -> Result<MediaType, GrabError> {
        let node = self.node(output.node)?;
        if let NodeRole::Interceptor { .. } = node.role {
            let input = PinId {
                node: output.node,
                index: 0,
            };
            return self.connection_media_type(input).map_err(|_| {
                GrabError::Disconnected(format!(
                    "interceptor {} has no upstream connection",
                    output.node
                ))
            });
        }
        self.pin(output)?
            .offer
            .clone()
            .ok_or_else(|| GrabError::PipelineError(format!("{output} offers no media type")))
    }

    /// Connect `output` to `input`. When `input` belongs to an interceptor,
    /// `negotiate` picks the connection type from the offer and the
    /// interceptor's request; every other node accepts the offer as is.
    pub(crate) fn connect(
        &mut self,
        output: PinId,
        input: PinId,
        negotiate: impl Fn(&MediaType, CanonicalFormat) -> MediaType,
    ) -> Result<(), GrabError> {
        if self.pin(output)?.direction != PinDirection::Output {
            return Err(GrabError::InvalidArgument(format!(
                "{output} is not an output pin"
            )));
        }
        if self.pin(input)?.direction != PinDirection::Input {
            return Err(GrabError::InvalidArgument(format!("{input} is not an input pin")));
        }
        if self.pin(output)?.peer.is_some() || self.pin(input)?.peer.is_some() {
            return Err(GrabError::PipelineError(format!(
                "cannot connect {output} to {input}: pin already connected"
            )));
        }

        let offered = self.offered(output)?;
        let negotiated = match self.node(input.node)?.role {
            NodeRole::Interceptor { requested, .. } => negotiate(&offered, requested),
            _ => offered,
        };

        let out_entry = self.pin_mut(output)?;
        out_entry.peer = Some(input);
        out_entry.negotiated = Some(negotiated.clone());
        let in_entry = self.pin_mut(input)?;
        in_entry.peer = Some(output);
        in_entry.negotiated = Some(negotiated);
        Ok(())
    }

    pub(crate) fn disconnect(&mut self, pin: PinId) -> Result<(), GrabError> {
        let Some(peer) = self.pin(pin)?.peer else {
            return Ok(());
        };
        for end in [pin, peer] {
            let entry = self.pin_mut(end)?;
            entry.peer = None;
            entry.negotiated = None;
        }
        Ok(())
    }

    /// Output pins of every source node, in node then pin order.
    pub(crate) fn source_pins(&self) -> Vec<PinId> {
        let mut pins = Vec::new();
        for (index, entry) in self.nodes.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if !matches!(entry.role, NodeRole::Source) {
                continue;
            }
            for (pin_index, pin) in entry.pins.iter().enumerate() {
                if pin.direction == PinDirection::Output {
                    pins.push(PinId {
                        node: NodeId(index),
                        index: pin_index,
                    });
                }
            }
        }
        pins
    }

    /// Follow `source_pin` downstream, collecting interceptor callbacks.
    pub(crate) fn chain_from(&self, source_pin: PinId) -> Result<DeliveryChain, GrabError> {
        let mut chain = DeliveryChain {
            source_pin,
            callbacks: Vec::new(),
            intercepted: None,
        };

        let mut current = source_pin;
        // A chain cannot visit more nodes than the graph holds.
        for _ in 0..self.nodes.len() {
            let Some(peer) = self.pin(current)?.peer else {
                break;
            };
            let node = self.node(peer.node)?;
            if let NodeRole::Interceptor { callback, .. } = &node.role {
                if chain.intercepted.is_none() {
                    chain.intercepted = self.pin(peer)?.negotiated.clone();
                }
                if let Some(callback) = callback {
                    chain.callbacks.push(Arc::clone(callback));
                }
            }
            let next = node
                .pins
                .iter()
                .position(|pin| pin.direction == PinDirection::Output);
            match next {
                Some(index) => {
                    current = PinId {
                        node: peer.node,
                        index,
                    }
                }
                None => break,
            }
        }
        Ok(chain)
    }
}

/// A running worker thread plus the channel it reports completion on.
pub(crate) struct Playback {
    stop: Arc<AtomicBool>,
    done: Receiver<Result<(), GrabError>>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl Playback {
    /// Spawn `work` on a new thread. `work` should poll the stop flag it is
    /// handed between samples.
    pub(crate) fn spawn<F>(name: &str, work: F) -> Result<Self, GrabError>
    where
        F: FnOnce(Arc<AtomicBool>) -> Result<(), GrabError> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (sender, done) = mpsc::channel();
        let worker_stop = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = work(worker_stop);
                // The receiver is gone only if the graph was dropped mid-run.
                let _ = sender.send(result);
            })?;

        Ok(Self {
            stop,
            done,
            worker: Some(worker),
            finished: false,
        })
    }

    /// Whether the worker has reported completion.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn wait(&mut self, timeout: Duration) -> Result<Completion, GrabError> {
        if self.finished {
            return Ok(Completion::Complete);
        }
        match self.done.recv_timeout(timeout) {
            Ok(result) => {
                self.finished = true;
                self.join();
                result.map(|()| Completion::Complete)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Completion::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                self.join();
                Err(GrabError::PipelineError(
                    "playback worker exited without reporting".to_string(),
                ))
            }
        }
    }

    /// Request a stop and wait for the worker to wind down.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join();
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Playback worker panicked");
            }
        }
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop();
    }
}
