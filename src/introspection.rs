//! Structural queries over a [`MediaGraph`].
//!
//! These helpers answer the questions the rewriter asks about each node:
//! where its pins point, who feeds it, whether it is a terminal sink and
//! what kind of media reaches it. All of them are read-only.

use crate::{
    error::GrabError,
    graph::{MediaGraph, MediaKind, NodeId, PinDirection, PinId},
};

/// Direction of pin `pin_index` on `node`.
pub fn pin_direction<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
    pin_index: usize,
) -> Result<PinDirection, GrabError> {
    let pin = graph
        .pins(node)?
        .into_iter()
        .nth(pin_index)
        .ok_or_else(|| {
            GrabError::InvalidArgument(format!("{node} has no pin {pin_index}"))
        })?;
    graph.pin_direction(pin)
}

fn first_pin<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
    direction: PinDirection,
) -> Result<Option<PinId>, GrabError> {
    for pin in graph.pins(node)? {
        if graph.pin_direction(pin)? == direction {
            return Ok(Some(pin));
        }
    }
    Ok(None)
}

/// The first input pin of `node`, if it has one.
pub fn input_pin<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<Option<PinId>, GrabError> {
    first_pin(graph, node, PinDirection::Input)
}

/// The first output pin of `node`, if it has one.
pub fn output_pin<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<Option<PinId>, GrabError> {
    first_pin(graph, node, PinDirection::Output)
}

/// The output pin feeding `node`'s input, if the input is connected.
pub fn upstream_pin<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<Option<PinId>, GrabError> {
    match input_pin(graph, node)? {
        Some(pin) => graph.connected_to(pin),
        None => Ok(None),
    }
}

/// The node attached to `node`'s input pin.
pub fn connected_peer<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<Option<NodeId>, GrabError> {
    Ok(upstream_pin(graph, node)?.map(|pin| pin.node))
}

/// Whether `node` has exactly one input pin and no output pins.
///
/// Purely structural: a node qualifies whatever it renders, and whether or
/// not its input is connected.
pub fn is_terminal_sink<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<bool, GrabError> {
    let mut inputs = 0;
    let mut outputs = 0;
    for pin in graph.pins(node)? {
        match graph.pin_direction(pin)? {
            PinDirection::Input => inputs += 1,
            PinDirection::Output => outputs += 1,
        }
    }
    Ok(inputs == 1 && outputs == 0)
}

/// Media kind negotiated on `node`'s input connection, or `None` when the
/// node has no connected input.
pub fn connected_media_kind<G: MediaGraph + ?Sized>(
    graph: &G,
    node: NodeId,
) -> Result<Option<MediaKind>, GrabError> {
    let Some(pin) = input_pin(graph, node)? else {
        return Ok(None);
    };
    if graph.connected_to(pin)?.is_none() {
        return Ok(None);
    }
    Ok(Some(graph.connection_media_type(pin)?.kind()))
}
