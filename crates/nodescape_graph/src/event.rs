// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change events published by the graph for rendering layers to observe.

use crate::group::GroupId;
use crate::node::NodeId;
use crate::transition::TransitionId;

/// A discrete change to the graph.
///
/// Events are queued by the graph and drained by the host with
/// [`crate::graph::Graph::drain_events`]; dependents recompute from current
/// graph state rather than from event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node joined the graph.
    NodeAdded(NodeId),
    /// A node left the graph; all its transitions are already severed.
    NodeRemoved(NodeId),
    /// A node's position changed.
    NodeMoved(NodeId),
    /// A group joined the graph.
    GroupAdded(GroupId),
    /// A group left the graph; its children are orphaned, not destroyed.
    GroupRemoved(GroupId),
    /// A group's position changed.
    GroupMoved(GroupId),
    /// A transition was created.
    Connected(TransitionId),
    /// A transition was destroyed.
    Disconnected(TransitionId),
    /// An input's effective value changed (connectivity or upstream value).
    InputChanged {
        /// Consuming node.
        node: NodeId,
        /// Index into the node's input list.
        input: usize,
    },
    /// An output's stored value changed.
    OutputValueChanged {
        /// Producing node.
        node: NodeId,
        /// Index into the node's output list.
        output: usize,
    },
    /// The node/group/transition selection changed.
    SelectionChanged,
}
