// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transitions, the directed edges between output and input connectors.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub Uuid);

impl TransitionId {
    /// Create a new random transition ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransitionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Address of an output connector: owning node plus position in the node's
/// stable output order. The index doubles as the serialized `OutputIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// Owning node.
    pub node: NodeId,
    /// Index into the node's output list.
    pub index: usize,
}

/// Address of an input connector: owning node plus position in the node's
/// stable input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
    /// Owning node.
    pub node: NodeId,
    /// Index into the node's input list.
    pub index: usize,
}

/// A directed edge from one output connector to one input connector.
///
/// Endpoints are fixed at construction. Transitions are created only
/// through [`crate::graph::Graph::connect`] and destroyed through
/// disconnect or endpoint removal; validity is derived on demand via
/// [`crate::graph::Graph::transition_is_valid`] so it always reflects the
/// endpoints' current types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Unique transition ID.
    pub id: TransitionId,
    /// Source endpoint.
    pub output: OutputRef,
    /// Destination endpoint.
    pub input: InputRef,
    /// Cached source anchor point, refreshed when the endpoint moves.
    pub start: [f32; 2],
    /// Cached destination anchor point, refreshed when the endpoint moves.
    pub end: [f32; 2],
}

impl Transition {
    /// Create a transition between the given endpoints.
    pub fn new(output: OutputRef, input: InputRef) -> Self {
        Self {
            id: TransitionId::new(),
            output,
            input,
            start: [0.0, 0.0],
            end: [0.0, 0.0],
        }
    }

    /// Whether either endpoint belongs to the given node.
    pub fn involves_node(&self, node: NodeId) -> bool {
        self.output.node == node || self.input.node == node
    }
}
