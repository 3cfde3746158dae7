// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input and output connectors, the typed attachment points on nodes.

use crate::transition::TransitionId;
use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};

/// An input socket on a node.
///
/// Holds an ordered list of incident transitions, bounded by
/// [`InputConnector::max_connections`]. Connect/disconnect logic lives on
/// [`crate::graph::Graph`], which is the only mutator of the transition
/// list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConnector {
    /// Declared data type of the socket.
    pub data_type: DataType,
    /// Maximum number of simultaneous transitions; 0 means unbounded.
    pub max_connections: u32,
    /// Incident transitions, in connection order.
    pub transitions: Vec<TransitionId>,
    /// Anchor point in canvas space, maintained by the layout layer.
    pub anchor: [f32; 2],
}

impl InputConnector {
    /// Create a single-connection input of the given type.
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 1)
    }

    /// Create an input accepting up to `max_connections` transitions
    /// (0 = unbounded).
    pub fn with_capacity(data_type: DataType, max_connections: u32) -> Self {
        Self {
            data_type,
            max_connections,
            transitions: Vec::new(),
            anchor: [0.0, 0.0],
        }
    }

    /// Create an input with no connection limit.
    pub fn unbounded(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    /// Whether at least one transition is attached.
    pub fn is_connected(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Whether another transition would exceed the connection limit.
    pub fn at_capacity(&self) -> bool {
        self.max_connections != 0 && self.transitions.len() as u32 >= self.max_connections
    }
}

/// An output socket on a node.
///
/// Tracks its live connection count and carries the current value, which is
/// coerced to [`OutputConnector::data_type`] on every assignment (see
/// [`crate::graph::Graph::set_output_value`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConnector {
    /// Declared data type of the socket.
    pub data_type: DataType,
    /// Number of transitions currently fed by this output.
    pub num_connections: u32,
    /// Current value, already coerced to the declared type.
    pub value: Option<Value>,
    /// Anchor point in canvas space, maintained by the layout layer.
    pub anchor: [f32; 2],
}

impl OutputConnector {
    /// Create an output of the given type with no value.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            num_connections: 0,
            value: None,
            anchor: [0.0, 0.0],
        }
    }

    /// Whether any transition is fed by this output.
    pub fn is_connected(&self) -> bool {
        self.num_connections > 0
    }
}
