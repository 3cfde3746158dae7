// SPDX-License-Identifier: MIT OR Apache-2.0
//! Groups, the hierarchical containers of nodes and subgroups.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

impl GroupId {
    /// Create a new random group ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// A hierarchical container of nodes and subgroups.
///
/// Parent/child relations are stored as id fields and child id lists;
/// membership mutation and coordinated movement go through
/// [`crate::graph::Graph`], which keeps both sides consistent. A group has
/// at most one parent and may never be its own transitive parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Unique group ID.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Fill color, opaque RGB.
    pub color: [u8; 3],
    /// Top-left position in canvas space.
    pub position: [f32; 2],
    /// Width and height of the group frame.
    pub size: [f32; 2],
    /// Whether the group is part of the current selection.
    pub selected: bool,
    /// Set while the group is being dragged; moving the group then carries
    /// its children along.
    pub moving: bool,
    /// Owning group, if any.
    pub parent_group: Option<GroupId>,
    /// Direct child nodes.
    pub child_nodes: Vec<NodeId>,
    /// Direct child groups.
    pub child_groups: Vec<GroupId>,
}

impl Group {
    /// Create an empty light-gray group named "Group".
    pub fn new() -> Self {
        Self {
            id: GroupId::new(),
            name: "Group".to_string(),
            color: [0xd3, 0xd3, 0xd3],
            position: [0.0, 0.0],
            size: [128.0, 0.0],
            selected: false,
            moving: false,
            parent_group: None,
            child_nodes: Vec::new(),
            child_groups: Vec::new(),
        }
    }

    /// Set the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}
