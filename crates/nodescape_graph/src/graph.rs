// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph orchestrator: owns all nodes, groups, transitions and
//! selections, and is the single mutation authority for membership.

use crate::event::GraphEvent;
use crate::group::{Group, GroupId};
use crate::node::{InputSources, KindContext, Node, NodeId};
use crate::transition::{InputRef, OutputRef, Transition, TransitionId};
use crate::value::{CoreConversions, DataType, TypeRegistry, Value};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Error when creating a transition.
///
/// Incompatibility and capacity are expected outcomes of user interaction,
/// not failures; callers may ignore the error and nothing is logged.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Endpoint node not found.
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Connector index out of range on the endpoint node.
    #[error("connector {index} out of range on node {node:?}")]
    ConnectorOutOfRange {
        /// Endpoint node.
        node: NodeId,
        /// Offending connector index.
        index: usize,
    },

    /// The input is at its connection limit.
    #[error("input is at its connection limit")]
    AtCapacity,

    /// The endpoint types are incompatible.
    #[error("incompatible connector types")]
    Incompatible,

    /// The input already holds a transition from this source node.
    #[error("input already connected to this source node")]
    DuplicateSource,
}

/// A directed dataflow graph of typed nodes, grouped hierarchically.
///
/// Entities live in id-keyed arenas; parent/child and endpoint relations
/// are id fields resolved through the arenas. All mutation happens through
/// the methods here, which keep the mirrored bookkeeping (connector
/// transition lists, node transition lists, connection counts, group child
/// sets) consistent and publish [`GraphEvent`]s for observers.
pub struct Graph {
    nodes: IndexMap<NodeId, Node>,
    groups: IndexMap<GroupId, Group>,
    transitions: IndexMap<TransitionId, Transition>,
    node_selection: Vec<NodeId>,
    group_selection: Vec<GroupId>,
    selected_transition: Option<TransitionId>,
    types: Arc<dyn TypeRegistry>,
    events: VecDeque<GraphEvent>,
}

impl Graph {
    /// Create an empty graph with the built-in type conversions.
    pub fn new() -> Self {
        Self::with_types(Arc::new(CoreConversions))
    }

    /// Create an empty graph with an injected type-compatibility engine.
    pub fn with_types(types: Arc<dyn TypeRegistry>) -> Self {
        Self {
            nodes: IndexMap::new(),
            groups: IndexMap::new(),
            transitions: IndexMap::new(),
            node_selection: Vec::new(),
            group_selection: Vec::new(),
            selected_transition: None,
            types,
            events: VecDeque::new(),
        }
    }

    /// The injected type-compatibility engine.
    pub fn types(&self) -> &Arc<dyn TypeRegistry> {
        &self.types
    }

    /// Drain all pending change events, oldest first.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        self.events.drain(..).collect()
    }

    // ---------------------------------------------------------------- nodes

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID.
    ///
    /// Connector transition lists and the mirrored node transition list are
    /// engine-managed; mutate them only through graph operations.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.events.push_back(GraphEvent::NodeAdded(id));
        id
    }

    /// Remove a node, severing every transition touching it in both
    /// directions and detaching it from its parent group.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        let others: Vec<NodeId> = self.nodes.keys().copied().filter(|n| *n != id).collect();
        for other in others {
            self.clear_connections_to(other, id);
            self.clear_connections_to(id, other);
        }
        self.clear_connections_to(id, id);

        if let Some(group) = self.nodes.get(&id).and_then(|n| n.parent_group) {
            self.remove_child_node(group, id);
        }
        self.node_selection.retain(|n| *n != id);
        self.nodes.shift_remove(&id);
        self.events.push_back(GraphEvent::NodeRemoved(id));
        true
    }

    /// Move a node, carrying its connector anchors and refreshing the
    /// cached endpoints of incident transitions.
    pub fn move_node(&mut self, id: NodeId, position: [f32; 2]) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let delta = [position[0] - node.position[0], position[1] - node.position[1]];
        if delta == [0.0, 0.0] {
            return;
        }
        node.position = position;
        for input in &mut node.inputs {
            input.anchor[0] += delta[0];
            input.anchor[1] += delta[1];
        }
        for output in &mut node.outputs {
            output.anchor[0] += delta[0];
            output.anchor[1] += delta[1];
        }
        self.events.push_back(GraphEvent::NodeMoved(id));
        self.refresh_transition_endpoints(id);
    }

    /// Set an input connector's anchor point and refresh incident
    /// transitions.
    pub fn set_input_anchor(&mut self, input: InputRef, anchor: [f32; 2]) {
        if let Some(conn) = self
            .nodes
            .get_mut(&input.node)
            .and_then(|n| n.inputs.get_mut(input.index))
        {
            conn.anchor = anchor;
            self.refresh_transition_endpoints(input.node);
        }
    }

    /// Set an output connector's anchor point and refresh incident
    /// transitions.
    pub fn set_output_anchor(&mut self, output: OutputRef, anchor: [f32; 2]) {
        if let Some(conn) = self
            .nodes
            .get_mut(&output.node)
            .and_then(|n| n.outputs.get_mut(output.index))
        {
            conn.anchor = anchor;
            self.refresh_transition_endpoints(output.node);
        }
    }

    // ----------------------------------------------------------- transitions

    /// Get a transition by ID.
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    /// All transitions.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    /// Number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Whether a transition's endpoint types are currently compatible.
    ///
    /// Recomputed from the live connector types, never cached.
    pub fn transition_is_valid(&self, id: TransitionId) -> bool {
        let Some(t) = self.transitions.get(&id) else {
            return false;
        };
        let out_ty = self
            .nodes
            .get(&t.output.node)
            .and_then(|n| n.output(t.output.index))
            .map(|c| &c.data_type);
        let in_ty = self
            .nodes
            .get(&t.input.node)
            .and_then(|n| n.input(t.input.index))
            .map(|c| &c.data_type);
        match (out_ty, in_ty) {
            (Some(out), Some(inp)) => {
                out == inp || inp.is_any() || self.types.can_convert(out, inp)
            }
            _ => false,
        }
    }

    /// Create a transition from an output connector to an input connector.
    ///
    /// A single-arity input that is already connected is rewired: its
    /// existing transition is removed first, before any further checks.
    /// Capacity, type compatibility and the at-most-one-edge-per-(input,
    /// source-node) rule are then enforced; violations reject without a
    /// transition being created.
    pub fn connect(
        &mut self,
        output: OutputRef,
        input: InputRef,
    ) -> Result<TransitionId, ConnectError> {
        let (out_ty, out_anchor) = {
            let node = self
                .nodes
                .get(&output.node)
                .ok_or(ConnectError::NodeNotFound(output.node))?;
            let conn = node
                .output(output.index)
                .ok_or(ConnectError::ConnectorOutOfRange {
                    node: output.node,
                    index: output.index,
                })?;
            (conn.data_type.clone(), conn.anchor)
        };

        // Replace semantics for single-arity inputs, ahead of all checks.
        let replaced = {
            let node = self
                .nodes
                .get(&input.node)
                .ok_or(ConnectError::NodeNotFound(input.node))?;
            let conn = node
                .input(input.index)
                .ok_or(ConnectError::ConnectorOutOfRange {
                    node: input.node,
                    index: input.index,
                })?;
            if conn.max_connections == 1 && conn.transitions.len() == 1 {
                Some(conn.transitions[0])
            } else {
                None
            }
        };
        if let Some(id) = replaced {
            self.remove_transition(id);
        }

        {
            let node = self
                .nodes
                .get(&input.node)
                .ok_or(ConnectError::NodeNotFound(input.node))?;
            let conn = node
                .input(input.index)
                .ok_or(ConnectError::ConnectorOutOfRange {
                    node: input.node,
                    index: input.index,
                })?;
            if conn.at_capacity() {
                return Err(ConnectError::AtCapacity);
            }
            let compatible = out_ty == conn.data_type
                || conn.data_type.is_any()
                || self.types.can_convert(&out_ty, &conn.data_type);
            if !compatible {
                return Err(ConnectError::Incompatible);
            }
            let duplicate = conn.transitions.iter().any(|tid| {
                self.transitions
                    .get(tid)
                    .is_some_and(|t| t.output.node == output.node)
            });
            if duplicate {
                return Err(ConnectError::DuplicateSource);
            }
        }

        let mut transition = Transition::new(output, input);
        transition.start = out_anchor;
        let id = transition.id;
        {
            let node = self
                .nodes
                .get_mut(&input.node)
                .ok_or(ConnectError::NodeNotFound(input.node))?;
            if let Some(conn) = node.inputs.get_mut(input.index) {
                transition.end = conn.anchor;
                conn.transitions.push(id);
            }
            node.transitions.push(id);
        }
        self.transitions.insert(id, transition);
        if let Some(conn) = self
            .nodes
            .get_mut(&output.node)
            .and_then(|n| n.outputs.get_mut(output.index))
        {
            conn.num_connections += 1;
        }
        self.events.push_back(GraphEvent::InputChanged {
            node: input.node,
            input: input.index,
        });
        self.notify_inputs_changed(input.node);
        self.events.push_back(GraphEvent::Connected(id));
        Ok(id)
    }

    /// Remove the transition on `input` whose source belongs to the node
    /// owning `output`. No-op if no such transition exists.
    pub fn disconnect(&mut self, output: OutputRef, input: InputRef) -> bool {
        let found = self
            .nodes
            .get(&input.node)
            .and_then(|n| n.input(input.index))
            .and_then(|conn| {
                conn.transitions.iter().copied().find(|tid| {
                    self.transitions
                        .get(tid)
                        .is_some_and(|t| t.output.node == output.node)
                })
            });
        match found {
            Some(id) => self.remove_transition(id),
            None => false,
        }
    }

    /// Disconnect every input of `node` that is wired to an output of
    /// `source`. Used when removing a node to sever both directions.
    pub fn clear_connections_to(&mut self, node: NodeId, source: NodeId) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        let doomed: Vec<TransitionId> = n
            .inputs
            .iter()
            .flat_map(|input| input.transitions.iter().copied())
            .filter(|tid| {
                self.transitions
                    .get(tid)
                    .is_some_and(|t| t.output.node == source)
            })
            .collect();
        for id in doomed {
            self.remove_transition(id);
        }
    }

    /// Remove a transition by ID, unwinding all mirrored bookkeeping.
    pub fn remove_transition(&mut self, id: TransitionId) -> bool {
        let Some(t) = self.transitions.shift_remove(&id) else {
            return false;
        };
        if let Some(node) = self.nodes.get_mut(&t.input.node) {
            if let Some(conn) = node.inputs.get_mut(t.input.index) {
                conn.transitions.retain(|x| *x != id);
            }
            node.transitions.retain(|x| *x != id);
        }
        if let Some(conn) = self
            .nodes
            .get_mut(&t.output.node)
            .and_then(|n| n.outputs.get_mut(t.output.index))
        {
            conn.num_connections = conn.num_connections.saturating_sub(1);
        }
        if self.selected_transition == Some(id) {
            self.selected_transition = None;
        }
        self.events.push_back(GraphEvent::InputChanged {
            node: t.input.node,
            input: t.input.index,
        });
        self.notify_inputs_changed(t.input.node);
        self.events.push_back(GraphEvent::Disconnected(id));
        true
    }

    // ---------------------------------------------------------------- values

    /// Assign a value to an output connector.
    ///
    /// The value is coerced to the connector's declared type; if coercion
    /// fails, the type's default value is substituted. A change notification
    /// and downstream input notifications fire only when the stored value
    /// actually changes.
    pub fn set_output_value(&mut self, output: OutputRef, value: Value) {
        let Some(declared) = self
            .nodes
            .get(&output.node)
            .and_then(|n| n.output(output.index))
            .map(|c| c.data_type.clone())
        else {
            return;
        };
        let coerced = self
            .types
            .convert(&value, &declared)
            .or_else(|| self.types.default_value(&declared));
        let changed = match self
            .nodes
            .get_mut(&output.node)
            .and_then(|n| n.outputs.get_mut(output.index))
        {
            Some(conn) if conn.value != coerced => {
                conn.value = coerced;
                true
            }
            _ => false,
        };
        if !changed {
            return;
        }
        self.events.push_back(GraphEvent::OutputValueChanged {
            node: output.node,
            output: output.index,
        });
        let consumers: Vec<(NodeId, usize)> = self
            .transitions
            .values()
            .filter(|t| t.output == output)
            .map(|t| (t.input.node, t.input.index))
            .collect();
        for (node, index) in consumers {
            self.events
                .push_back(GraphEvent::InputChanged { node, input: index });
            self.notify_inputs_changed(node);
        }
    }

    /// Read an output's stored value coerced to `target`.
    pub fn output_value_as(&self, output: OutputRef, target: &DataType) -> Option<Value> {
        let value = self
            .nodes
            .get(&output.node)
            .and_then(|n| n.output(output.index))
            .and_then(|c| c.value.as_ref())?;
        self.types.convert(value, target)
    }

    // ---------------------------------------------------------------- groups

    /// Get a group by ID.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Get a mutable group by ID.
    ///
    /// Parent/child id fields are engine-managed; mutate membership only
    /// through graph operations.
    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// All groups, in layered order: a group's parent always precedes it.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Add a group, restoring the parent-precedes-child list order.
    pub fn add_group(&mut self, group: Group) -> GroupId {
        let id = group.id;
        self.groups.insert(id, group);
        self.restore_group_order();
        self.events.push_back(GraphEvent::GroupAdded(id));
        id
    }

    /// Remove a group. Children are orphaned, not destroyed ("ungroup"
    /// semantics): they simply lose their parent reference.
    pub fn remove_group(&mut self, id: GroupId) -> bool {
        let Some(group) = self.groups.get(&id) else {
            return false;
        };
        let parent = group.parent_group;
        let child_nodes = group.child_nodes.clone();
        let child_groups = group.child_groups.clone();

        if let Some(parent) = parent {
            self.remove_child_group(parent, id);
        }
        for node in child_nodes {
            if let Some(n) = self.nodes.get_mut(&node) {
                n.parent_group = None;
            }
        }
        for child in child_groups {
            if let Some(g) = self.groups.get_mut(&child) {
                g.parent_group = None;
            }
        }
        self.group_selection.retain(|g| *g != id);
        self.groups.shift_remove(&id);
        self.events.push_back(GraphEvent::GroupRemoved(id));
        true
    }

    /// Attach a node as a direct child of a group.
    ///
    /// No-op if already a direct child; a node currently owned by another
    /// group is detached from it first.
    pub fn add_child_node(&mut self, group: GroupId, node: NodeId) -> bool {
        if !self.groups.contains_key(&group) || !self.nodes.contains_key(&node) {
            tracing::warn!(?group, ?node, "cannot group: unknown group or node");
            return false;
        }
        let current = self.nodes.get(&node).and_then(|n| n.parent_group);
        if current == Some(group) {
            return true;
        }
        if let Some(previous) = current {
            if let Some(g) = self.groups.get_mut(&previous) {
                g.child_nodes.retain(|n| *n != node);
            }
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent_group = Some(group);
        }
        if let Some(g) = self.groups.get_mut(&group) {
            g.child_nodes.push(node);
        }
        true
    }

    /// Detach a node from a group.
    ///
    /// The node must currently be a direct child of this group; anything
    /// else is an internal invariant breach.
    pub fn remove_child_node(&mut self, group: GroupId, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent_group);
        assert_eq!(parent, Some(group), "node is not a child of this group");
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent_group = None;
        }
        if let Some(g) = self.groups.get_mut(&group) {
            debug_assert!(g.child_nodes.contains(&node));
            g.child_nodes.retain(|n| *n != node);
        }
    }

    /// Attach a group as a direct child of another group.
    ///
    /// Rejects any attachment that would make a group its own transitive
    /// parent. Re-parenting detaches from the previous parent first.
    pub fn add_child_group(&mut self, parent: GroupId, child: GroupId) -> bool {
        if parent == child || !self.groups.contains_key(&parent) || !self.groups.contains_key(&child)
        {
            tracing::warn!(?parent, ?child, "cannot nest: unknown group or self-parenting");
            return false;
        }
        // Walk up from the parent; finding the child means a cycle.
        let mut cursor = self.groups.get(&parent).and_then(|g| g.parent_group);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                tracing::warn!(?parent, ?child, "cannot nest: would create a group cycle");
                return false;
            }
            cursor = self.groups.get(&ancestor).and_then(|g| g.parent_group);
        }

        let current = self.groups.get(&child).and_then(|g| g.parent_group);
        if current == Some(parent) {
            return true;
        }
        if let Some(previous) = current {
            if let Some(g) = self.groups.get_mut(&previous) {
                g.child_groups.retain(|c| *c != child);
            }
        }
        if let Some(g) = self.groups.get_mut(&child) {
            g.parent_group = Some(parent);
        }
        if let Some(g) = self.groups.get_mut(&parent) {
            g.child_groups.push(child);
        }
        self.restore_group_order();
        true
    }

    /// Detach a child group from its parent.
    ///
    /// The group must currently be a direct child of this parent.
    pub fn remove_child_group(&mut self, parent: GroupId, child: GroupId) {
        let current = self.groups.get(&child).and_then(|g| g.parent_group);
        assert_eq!(current, Some(parent), "group is not a child of this parent");
        if let Some(g) = self.groups.get_mut(&child) {
            g.parent_group = None;
        }
        if let Some(g) = self.groups.get_mut(&parent) {
            debug_assert!(g.child_groups.contains(&child));
            g.child_groups.retain(|c| *c != child);
        }
    }

    /// Group an existing selection of nodes and groups under a new group.
    pub fn group_selection_into(&mut self, group: Group) -> GroupId {
        let nodes = self.node_selection.clone();
        let groups = self.group_selection.clone();
        let id = self.add_group(group);
        for node in nodes {
            self.add_child_node(id, node);
        }
        for child in groups {
            self.add_child_group(id, child);
        }
        id
    }

    /// Set a group's is-moving flag, cascading it to all child groups
    /// recursively.
    pub fn set_group_moving(&mut self, id: GroupId, moving: bool) {
        let children = {
            let Some(group) = self.groups.get_mut(&id) else {
                return;
            };
            if group.moving == moving {
                return;
            }
            group.moving = moving;
            group.child_groups.clone()
        };
        for child in children {
            self.set_group_moving(child, moving);
        }
    }

    /// Move a group. While its is-moving flag is set, the position delta is
    /// applied to every child node, and to every child group that is not
    /// itself independently selected (which would be dragged on its own).
    pub fn move_group(&mut self, id: GroupId, position: [f32; 2]) {
        let Some(group) = self.groups.get(&id) else {
            return;
        };
        let delta = [
            position[0] - group.position[0],
            position[1] - group.position[1],
        ];
        if delta == [0.0, 0.0] {
            return;
        }
        if group.moving {
            let child_nodes = group.child_nodes.clone();
            let child_groups = group.child_groups.clone();
            for node in child_nodes {
                if let Some(p) = self.nodes.get(&node).map(|n| n.position) {
                    self.move_node(node, [p[0] + delta[0], p[1] + delta[1]]);
                }
            }
            for child in child_groups {
                let Some(g) = self.groups.get(&child) else {
                    continue;
                };
                if !g.selected {
                    let p = g.position;
                    self.move_group(child, [p[0] + delta[0], p[1] + delta[1]]);
                }
            }
        }
        if let Some(group) = self.groups.get_mut(&id) {
            group.position = position;
        }
        self.events.push_back(GraphEvent::GroupMoved(id));
    }

    // Hoist any group that is referenced as another group's parent ahead of
    // its referencing child. Terminates because the relation is acyclic.
    fn restore_group_order(&mut self) {
        loop {
            let order: Vec<GroupId> = self.groups.keys().copied().collect();
            let violation = order.iter().enumerate().find_map(|(child_idx, id)| {
                let parent = self.groups.get(id).and_then(|g| g.parent_group)?;
                let parent_idx = self.groups.get_index_of(&parent)?;
                (parent_idx > child_idx).then_some((parent_idx, child_idx))
            });
            match violation {
                Some((parent_idx, child_idx)) => self.groups.move_index(parent_idx, child_idx),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------ selections

    /// Currently selected nodes.
    pub fn node_selection(&self) -> &[NodeId] {
        &self.node_selection
    }

    /// Currently selected groups.
    pub fn group_selection(&self) -> &[GroupId] {
        &self.group_selection
    }

    /// First selected node, if any.
    pub fn selected_node(&self) -> Option<NodeId> {
        self.node_selection.first().copied()
    }

    /// First selected group, if any.
    pub fn selected_group(&self) -> Option<GroupId> {
        self.group_selection.first().copied()
    }

    /// The selected transition, if any.
    pub fn selected_transition(&self) -> Option<TransitionId> {
        self.selected_transition
    }

    /// Select a node (additive).
    pub fn select_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if !node.selected {
                node.selected = true;
                self.node_selection.push(id);
                self.events.push_back(GraphEvent::SelectionChanged);
            }
        }
    }

    /// Deselect a node.
    pub fn deselect_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.selected {
                node.selected = false;
                self.node_selection.retain(|n| *n != id);
                self.events.push_back(GraphEvent::SelectionChanged);
            }
        }
    }

    /// Select a group (additive).
    pub fn select_group(&mut self, id: GroupId) {
        if let Some(group) = self.groups.get_mut(&id) {
            if !group.selected {
                group.selected = true;
                self.group_selection.push(id);
                self.events.push_back(GraphEvent::SelectionChanged);
            }
        }
    }

    /// Deselect a group.
    pub fn deselect_group(&mut self, id: GroupId) {
        if let Some(group) = self.groups.get_mut(&id) {
            if group.selected {
                group.selected = false;
                self.group_selection.retain(|g| *g != id);
                self.events.push_back(GraphEvent::SelectionChanged);
            }
        }
    }

    /// Select a transition, or clear the transition selection.
    pub fn select_transition(&mut self, id: Option<TransitionId>) {
        if self.selected_transition != id {
            self.selected_transition = id.filter(|t| self.transitions.contains_key(t));
            self.events.push_back(GraphEvent::SelectionChanged);
        }
    }

    /// Clear all selections.
    pub fn clear_selection(&mut self) {
        let nodes = std::mem::take(&mut self.node_selection);
        for id in nodes {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.selected = false;
            }
        }
        let groups = std::mem::take(&mut self.group_selection);
        for id in groups {
            if let Some(group) = self.groups.get_mut(&id) {
                group.selected = false;
            }
        }
        self.selected_transition = None;
        self.events.push_back(GraphEvent::SelectionChanged);
    }

    /// Clear all selections and remove every group and node.
    pub fn reset(&mut self) {
        self.clear_selection();
        let groups: Vec<GroupId> = self.groups.keys().copied().collect();
        for id in groups {
            self.remove_group(id);
        }
        let nodes: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in nodes {
            self.remove_node(id);
        }
    }

    // -------------------------------------------------------------- internal

    /// Re-run the kind hook of a node after its input connectivity or an
    /// upstream value changed.
    fn notify_inputs_changed(&mut self, id: NodeId) {
        let sources = match self.nodes.get(&id) {
            Some(node) => self.collect_sources(node),
            None => return,
        };
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let Node {
            ref inputs,
            ref mut outputs,
            ref mut valid,
            ref mut kind,
            ..
        } = *node;
        let mut ctx = KindContext {
            inputs,
            outputs,
            valid,
        };
        kind.inputs_changed(&mut ctx, &sources);
    }

    fn collect_sources(&self, node: &Node) -> InputSources {
        let types = node
            .inputs
            .iter()
            .map(|input| {
                input
                    .transitions
                    .iter()
                    .filter_map(|tid| {
                        let t = self.transitions.get(tid)?;
                        let source = self.nodes.get(&t.output.node)?;
                        Some(source.output(t.output.index)?.data_type.clone())
                    })
                    .collect()
            })
            .collect();
        InputSources { types }
    }

    fn refresh_transition_endpoints(&mut self, node: NodeId) {
        let ids: Vec<TransitionId> = self
            .transitions
            .values()
            .filter(|t| t.involves_node(node))
            .map(|t| t.id)
            .collect();
        for id in ids {
            let endpoints = self.transitions.get(&id).map(|t| (t.output, t.input));
            let Some((output, input)) = endpoints else {
                continue;
            };
            let start = self
                .nodes
                .get(&output.node)
                .and_then(|n| n.output(output.index))
                .map(|c| c.anchor);
            let end = self
                .nodes
                .get(&input.node)
                .and_then(|n| n.input(input.index))
                .map(|c| c.anchor);
            if let Some(t) = self.transitions.get_mut(&id) {
                if let Some(start) = start {
                    t.start = start;
                }
                if let Some(end) = end {
                    t.end = end;
                }
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("groups", &self.groups.len())
            .field("transitions", &self.transitions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{InputConnector, OutputConnector};
    use crate::node::NodeKind;

    #[derive(Debug)]
    struct Fixture {
        inputs: Vec<InputConnector>,
        outputs: Vec<OutputConnector>,
    }

    impl NodeKind for Fixture {
        fn type_name(&self) -> &'static str {
            "test::Fixture"
        }

        fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>) {
            (self.inputs.clone(), self.outputs.clone())
        }
    }

    fn fixture(inputs: Vec<InputConnector>, outputs: Vec<OutputConnector>) -> Node {
        Node::from_kind(Box::new(Fixture { inputs, outputs }))
    }

    fn float_source(graph: &mut Graph) -> NodeId {
        graph.add_node(fixture(vec![], vec![OutputConnector::new(DataType::FLOAT)]))
    }

    fn float_sink(graph: &mut Graph) -> NodeId {
        graph.add_node(fixture(vec![InputConnector::new(DataType::FLOAT)], vec![]))
    }

    fn out(node: NodeId) -> OutputRef {
        OutputRef { node, index: 0 }
    }

    fn inp(node: NodeId) -> InputRef {
        InputRef { node, index: 0 }
    }

    #[test]
    fn test_connect_then_disconnect_restores_state() {
        let mut graph = Graph::new();
        let a = float_source(&mut graph);
        let b = float_sink(&mut graph);

        graph.connect(out(a), inp(b)).unwrap();
        assert!(graph.node(b).unwrap().input(0).unwrap().is_connected());
        assert_eq!(graph.node(a).unwrap().output(0).unwrap().num_connections, 1);
        assert_eq!(graph.transition_count(), 1);

        assert!(graph.disconnect(out(a), inp(b)));
        assert!(!graph.node(b).unwrap().input(0).unwrap().is_connected());
        assert_eq!(graph.node(a).unwrap().output(0).unwrap().num_connections, 0);
        assert_eq!(graph.transition_count(), 0);
        assert!(graph.node(b).unwrap().transitions.is_empty());
    }

    #[test]
    fn test_reconnect_same_pair_keeps_single_transition() {
        let mut graph = Graph::new();
        let a = float_source(&mut graph);
        let b = float_sink(&mut graph);

        graph.connect(out(a), inp(b)).unwrap();
        // The single-arity input rewires rather than stacking a second edge.
        graph.connect(out(a), inp(b)).unwrap();
        assert_eq!(graph.node(b).unwrap().input(0).unwrap().transitions.len(), 1);
        assert_eq!(graph.node(a).unwrap().output(0).unwrap().num_connections, 1);
        assert_eq!(graph.transition_count(), 1);
    }

    #[test]
    fn test_one_edge_per_source_node() {
        let mut graph = Graph::new();
        let source = graph.add_node(fixture(
            vec![],
            vec![
                OutputConnector::new(DataType::FLOAT),
                OutputConnector::new(DataType::FLOAT),
            ],
        ));
        let sink = graph.add_node(fixture(
            vec![InputConnector::unbounded(DataType::FLOAT)],
            vec![],
        ));

        graph
            .connect(OutputRef { node: source, index: 0 }, inp(sink))
            .unwrap();
        let second = graph.connect(OutputRef { node: source, index: 1 }, inp(sink));
        assert!(matches!(second, Err(ConnectError::DuplicateSource)));
        assert_eq!(graph.node(sink).unwrap().input(0).unwrap().transitions.len(), 1);
    }

    #[test]
    fn test_single_arity_replaces_previous_source() {
        let mut graph = Graph::new();
        let first = float_source(&mut graph);
        let second = float_source(&mut graph);
        let sink = float_sink(&mut graph);

        graph.connect(out(first), inp(sink)).unwrap();
        graph.connect(out(second), inp(sink)).unwrap();

        let input = graph.node(sink).unwrap().input(0).unwrap();
        assert_eq!(input.transitions.len(), 1);
        let t = graph.transition(input.transitions[0]).unwrap();
        assert_eq!(t.output.node, second);
        assert_eq!(graph.node(first).unwrap().output(0).unwrap().num_connections, 0);
        assert_eq!(graph.node(second).unwrap().output(0).unwrap().num_connections, 1);
    }

    #[test]
    fn test_incompatible_types_reject_without_edge() {
        let mut graph = Graph::new();
        let source = graph.add_node(fixture(vec![], vec![OutputConnector::new(DataType::STRING)]));
        let sink = float_sink(&mut graph);

        let result = graph.connect(out(source), inp(sink));
        assert!(matches!(result, Err(ConnectError::Incompatible)));
        assert_eq!(graph.transition_count(), 0);
        assert!(!graph.node(sink).unwrap().input(0).unwrap().is_connected());
    }

    #[test]
    fn test_wildcard_input_accepts_any_source() {
        let mut graph = Graph::new();
        let source = graph.add_node(fixture(vec![], vec![OutputConnector::new(DataType::VEC3)]));
        let sink = graph.add_node(fixture(vec![InputConnector::new(DataType::ANY)], vec![]));

        assert!(graph.connect(out(source), inp(sink)).is_ok());
    }

    #[test]
    fn test_unbounded_input_accepts_multiple_sources() {
        let mut graph = Graph::new();
        let sink = graph.add_node(fixture(
            vec![InputConnector::unbounded(DataType::FLOAT)],
            vec![],
        ));
        for _ in 0..3 {
            let source = float_source(&mut graph);
            graph.connect(out(source), inp(sink)).unwrap();
        }
        assert_eq!(graph.node(sink).unwrap().input(0).unwrap().transitions.len(), 3);
    }

    #[test]
    fn test_capacity_limit_enforced() {
        let mut graph = Graph::new();
        let sink = graph.add_node(fixture(
            vec![InputConnector::with_capacity(DataType::FLOAT, 2)],
            vec![],
        ));
        let a = float_source(&mut graph);
        let b = float_source(&mut graph);
        let c = float_source(&mut graph);
        graph.connect(out(a), inp(sink)).unwrap();
        graph.connect(out(b), inp(sink)).unwrap();
        let third = graph.connect(out(c), inp(sink));
        assert!(matches!(third, Err(ConnectError::AtCapacity)));
        assert_eq!(graph.node(sink).unwrap().input(0).unwrap().transitions.len(), 2);
    }

    #[test]
    fn test_remove_node_severs_both_directions() {
        let mut graph = Graph::new();
        let a = graph.add_node(fixture(
            vec![InputConnector::new(DataType::FLOAT)],
            vec![OutputConnector::new(DataType::FLOAT)],
        ));
        let b = graph.add_node(fixture(
            vec![InputConnector::new(DataType::FLOAT)],
            vec![OutputConnector::new(DataType::FLOAT)],
        ));
        graph.connect(out(a), inp(b)).unwrap();
        graph.connect(out(b), inp(a)).unwrap();
        assert_eq!(graph.transition_count(), 2);

        graph.remove_node(a);
        assert_eq!(graph.transition_count(), 0);
        let survivor = graph.node(b).unwrap();
        assert!(survivor.transitions.is_empty());
        assert!(!survivor.input(0).unwrap().is_connected());
        assert_eq!(survivor.output(0).unwrap().num_connections, 0);
        assert!(graph.transitions().all(|t| !t.involves_node(a)));
    }

    #[test]
    fn test_transition_validity_tracks_current_types() {
        let mut graph = Graph::new();
        let source = float_source(&mut graph);
        let sink = graph.add_node(fixture(vec![InputConnector::new(DataType::ANY)], vec![]));
        let id = graph.connect(out(source), inp(sink)).unwrap();
        assert!(graph.transition_is_valid(id));

        // Retype the source output after the fact; validity is derived, not
        // cached at construction.
        graph.node_mut(source).unwrap().outputs[0].data_type = DataType::named("mesh");
        assert!(graph.transition_is_valid(id));
        graph.node_mut(sink).unwrap().inputs[0].data_type = DataType::FLOAT;
        assert!(!graph.transition_is_valid(id));
    }

    #[test]
    fn test_set_output_value_coerces_and_falls_back() {
        let mut graph = Graph::new();
        let source = float_source(&mut graph);

        graph.set_output_value(out(source), Value::Int(3));
        assert_eq!(
            graph.node(source).unwrap().output(0).unwrap().value,
            Some(Value::Float(3.0))
        );

        // Unconvertible assignment falls back to the type's default value.
        graph.set_output_value(out(source), Value::Str("abc".into()));
        assert_eq!(
            graph.node(source).unwrap().output(0).unwrap().value,
            Some(Value::Float(0.0))
        );
    }

    #[test]
    fn test_value_change_notification_only_on_change() {
        let mut graph = Graph::new();
        let source = float_source(&mut graph);
        graph.set_output_value(out(source), Value::Float(1.0));
        graph.drain_events();

        graph.set_output_value(out(source), Value::Float(1.0));
        assert!(graph.drain_events().is_empty());

        graph.set_output_value(out(source), Value::Float(2.0));
        assert!(graph
            .drain_events()
            .contains(&GraphEvent::OutputValueChanged { node: source, output: 0 }));
    }

    #[test]
    fn test_group_order_parent_precedes_child() {
        let mut graph = Graph::new();
        let child = graph.add_group(Group::new().with_name("child"));
        let parent = graph.add_group(Group::new().with_name("parent"));
        let grandparent = graph.add_group(Group::new().with_name("grandparent"));
        graph.add_child_group(parent, child);
        graph.add_child_group(grandparent, parent);

        let order: Vec<GroupId> = graph.groups().map(|g| g.id).collect();
        let pos = |id: GroupId| order.iter().position(|g| *g == id).unwrap();
        assert!(pos(grandparent) < pos(parent));
        assert!(pos(parent) < pos(child));
    }

    #[test]
    fn test_reparent_detaches_from_previous_group() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        let first = graph.add_group(Group::new());
        let second = graph.add_group(Group::new());

        graph.add_child_node(first, node);
        graph.add_child_node(second, node);

        assert!(graph.group(first).unwrap().child_nodes.is_empty());
        assert_eq!(graph.group(second).unwrap().child_nodes, vec![node]);
        assert_eq!(graph.node(node).unwrap().parent_group, Some(second));
    }

    #[test]
    #[should_panic(expected = "node is not a child of this group")]
    fn test_remove_child_from_wrong_parent_panics() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        let group = graph.add_group(Group::new());
        let other = graph.add_group(Group::new());
        graph.add_child_node(group, node);
        graph.remove_child_node(other, node);
    }

    #[test]
    fn test_group_cycle_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_group(Group::new());
        let b = graph.add_group(Group::new());
        let c = graph.add_group(Group::new());
        assert!(graph.add_child_group(a, b));
        assert!(graph.add_child_group(b, c));
        assert!(!graph.add_child_group(c, a));
        assert!(!graph.add_child_group(a, a));
        assert_eq!(graph.group(a).unwrap().parent_group, None);
    }

    #[test]
    fn test_moving_flag_cascades_to_child_groups() {
        let mut graph = Graph::new();
        let outer = graph.add_group(Group::new());
        let inner = graph.add_group(Group::new());
        let innermost = graph.add_group(Group::new());
        graph.add_child_group(outer, inner);
        graph.add_child_group(inner, innermost);

        graph.set_group_moving(outer, true);
        assert!(graph.group(inner).unwrap().moving);
        assert!(graph.group(innermost).unwrap().moving);

        graph.set_group_moving(outer, false);
        assert!(!graph.group(innermost).unwrap().moving);
    }

    #[test]
    fn test_coordinated_move_carries_children() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        graph.move_node(node, [10.0, 10.0]);
        let outer = graph.add_group(Group::new());
        let inner = graph.add_group(Group::new());
        graph.add_child_node(outer, node);
        graph.add_child_group(outer, inner);

        graph.set_group_moving(outer, true);
        graph.move_group(outer, [5.0, 7.0]);

        assert_eq!(graph.node(node).unwrap().position, [15.0, 17.0]);
        assert_eq!(graph.group(inner).unwrap().position, [5.0, 7.0]);
    }

    #[test]
    fn test_selected_child_group_is_not_double_moved() {
        let mut graph = Graph::new();
        let outer = graph.add_group(Group::new());
        let inner = graph.add_group(Group::new());
        graph.add_child_group(outer, inner);
        graph.select_group(inner);

        graph.set_group_moving(outer, true);
        graph.move_group(outer, [5.0, 7.0]);

        assert_eq!(graph.group(inner).unwrap().position, [0.0, 0.0]);
    }

    #[test]
    fn test_move_without_moving_flag_leaves_children() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        let group = graph.add_group(Group::new());
        graph.add_child_node(group, node);

        graph.move_group(group, [50.0, 50.0]);
        assert_eq!(graph.node(node).unwrap().position, [0.0, 0.0]);
    }

    #[test]
    fn test_move_node_refreshes_transition_endpoints() {
        let mut graph = Graph::new();
        let source = float_source(&mut graph);
        let sink = float_sink(&mut graph);
        graph.set_output_anchor(out(source), [4.0, 4.0]);
        let id = graph.connect(out(source), inp(sink)).unwrap();
        assert_eq!(graph.transition(id).unwrap().start, [4.0, 4.0]);

        graph.move_node(source, [10.0, 0.0]);
        assert_eq!(graph.transition(id).unwrap().start, [14.0, 4.0]);

        graph.set_input_anchor(inp(sink), [40.0, 2.0]);
        assert_eq!(graph.transition(id).unwrap().end, [40.0, 2.0]);
    }

    #[test]
    fn test_remove_group_orphans_children() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        let outer = graph.add_group(Group::new());
        let inner = graph.add_group(Group::new());
        graph.add_child_node(outer, node);
        graph.add_child_group(outer, inner);

        graph.remove_group(outer);
        assert_eq!(graph.node(node).unwrap().parent_group, None);
        assert_eq!(graph.group(inner).unwrap().parent_group, None);
        assert!(graph.group(inner).is_some());
    }

    #[test]
    fn test_selection_tracks_membership() {
        let mut graph = Graph::new();
        let node = float_source(&mut graph);
        let group = graph.add_group(Group::new());
        graph.select_node(node);
        graph.select_node(node);
        graph.select_group(group);
        assert_eq!(graph.selected_node(), Some(node));
        assert_eq!(graph.selected_group(), Some(group));
        assert_eq!(graph.node_selection().len(), 1);

        graph.remove_node(node);
        assert_eq!(graph.selected_node(), None);
    }

    #[test]
    fn test_reset_empties_everything() {
        let mut graph = Graph::new();
        let a = float_source(&mut graph);
        let b = float_sink(&mut graph);
        graph.connect(out(a), inp(b)).unwrap();
        let group = graph.add_group(Group::new());
        graph.add_child_node(group, a);
        graph.select_node(b);

        graph.reset();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.group_count(), 0);
        assert_eq!(graph.transition_count(), 0);
        assert!(graph.node_selection().is_empty());
        assert_eq!(graph.selected_transition(), None);
    }
}
