// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodes, the node-kind plugin contract and the node type registry.

use crate::connector::{InputConnector, OutputConnector};
use crate::group::GroupId;
use crate::transition::TransitionId;
use crate::value::DataType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node, stable across save/load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute map of a serialized element, in document order.
pub type Attributes = IndexMap<String, String>;

/// Mutable view of a node handed to [`NodeKind`] hooks.
///
/// Kinds may retype or re-value their outputs and flip the node's valid
/// flag; the input list and its transition bookkeeping belong to the graph.
pub struct KindContext<'a> {
    /// The node's inputs, read-only.
    pub inputs: &'a [InputConnector],
    /// The node's outputs.
    pub outputs: &'a mut [OutputConnector],
    /// The node's type-mismatch flag.
    pub valid: &'a mut bool,
}

/// Resolved view of what currently feeds a node's inputs.
#[derive(Debug, Clone, Default)]
pub struct InputSources {
    /// Per input (in `inputs` order), the data types of the connected
    /// source outputs, in transition order.
    pub types: Vec<Vec<DataType>>,
}

impl InputSources {
    /// Type of the first source connected to input `index`, if any.
    pub fn first(&self, index: usize) -> Option<&DataType> {
        self.types.get(index).and_then(|t| t.first())
    }

    /// Whether input `index` has at least one source.
    pub fn is_connected(&self, index: usize) -> bool {
        self.first(index).is_some()
    }
}

/// Contract implemented by every concrete node kind.
///
/// The engine owns all common node state; a kind only declares its
/// connector layout, persists its extra fields and reacts to connectivity
/// changes. Kinds must be `Send` so node construction can run on a worker
/// during deserialization.
pub trait NodeKind: fmt::Debug + Send {
    /// Registered type identifier, written as the `TypeName` attribute.
    fn type_name(&self) -> &'static str;

    /// Default display name for freshly created nodes.
    fn display_name(&self) -> &'static str {
        self.type_name()
    }

    /// Connector layout. Order is stable and defines the serialized
    /// input/output indices.
    fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>);

    /// Append kind-specific attributes to the node's serialized element.
    fn write_attributes(&self, _outputs: &[OutputConnector], _attrs: &mut Vec<(String, String)>) {}

    /// Restore kind-specific attributes, best-effort. Parse failures should
    /// be logged and leave defaults in place rather than abort the load.
    fn read_attributes(&mut self, _ctx: &mut KindContext<'_>, _attrs: &Attributes) {}

    /// Called after this node's input connectivity or an upstream value
    /// changed. `sources` carries the current source output types per input.
    fn inputs_changed(&mut self, _ctx: &mut KindContext<'_>, _sources: &InputSources) {}
}

/// A node in the graph.
///
/// Common state lives here; behavior is delegated to the boxed
/// [`NodeKind`]. The transition list mirrors the incident transitions of
/// this node's inputs for O(1) bulk detach and is maintained by the graph.
#[derive(Debug)]
pub struct Node {
    /// Unique instance ID.
    pub id: NodeId,
    /// Registered type identifier of the kind.
    pub type_name: String,
    /// Display name.
    pub name: String,
    /// Optional free-text description.
    pub description: String,
    /// Top-left position in canvas space.
    pub position: [f32; 2],
    /// Whether the node is part of the current selection.
    pub selected: bool,
    /// Cleared by kinds when attached transitions carry mismatched types.
    pub valid: bool,
    /// Whether the node may be deleted by the user.
    pub removable: bool,
    /// Owning group, if any. A lookup relation, not ownership.
    pub parent_group: Option<GroupId>,
    /// Input connectors, in stable order.
    pub inputs: Vec<InputConnector>,
    /// Output connectors, in stable order.
    pub outputs: Vec<OutputConnector>,
    /// Transitions incident on this node's inputs.
    pub transitions: Vec<TransitionId>,
    /// The concrete kind.
    pub kind: Box<dyn NodeKind>,
}

impl Node {
    /// Create a node from a kind, with connectors laid out by the kind.
    pub fn from_kind(kind: Box<dyn NodeKind>) -> Self {
        let (inputs, outputs) = kind.connectors();
        Self {
            id: NodeId::new(),
            type_name: kind.type_name().to_string(),
            name: kind.display_name().to_string(),
            description: String::new(),
            position: [0.0, 0.0],
            selected: false,
            valid: true,
            removable: true,
            parent_group: None,
            inputs,
            outputs,
            transitions: Vec::new(),
            kind,
        }
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Get an input connector by index.
    pub fn input(&self, index: usize) -> Option<&InputConnector> {
        self.inputs.get(index)
    }

    /// Get an output connector by index.
    pub fn output(&self, index: usize) -> Option<&OutputConnector> {
        self.outputs.get(index)
    }
}

type KindFactory = Box<dyn Fn() -> Box<dyn NodeKind> + Send + Sync>;

/// Registry of available node kinds, keyed by type name.
///
/// The host registers its kinds here and the registry acts as the node
/// factory for both the "create node" affordance and deserialization.
#[derive(Default)]
pub struct NodeRegistry {
    factories: IndexMap<String, KindFactory>,
}

impl NodeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register a node kind by its factory.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn NodeKind> + Send + Sync + 'static,
    {
        let type_name = factory().type_name().to_string();
        self.factories.insert(type_name, Box::new(factory));
    }

    /// All registered type names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Create a fresh node of the given registered type.
    pub fn create(&self, type_name: &str) -> Option<Node> {
        self.factories
            .get(type_name)
            .map(|factory| Node::from_kind(factory()))
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    #[derive(Debug)]
    struct Probe;

    impl NodeKind for Probe {
        fn type_name(&self) -> &'static str {
            "test::Probe"
        }

        fn display_name(&self) -> &'static str {
            "Probe"
        }

        fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>) {
            (
                vec![InputConnector::new(DataType::FLOAT)],
                vec![OutputConnector::new(DataType::FLOAT)],
            )
        }
    }

    #[test]
    fn test_registry_create() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(Probe));

        assert!(registry.contains("test::Probe"));
        let node = registry.create("test::Probe").unwrap();
        assert_eq!(node.type_name, "test::Probe");
        assert_eq!(node.name, "Probe");
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.outputs.len(), 1);
        assert!(node.valid);
        assert!(node.removable);

        assert!(registry.create("test::Missing").is_none());
    }

    #[test]
    fn test_fresh_nodes_get_distinct_ids() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(Probe));
        let a = registry.create("test::Probe").unwrap();
        let b = registry.create("test::Probe").unwrap();
        assert_ne!(a.id, b.id);
    }
}
