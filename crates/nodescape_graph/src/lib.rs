// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow graph engine for Nodescape.
//!
//! This crate provides the headless model behind the canvas:
//! - Typed input/output connectors with arity limits
//! - Transitions with conversion-aware compatibility checks
//! - Nested node groups with coordinated movement
//! - XML persistence with best-effort, field-level recovery
//!
//! ## Architecture
//!
//! The graph owns every node, group and transition in id-keyed arenas;
//! relations are stored as id fields and kept consistent by the
//! [`graph::Graph`] operations. Concrete node behavior is plugged in
//! through [`node::NodeKind`] and created via the [`node::NodeRegistry`].
//! Rendering layers drain [`event::GraphEvent`]s and recompute from
//! current state.

pub mod connector;
pub mod document;
pub mod event;
pub mod graph;
pub mod group;
pub mod node;
pub mod transition;
pub mod value;

pub use connector::{InputConnector, OutputConnector};
pub use document::{DocumentError, GraphDocument};
pub use event::GraphEvent;
pub use graph::{ConnectError, Graph};
pub use group::{Group, GroupId};
pub use node::{Attributes, InputSources, KindContext, Node, NodeId, NodeKind, NodeRegistry};
pub use transition::{InputRef, OutputRef, Transition, TransitionId};
pub use value::{CoreConversions, DataType, TypeRegistry, Value};
