// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-graph persistence: the XML document format and its codec.
//!
//! The document shape is a compatibility contract:
//!
//! ```text
//! <Graph>
//!   <Groups>
//!     <Group Name=".." Id=".." Color="#RRGGBB" ParentGroup=".."?/>
//!   </Groups>
//!   <Nodes>
//!     <Node TypeName=".." Name=".." NodeId=".." TopLeftX=".." TopLeftY=".."
//!           Description=".."? IsRemovable=".." ParentGroup=".."? .../>
//!   </Nodes>
//!   <Transitions>
//!     <Node Id="..">
//!       <Input>                      <!-- one per input, in input order -->
//!         <Transition Node=".." OutputIndex=".."/>
//!       </Input>
//!     </Node>
//!   </Transitions>
//! </Graph>
//! ```
//!
//! Reconstruction order is mandatory: groups, then nodes, then transitions;
//! each stage resolves ids against the sets populated by the previous one.
//! Group elements are written parent-before-child so re-attachment on read
//! always finds the parent already present.

use crate::graph::Graph;
use crate::group::{Group, GroupId};
use crate::node::{Attributes, KindContext, Node, NodeId, NodeRegistry};
use crate::transition::{InputRef, OutputRef};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::sync::Arc;
use uuid::Uuid;

/// Error from the document codec.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Malformed XML.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Attribute decoding failure.
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// The document has no `Graph` root element.
    #[error("missing Graph root element")]
    MissingRoot,

    /// The produced document was not valid UTF-8.
    #[error("invalid utf-8 in document: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Underlying writer failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialized form of one group element.
#[derive(Debug, Clone, Default)]
pub struct GroupRecord {
    /// Attributes in document order.
    pub attrs: Attributes,
}

/// Serialized form of one node element.
#[derive(Debug, Clone, Default)]
pub struct NodeRecord {
    /// Attributes in document order, including kind-specific ones.
    pub attrs: Attributes,
}

/// One incoming edge of an input: source node and output index.
#[derive(Debug, Clone)]
pub struct IncomingRecord {
    /// Id of the source node, as written.
    pub source: String,
    /// Index into the source node's output list, as written.
    pub output_index: String,
}

/// Serialized transitions of one consuming node: one entry per input
/// connector, in input order.
#[derive(Debug, Clone, Default)]
pub struct TransitionRecord {
    /// Id of the consuming node, as written.
    pub node: String,
    /// Incoming edges per input connector.
    pub inputs: Vec<Vec<IncomingRecord>>,
}

/// The structured persisted state of a graph.
#[derive(Debug, Clone, Default)]
pub struct GraphDocument {
    /// Group elements, parent-before-child.
    pub groups: Vec<GroupRecord>,
    /// Node elements.
    pub nodes: Vec<NodeRecord>,
    /// Transition elements, one per node.
    pub transitions: Vec<TransitionRecord>,
}

impl Graph {
    /// Capture the graph as a structured document.
    pub fn to_document(&self) -> GraphDocument {
        let mut doc = GraphDocument::default();

        for group in self.groups() {
            let mut attrs = Attributes::new();
            attrs.insert("Name".into(), group.name.clone());
            attrs.insert("Id".into(), group.id.0.to_string());
            attrs.insert("Color".into(), format_color(group.color));
            if let Some(parent) = group.parent_group {
                attrs.insert("ParentGroup".into(), parent.0.to_string());
            }
            doc.groups.push(GroupRecord { attrs });
        }

        for node in self.nodes() {
            let mut attrs = Attributes::new();
            attrs.insert("TypeName".into(), node.type_name.clone());
            attrs.insert("Name".into(), node.name.clone());
            attrs.insert("NodeId".into(), node.id.0.to_string());
            attrs.insert("TopLeftX".into(), (node.position[0] as i32).to_string());
            attrs.insert("TopLeftY".into(), (node.position[1] as i32).to_string());
            if !node.description.is_empty() {
                attrs.insert("Description".into(), node.description.clone());
            }
            attrs.insert("IsRemovable".into(), node.removable.to_string());
            if let Some(parent) = node.parent_group {
                attrs.insert("ParentGroup".into(), parent.0.to_string());
            }
            let mut extra = Vec::new();
            node.kind.write_attributes(&node.outputs, &mut extra);
            for (key, value) in extra {
                attrs.insert(key, value);
            }
            doc.nodes.push(NodeRecord { attrs });
        }

        for node in self.nodes() {
            let mut record = TransitionRecord {
                node: node.id.0.to_string(),
                inputs: Vec::with_capacity(node.inputs.len()),
            };
            for input in &node.inputs {
                let incoming = input
                    .transitions
                    .iter()
                    .filter_map(|tid| {
                        let t = self.transition(*tid)?;
                        Some(IncomingRecord {
                            source: t.output.node.0.to_string(),
                            output_index: t.output.index.to_string(),
                        })
                    })
                    .collect();
                record.inputs.push(incoming);
            }
            doc.transitions.push(record);
        }

        doc
    }

    /// Serialize the graph to an XML document.
    ///
    /// Failure is caught at the whole-document level: logs a diagnostic and
    /// returns `None`, meaning nothing was persisted.
    pub fn to_xml(&self) -> Option<String> {
        match write_document(&self.to_document()) {
            Ok(xml) => Some(xml),
            Err(err) => {
                tracing::error!("failed to serialize graph: {err}");
                None
            }
        }
    }

    /// Rebuild the graph from a structured document.
    ///
    /// The graph is reset first. Per-group, per-node and per-field failures
    /// are logged and skipped or defaulted; the load continues best-effort.
    /// Node construction is offloaded to worker tasks and awaited before
    /// any shared set is touched; group attachment happens strictly after
    /// all groups exist, transition reconstruction strictly after all nodes
    /// exist.
    pub async fn from_document(&mut self, doc: GraphDocument, registry: &Arc<NodeRegistry>) {
        self.reset();

        for record in &doc.groups {
            let mut group = Group::new();
            if let Some(name) = record.attrs.get("Name") {
                group.name = name.clone();
            }
            match record.attrs.get("Id").map(|s| Uuid::parse_str(s)) {
                Some(Ok(id)) => group.id = GroupId(id),
                _ => tracing::warn!(name = %group.name, "group has a bad or missing Id"),
            }
            if let Some(color) = record.attrs.get("Color") {
                match parse_color(color) {
                    Some(rgb) => group.color = rgb,
                    None => tracing::warn!(name = %group.name, %color, "bad group color"),
                }
            }
            self.add_group(group);
        }

        // Parent attachment resolves ids in the group set, so it must wait
        // until every group has been added.
        for record in &doc.groups {
            let child = record
                .attrs
                .get("Id")
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(GroupId);
            let parent = record
                .attrs
                .get("ParentGroup")
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(GroupId);
            if let (Some(child), Some(parent)) = (child, parent) {
                if !self.add_child_group(parent, child) {
                    tracing::warn!(?child, ?parent, "failed to re-attach group to parent");
                }
            }
        }

        // Node construction is pure with respect to the shared graph, so it
        // is dispatched to workers; insertion happens here, in document
        // order, once every task has joined.
        let mut tasks = tokio::task::JoinSet::new();
        let node_count = doc.nodes.len();
        for (index, record) in doc.nodes.into_iter().enumerate() {
            let registry = Arc::clone(registry);
            tasks.spawn(async move { (index, build_node(&record, &registry)) });
        }
        let mut built: Vec<Option<(Node, Option<GroupId>)>> =
            (0..node_count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, node)) => built[index] = node,
                Err(err) => tracing::error!("node construction task failed: {err}"),
            }
        }
        for entry in built.into_iter().flatten() {
            let (node, parent) = entry;
            let id = self.add_node(node);
            if let Some(parent) = parent {
                if !self.add_child_node(parent, id) {
                    tracing::warn!(node = ?id, group = ?parent, "failed to re-attach node to group");
                }
            }
        }

        // Transition reconstruction resolves both endpoints by node id, so
        // it runs strictly after all nodes exist.
        for record in &doc.transitions {
            let Some(consumer) = Uuid::parse_str(&record.node).ok().map(NodeId) else {
                tracing::warn!(id = %record.node, "bad node id in transitions section");
                continue;
            };
            let Some(input_count) = self.node(consumer).map(|n| n.inputs.len()) else {
                tracing::warn!(?consumer, "transitions reference an unknown node");
                continue;
            };
            if record.inputs.len() != input_count {
                tracing::warn!(
                    ?consumer,
                    expected = input_count,
                    found = record.inputs.len(),
                    "input count mismatch; extra entries are ignored"
                );
            }
            for (index, incoming) in record.inputs.iter().enumerate().take(input_count) {
                for edge in incoming {
                    let source = Uuid::parse_str(&edge.source).ok().map(NodeId);
                    let output_index = edge.output_index.parse::<usize>().ok();
                    let (Some(source), Some(output_index)) = (source, output_index) else {
                        tracing::warn!(?consumer, input = index, "bad transition record");
                        continue;
                    };
                    let result = self.connect(
                        OutputRef { node: source, index: output_index },
                        InputRef { node: consumer, index },
                    );
                    if let Err(err) = result {
                        tracing::warn!(?consumer, input = index, "dropped transition: {err}");
                    }
                }
            }
        }
    }

    /// Deserialize a graph from an XML document.
    ///
    /// On a malformed document the graph is left reset and empty; the error
    /// is logged and returned. Item-level failures inside a well-formed
    /// document are handled best-effort by [`Graph::from_document`].
    pub async fn load_xml(
        &mut self,
        xml: &str,
        registry: &Arc<NodeRegistry>,
    ) -> Result<(), DocumentError> {
        self.reset();
        let doc = match parse_document(xml) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::error!("failed to deserialize graph: {err}");
                return Err(err);
            }
        };
        self.from_document(doc, registry).await;
        Ok(())
    }
}

// Construct a node from its record: registry lookup, base-field population,
// then kind-specific attributes. Pure with respect to the shared graph, so
// it may run on a worker. Field failures default and log; a missing type
// drops the node.
fn build_node(record: &NodeRecord, registry: &NodeRegistry) -> Option<(Node, Option<GroupId>)> {
    let attrs = &record.attrs;
    let Some(type_name) = attrs.get("TypeName") else {
        tracing::error!("node element without TypeName; dropped");
        return None;
    };
    let Some(mut node) = registry.create(type_name) else {
        tracing::error!(%type_name, "unknown node type; dropped");
        return None;
    };

    if let Some(name) = attrs.get("Name") {
        node.name = name.clone();
    }
    match attrs.get("NodeId").map(|s| Uuid::parse_str(s)) {
        Some(Ok(id)) => node.id = NodeId(id),
        _ => tracing::warn!(name = %node.name, "node has a bad or missing NodeId"),
    }
    for (attr, axis) in [("TopLeftX", 0), ("TopLeftY", 1)] {
        match attrs.get(attr).map(|s| s.parse::<f32>()) {
            Some(Ok(v)) => node.position[axis] = v,
            _ => tracing::warn!(name = %node.name, attr, "bad or missing position"),
        }
    }
    if let Some(description) = attrs.get("Description") {
        node.description = description.clone();
    }
    if let Some(removable) = attrs.get("IsRemovable") {
        match removable.to_ascii_lowercase().parse::<bool>() {
            Ok(v) => node.removable = v,
            Err(_) => tracing::warn!(name = %node.name, "bad IsRemovable flag"),
        }
    }
    let parent = match attrs.get("ParentGroup") {
        Some(id) => match Uuid::parse_str(id) {
            Ok(id) => Some(GroupId(id)),
            Err(_) => {
                tracing::warn!(name = %node.name, "bad ParentGroup id");
                None
            }
        },
        None => None,
    };

    {
        let Node {
            ref inputs,
            ref mut outputs,
            ref mut valid,
            ref mut kind,
            ..
        } = node;
        let mut ctx = KindContext {
            inputs,
            outputs,
            valid,
        };
        kind.read_attributes(&mut ctx, attrs);
    }

    Some((node, parent))
}

/// Write a structured document as XML.
pub fn write_document(doc: &GraphDocument) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Start(BytesStart::new("Graph")))?;

    writer.write_event(Event::Start(BytesStart::new("Groups")))?;
    for group in &doc.groups {
        let mut el = BytesStart::new("Group");
        for (key, value) in &group.attrs {
            el.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Groups")))?;

    writer.write_event(Event::Start(BytesStart::new("Nodes")))?;
    for node in &doc.nodes {
        let mut el = BytesStart::new("Node");
        for (key, value) in &node.attrs {
            el.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Nodes")))?;

    writer.write_event(Event::Start(BytesStart::new("Transitions")))?;
    for record in &doc.transitions {
        let mut el = BytesStart::new("Node");
        el.push_attribute(("Id", record.node.as_str()));
        writer.write_event(Event::Start(el))?;
        for incoming in &record.inputs {
            writer.write_event(Event::Start(BytesStart::new("Input")))?;
            for edge in incoming {
                let mut t = BytesStart::new("Transition");
                t.push_attribute(("Node", edge.source.as_str()));
                t.push_attribute(("OutputIndex", edge.output_index.as_str()));
                writer.write_event(Event::Empty(t))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Input")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Node")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Transitions")))?;

    writer.write_event(Event::End(BytesEnd::new("Graph")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Groups,
    Nodes,
    Transitions,
}

/// Parse an XML document into its structured records.
pub fn parse_document(xml: &str) -> Result<GraphDocument, DocumentError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = GraphDocument::default();
    let mut section = Section::None;
    let mut root_seen = false;
    let mut current: Option<TransitionRecord> = None;

    loop {
        match reader.read_event()? {
            Event::Start(el) => {
                handle_element(&el, false, &mut doc, &mut section, &mut root_seen, &mut current)?;
            }
            Event::Empty(el) => {
                handle_element(&el, true, &mut doc, &mut section, &mut root_seen, &mut current)?;
            }
            Event::End(el) => match el.name().as_ref() {
                b"Groups" | b"Nodes" | b"Transitions" => section = Section::None,
                b"Node" if section == Section::Transitions => {
                    if let Some(record) = current.take() {
                        doc.transitions.push(record);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(DocumentError::MissingRoot);
    }
    Ok(doc)
}

fn handle_element(
    el: &BytesStart<'_>,
    empty: bool,
    doc: &mut GraphDocument,
    section: &mut Section,
    root_seen: &mut bool,
    current: &mut Option<TransitionRecord>,
) -> Result<(), DocumentError> {
    match el.name().as_ref() {
        b"Graph" => *root_seen = true,
        b"Groups" if !empty => *section = Section::Groups,
        b"Nodes" if !empty => *section = Section::Nodes,
        b"Transitions" if !empty => *section = Section::Transitions,
        b"Node" if *section == Section::Transitions => {
            let attrs = collect_attrs(el)?;
            let record = TransitionRecord {
                node: attrs.get("Id").cloned().unwrap_or_default(),
                inputs: Vec::new(),
            };
            if empty {
                doc.transitions.push(record);
            } else {
                *current = Some(record);
            }
        }
        b"Input" if *section == Section::Transitions => {
            if let Some(record) = current.as_mut() {
                record.inputs.push(Vec::new());
            }
        }
        b"Transition" if *section == Section::Transitions => {
            let attrs = collect_attrs(el)?;
            let edge = IncomingRecord {
                source: attrs.get("Node").cloned().unwrap_or_default(),
                output_index: attrs.get("OutputIndex").cloned().unwrap_or_default(),
            };
            match current.as_mut().and_then(|r| r.inputs.last_mut()) {
                Some(input) => input.push(edge),
                None => tracing::warn!("transition element outside an Input; ignored"),
            }
        }
        _ if *section == Section::Groups => {
            doc.groups.push(GroupRecord { attrs: collect_attrs(el)? });
        }
        _ if *section == Section::Nodes => {
            doc.nodes.push(NodeRecord { attrs: collect_attrs(el)? });
        }
        _ => {}
    }
    Ok(())
}

fn collect_attrs(el: &BytesStart<'_>) -> Result<Attributes, DocumentError> {
    let mut attrs = Attributes::new();
    for attr in el.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn format_color(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

// Accepts both #RRGGBB and #AARRGGBB; alpha is discarded, groups are opaque.
fn parse_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    let hex = match hex.len() {
        6 => hex,
        8 => &hex[2..],
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
