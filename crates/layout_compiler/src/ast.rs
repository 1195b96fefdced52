//! Arena representation of a template.
//!
//! Nodes live in a single table in document (pre-order) order. A node's
//! subtree is the contiguous id range `[id, end)`, which is what islands
//! reference and what makes skeleton reconstruction a structural splice.
//! Every traversal over the arena is iterative.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::registry::{ComponentKind, Props};

/// Index of a node in its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: Self = Self(0);

    #[expect(clippy::cast_possible_truncation)]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered attribute list. Names are unique (first occurrence wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(SmallVec<[Attribute; 4]>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the attribute named `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append an attribute unless one with the same name exists.
    pub fn push(&mut self, attribute: Attribute) -> bool {
        if self.contains(&attribute.name) {
            return false;
        }
        self.0.push(attribute);
        true
    }

    /// Replace or append.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|attr| attr.name.eq_ignore_ascii_case(name)) {
            Some(attr) => attr.value = value,
            None => self.0.push(Attribute::new(name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .0
            .iter()
            .position(|attr| attr.name.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for attribute in iter {
            attributes.push(attribute);
        }
        attributes
    }
}

impl IntoIterator for Attributes {
    type Item = Attribute;
    type IntoIter = smallvec::IntoIter<[Attribute; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Element name: a registered component or a lower-case HTML tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum TagName {
    Component(ComponentKind),
    Html(String),
}

impl TagName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Component(kind) => kind.name(),
            Self::Html(name) => name,
        }
    }

    pub const fn component(&self) -> Option<ComponentKind> {
        match self {
            Self::Component(kind) => Some(*kind),
            Self::Html(_) => None,
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub tag: TagName,
    pub attributes: Attributes,
    /// Coerced props; empty until the validator has run.
    #[serde(default, skip_serializing_if = "Props::is_empty")]
    pub props: Props,
}

impl Element {
    pub fn new(tag: TagName, attributes: Attributes) -> Self {
        Self {
            tag,
            attributes,
            props: Props::default(),
        }
    }

    pub const fn component(&self) -> Option<ComponentKind> {
        self.tag.component()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Root,
    Element(Element),
    Text { value: String },
    /// Placeholder for an island in a skeleton arena.
    IslandSlot { ordinal: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// One past the last node of this subtree.
    pub end: NodeId,
    /// Element nesting depth; the root is 0, top-level nodes are 1.
    pub depth: u32,
    pub children: SmallVec<[NodeId; 4]>,
}

impl Node {
    pub const fn element(&self) -> Option<&Element> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<ComponentKind> {
        self.element().and_then(Element::component)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { value } => Some(value),
            _ => None,
        }
    }
}

/// A template tree stored as a pre-order arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn root(&self) -> &Node {
        self.node(NodeId::ROOT)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Number of nodes, excluding the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Size of the table including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    /// The id range covered by the subtree at `id`, including `id` itself.
    pub fn subtree(&self, id: NodeId) -> Range<usize> {
        id.index()..self.node(id).end.index()
    }

    /// All nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId::new(index), node))
    }

    /// Strict ancestors of `id`, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |&id| self.node(id).parent)
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor < id && id < self.node(ancestor).end
    }

    /// Check the arena invariants. Trees from [`AstBuilder`] always hold
    /// them; deserialized trees may not.
    pub fn check_structure(&self) -> Result<(), String> {
        let len = self.nodes.len();
        let Some(root) = self.nodes.first() else {
            return Err("the node table is empty".to_string());
        };
        if !matches!(root.kind, NodeKind::Root) || root.parent.is_some() || root.end.index() != len
        {
            return Err("node #0 is not a root spanning the table".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId::new(index);
            if index > 0 {
                let parent = node
                    .parent
                    .filter(|parent| parent.index() < index)
                    .ok_or_else(|| format!("node {id} has no preceding parent"))?;
                if matches!(node.kind, NodeKind::Root)
                    || node.end.index() <= index
                    || node.end > self.nodes[parent.index()].end
                {
                    return Err(format!("node {id} has an invalid range"));
                }
            }
            for child in &node.children {
                let valid = *child > id
                    && child.index() < len
                    && self.nodes[child.index()].parent == Some(id);
                if !valid {
                    return Err(format!("node {id} lists an invalid child {child}"));
                }
            }
        }
        Ok(())
    }

    /// Build the nested view of the tree.
    pub fn to_template_node(&self) -> TemplateNode {
        self.template_node_at(NodeId::ROOT)
    }

    /// Build the nested view of the subtree at `id`.
    ///
    /// Children always have larger ids than their parent, so walking the
    /// range backwards sees every child before the node that owns it.
    pub fn template_node_at(&self, id: NodeId) -> TemplateNode {
        let range = self.subtree(id);
        let offset = range.start;
        let mut built: Vec<Option<TemplateNode>> = vec![None; range.len()];

        for index in range.rev() {
            let node = &self.nodes[index];
            let mut children = || {
                node.children
                    .iter()
                    .filter_map(|child| built[child.index() - offset].take())
                    .collect::<Vec<_>>()
            };
            let view = match &node.kind {
                NodeKind::Root => TemplateNode::Root {
                    children: children(),
                },
                NodeKind::Element(element) => TemplateNode::Element {
                    tag: element.tag.as_str().to_string(),
                    attributes: element.attributes.iter().cloned().collect(),
                    children: children(),
                },
                NodeKind::Text { value } => TemplateNode::Text {
                    value: value.clone(),
                },
                NodeKind::IslandSlot { ordinal } => TemplateNode::IslandSlot { ordinal: *ordinal },
            };
            built[index - offset] = Some(view);
        }

        built
            .into_iter()
            .next()
            .flatten()
            .unwrap_or(TemplateNode::Root {
                children: Vec::new(),
            })
    }
}

/// Nested, serialization-friendly view of an [`Ast`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TemplateNode {
    Root {
        children: Vec<TemplateNode>,
    },
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<TemplateNode>,
    },
    Text {
        value: String,
    },
    IslandSlot {
        ordinal: u32,
    },
}

/// Which structural limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitKind {
    NodeCount,
    Depth,
    ComponentCount,
}

impl LimitKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NodeCount => "node count",
            Self::Depth => "depth",
            Self::ComponentCount => "component count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("template {} of {actual} exceeds the limit of {limit}", kind.as_str())]
pub struct LimitExceeded {
    pub kind: LimitKind,
    pub actual: usize,
    pub limit: usize,
}

/// Builds an [`Ast`] in pre-order.
///
/// Elements are opened and closed explicitly; text and island slots are
/// leaves. Hard ceilings stop construction as soon as they are crossed.
#[derive(Debug)]
pub struct AstBuilder {
    nodes: Vec<Node>,
    open: Vec<NodeId>,
    max_nodes: usize,
    max_depth: usize,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    /// A builder without ceilings.
    pub fn new() -> Self {
        Self::with_ceilings(usize::MAX, usize::MAX)
    }

    pub fn with_ceilings(max_nodes: usize, max_depth: usize) -> Self {
        let root = Node {
            kind: NodeKind::Root,
            parent: None,
            end: NodeId::new(1),
            depth: 0,
            children: SmallVec::new(),
        };
        Self {
            nodes: vec![root],
            open: vec![NodeId::ROOT],
            max_nodes,
            max_depth,
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(NodeId::ROOT)
    }

    fn push(&mut self, kind: NodeKind) -> Result<NodeId, LimitExceeded> {
        let count = self.nodes.len();
        if count > self.max_nodes {
            return Err(LimitExceeded {
                kind: LimitKind::NodeCount,
                actual: count,
                limit: self.max_nodes,
            });
        }
        let parent = self.current();
        let depth = self.nodes[parent.index()].depth + 1;
        if matches!(kind, NodeKind::Element(_)) && depth as usize > self.max_depth {
            return Err(LimitExceeded {
                kind: LimitKind::Depth,
                actual: depth as usize,
                limit: self.max_depth,
            });
        }
        let id = NodeId::new(count);
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            end: NodeId(id.0 + 1),
            depth,
            children: SmallVec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Open an element; subsequent nodes become its children until
    /// [`close`](Self::close).
    pub fn open(&mut self, element: Element) -> Result<NodeId, LimitExceeded> {
        let id = self.push(NodeKind::Element(element))?;
        self.open.push(id);
        Ok(id)
    }

    pub fn text(&mut self, value: impl Into<String>) -> Result<NodeId, LimitExceeded> {
        self.push(NodeKind::Text {
            value: value.into(),
        })
    }

    pub fn island_slot(&mut self, ordinal: u32) -> Result<NodeId, LimitExceeded> {
        self.push(NodeKind::IslandSlot { ordinal })
    }

    /// Close the innermost open element. Closing with nothing open is a no-op.
    pub fn close(&mut self) {
        if self.open.len() > 1
            && let Some(id) = self.open.pop()
        {
            self.nodes[id.index()].end = NodeId::new(self.nodes.len());
        }
    }

    /// Copy the subtree at `id` of `source` under the current node.
    ///
    /// `replace` may substitute a leaf for any node of the subtree, in which
    /// case the replaced node's own subtree is skipped.
    pub fn copy_subtree(
        &mut self,
        source: &Ast,
        id: NodeId,
        mut replace: impl FnMut(NodeId, &Node) -> Option<NodeKind>,
    ) -> Result<(), LimitExceeded> {
        let range = source.subtree(id);
        let mut ends: Vec<usize> = Vec::new();
        let mut index = range.start;

        while index < range.end {
            while ends.last().is_some_and(|&end| index >= end) {
                ends.pop();
                self.close();
            }
            let node = &source.nodes[index];
            let node_id = NodeId::new(index);
            if let Some(kind) = replace(node_id, node) {
                self.push(kind)?;
                index = node.end.index();
                continue;
            }
            match &node.kind {
                NodeKind::Root => {}
                NodeKind::Element(element) => {
                    self.open(element.clone())?;
                    ends.push(node.end.index());
                }
                kind => {
                    self.push(kind.clone())?;
                }
            }
            index += 1;
        }
        for _ in ends {
            self.close();
        }
        Ok(())
    }

    pub fn finish(mut self) -> Ast {
        while self.open.len() > 1 {
            self.close();
        }
        self.nodes[0].end = NodeId::new(self.nodes.len());
        Ast { nodes: self.nodes }
    }
}
