//! Schema-validated data trees

use crate::qname::QName;
use crate::types::Value;

/// Body of a normalized node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Container(Vec<NormalizedNode>),
    /// List entry with key values in declaration order
    ListEntry {
        keys: Vec<(QName, Value)>,
        children: Vec<NormalizedNode>,
    },
    /// Leaf or one leaf-list entry
    Leaf(Value),
    /// Schema-opaque content
    AnyData(Vec<NormalizedNode>),
}

/// A node whose name and value have been validated against the schema
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNode {
    name: QName,
    body: NodeBody,
}

impl NormalizedNode {
    pub fn new(name: QName, body: NodeBody) -> Self {
        Self { name, body }
    }

    pub fn container(name: QName, children: Vec<NormalizedNode>) -> Self {
        Self::new(name, NodeBody::Container(children))
    }

    pub fn list_entry(
        name: QName,
        keys: Vec<(QName, Value)>,
        children: Vec<NormalizedNode>,
    ) -> Self {
        Self::new(name, NodeBody::ListEntry { keys, children })
    }

    pub fn leaf(name: QName, value: Value) -> Self {
        Self::new(name, NodeBody::Leaf(value))
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self.body, NodeBody::Leaf(_))
    }

    /// Child nodes; empty for leaves
    pub fn children(&self) -> &[NormalizedNode] {
        match &self.body {
            NodeBody::Container(children)
            | NodeBody::ListEntry { children, .. }
            | NodeBody::AnyData(children) => children,
            NodeBody::Leaf(_) => &[],
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.body {
            NodeBody::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Key values of a list entry
    pub fn keys(&self) -> &[(QName, Value)] {
        match &self.body {
            NodeBody::ListEntry { keys, .. } => keys,
            _ => &[],
        }
    }

    /// First child with the given local name
    pub fn child(&self, local_name: &str) -> Option<&NormalizedNode> {
        self.children()
            .iter()
            .find(|c| c.name.local_name() == local_name)
    }

    /// Value of the first leaf child with the given local name
    pub fn leaf_value(&self, local_name: &str) -> Option<&Value> {
        self.child(local_name).and_then(NormalizedNode::value)
    }

    /// Same node with its children replaced; leaves are returned unchanged
    pub fn with_children(self, children: Vec<NormalizedNode>) -> Self {
        let body = match self.body {
            NodeBody::Container(_) => NodeBody::Container(children),
            NodeBody::ListEntry { keys, .. } => NodeBody::ListEntry { keys, children },
            NodeBody::AnyData(_) => NodeBody::AnyData(children),
            leaf @ NodeBody::Leaf(_) => leaf,
        };
        Self {
            name: self.name,
            body,
        }
    }

    /// Number of levels below this node (0 for a node without children)
    pub fn depth(&self) -> usize {
        self.children()
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Move the children out, leaving the node childless
    pub(crate) fn take_children(&mut self) -> Vec<NormalizedNode> {
        match &mut self.body {
            NodeBody::Container(children)
            | NodeBody::ListEntry { children, .. }
            | NodeBody::AnyData(children) => std::mem::take(children),
            NodeBody::Leaf(_) => Vec::new(),
        }
    }
}
