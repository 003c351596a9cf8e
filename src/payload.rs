//! Untyped payload trees as produced by a wire decoder
//!
//! A payload node knows its local name and, optionally, a namespace hint
//! (an XML namespace URI or a JSON module name). Qualified names are only
//! assigned during normalization.

use serde_json::{Map, Value as JsonValue};

use crate::error::{RestconfError, Result};

/// Identity reference that already carries its namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityValue {
    /// Namespace URI or module name the identity is scoped to
    pub namespace: String,
    /// Identity name, optionally `prefix:name`
    pub value: String,
}

impl IdentityValue {
    pub fn new(namespace: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            value: value.into(),
        }
    }
}

/// Scalar content of a leaf payload node
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Value exactly as decoded from the wire
    Scalar(JsonValue),
    /// Identity reference resolved by the decoder
    Identity(IdentityValue),
}

impl From<JsonValue> for RawValue {
    fn from(value: JsonValue) -> Self {
        RawValue::Scalar(value)
    }
}

/// Content of a payload node
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadContent {
    /// Ordered child nodes
    Composite(Vec<PayloadNode>),
    /// Scalar leaf value
    Simple(RawValue),
    /// Presence-only node, leaf or container is decided by the schema
    Empty,
}

/// Untyped payload node
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadNode {
    name: String,
    namespace: Option<String>,
    content: PayloadContent,
}

impl PayloadNode {
    pub fn composite(name: impl Into<String>, children: Vec<PayloadNode>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            content: PayloadContent::Composite(children),
        }
    }

    pub fn simple(name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            content: PayloadContent::Simple(value.into()),
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            content: PayloadContent::Empty,
        }
    }

    /// Attach a namespace URI or module name hint
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn local_name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn content(&self) -> &PayloadContent {
        &self.content
    }

    pub fn children(&self) -> &[PayloadNode] {
        match &self.content {
            PayloadContent::Composite(children) => children,
            _ => &[],
        }
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, PayloadContent) {
        (self.name, self.namespace, self.content)
    }

    /// Build a payload tree from a RESTCONF JSON document.
    ///
    /// The document must be an object with exactly one member. Member names
    /// of the form `module:name` set the namespace hint to the module name.
    pub fn from_json(document: &JsonValue) -> Result<Self> {
        let map = document
            .as_object()
            .ok_or_else(|| RestconfError::BadFormat("payload root must be a JSON object".into()))?;
        if map.len() != 1 {
            return Err(RestconfError::BadFormat(format!(
                "payload root must have exactly one member, found {}",
                map.len()
            )));
        }
        let mut nodes = members_to_nodes(map)?;
        match nodes.len() {
            1 => Ok(nodes.remove(0)),
            n => Err(RestconfError::BadFormat(format!(
                "payload root must denote a single node, found {} instances",
                n
            ))),
        }
    }
}

fn members_to_nodes(map: &Map<String, JsonValue>) -> Result<Vec<PayloadNode>> {
    let mut nodes = Vec::with_capacity(map.len());
    for (key, value) in map {
        let (namespace, name) = match key.split_once(':') {
            Some((module, name)) => (Some(module), name),
            None => (None, key.as_str()),
        };
        match value {
            // `[null]` is the JSON encoding of an empty leaf
            JsonValue::Array(items) if matches!(items.as_slice(), [JsonValue::Null]) => {
                nodes.push(with_hint(PayloadNode::empty(name), namespace));
            }
            JsonValue::Array(items) => {
                for item in items {
                    nodes.push(with_hint(value_to_node(name, item)?, namespace));
                }
            }
            other => nodes.push(with_hint(value_to_node(name, other)?, namespace)),
        }
    }
    Ok(nodes)
}

fn value_to_node(name: &str, value: &JsonValue) -> Result<PayloadNode> {
    match value {
        JsonValue::Object(map) => Ok(PayloadNode::composite(name, members_to_nodes(map)?)),
        JsonValue::Null => Ok(PayloadNode::empty(name)),
        JsonValue::Array(_) => Err(RestconfError::BadFormat(format!(
            "nested arrays are not allowed in \"{}\"",
            name
        ))),
        scalar => Ok(PayloadNode::simple(name, scalar.clone())),
    }
}

fn with_hint(node: PayloadNode, namespace: Option<&str>) -> PayloadNode {
    match namespace {
        Some(ns) => node.with_namespace(ns),
        None => node,
    }
}
