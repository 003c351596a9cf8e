//! Payload normalization
//!
//! Walks an untyped [`PayloadNode`] tree together with the schema and
//! produces a [`NormalizedNode`] tree: every node gets the qualified name of
//! its schema node, leaf values are converted by their declared type, and
//! list entries are checked for a complete key set.
//!
//! Child selection works on the candidate set returned by
//! [`SchemaContext::find_children_by_name`]. Several candidates only occur
//! when different modules augment the same local name into one parent; the
//! payload must then carry a namespace or module-name hint. Inside a subtree
//! added by an augmentation, an unhinted name resolves to the candidate of the
//! augmenting module when there is exactly one.

use tracing::debug;

use crate::error::{RestconfError, Result};
use crate::normalized::{NodeBody, NormalizedNode};
use crate::payload::{PayloadContent, PayloadNode, RawValue};
use crate::qname::QName;
use crate::schema::{NodeId, NodeKind, SchemaContext};
use crate::types::{Codec, Value};

/// Normalizes payload trees against one schema snapshot
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    schema: &'a SchemaContext,
    accept_module_name_hint: bool,
}

impl<'a> Normalizer<'a> {
    pub fn new(schema: &'a SchemaContext) -> Self {
        Self {
            schema,
            accept_module_name_hint: true,
        }
    }

    /// Whether a hint equal to the owning module's name is accepted in
    /// place of its namespace URI
    pub fn accept_module_name_hint(mut self, accept: bool) -> Self {
        self.accept_module_name_hint = accept;
        self
    }

    /// Normalize `payload` against the schema node `target`.
    ///
    /// The payload root must carry the target's local name; a namespace hint
    /// on it must denote the target's module.
    pub fn normalize(&self, payload: PayloadNode, target: NodeId) -> Result<NormalizedNode> {
        let node = self.schema.node(target);
        if payload.local_name() != node.qname().local_name() {
            return Err(RestconfError::BadFormat(format!(
                "payload root \"{}\" does not match schema node \"{}\"",
                payload.local_name(),
                self.schema.describe(target)
            )));
        }
        if let Some(hint) = payload.namespace()
            && !self.matches_hint(target, hint)
        {
            return Err(RestconfError::NamespaceMismatch {
                name: payload.local_name().to_string(),
                expected: node.qname().namespace().to_string(),
                supplied: hint.to_string(),
            });
        }
        self.normalize_node(payload, target, None)
    }

    /// Normalize `payload` as a child of `parent` (`None` for top-level data).
    ///
    /// Returns the selected schema node along with the normalized tree.
    pub fn normalize_child(
        &self,
        payload: PayloadNode,
        parent: Option<NodeId>,
    ) -> Result<(NodeId, NormalizedNode)> {
        let id = self.select(parent, payload.local_name(), payload.namespace(), None)?;
        let normalized = self.normalize_node(payload, id, None)?;
        Ok((id, normalized))
    }

    fn select(
        &self,
        parent: Option<NodeId>,
        local: &str,
        hint: Option<&str>,
        augmentation: Option<&QName>,
    ) -> Result<NodeId> {
        let candidates = self.schema.find_children_by_name(parent, local);
        match (candidates.as_slice(), hint) {
            ([], _) => Err(RestconfError::SchemaNodeNotFound(match parent {
                Some(p) => format!("{}/{}", self.schema.describe(p), local),
                None => local.to_string(),
            })),
            ([single], None) => Ok(*single),
            ([single], Some(hint)) => {
                if self.matches_hint(*single, hint) {
                    Ok(*single)
                } else {
                    Err(RestconfError::NamespaceMismatch {
                        name: local.to_string(),
                        expected: self.schema.node(*single).qname().namespace().to_string(),
                        supplied: hint.to_string(),
                    })
                }
            }
            (many, None) => {
                let owned: Vec<NodeId> = augmentation
                    .map(|owner| {
                        many.iter()
                            .copied()
                            .filter(|id| self.schema.node(*id).qname().same_module(owner))
                            .collect()
                    })
                    .unwrap_or_default();
                match owned.as_slice() {
                    [single] => {
                        debug!(child = local, "resolved by enclosing augmentation");
                        Ok(*single)
                    }
                    _ => Err(RestconfError::AmbiguousAugmentation {
                        name: local.to_string(),
                        candidates: self.namespaces(many),
                    }),
                }
            }
            (many, Some(hint)) => many
                .iter()
                .copied()
                .find(|id| self.matches_hint(*id, hint))
                .ok_or_else(|| RestconfError::NamespaceMismatch {
                    name: local.to_string(),
                    expected: self.namespaces(many).join(", "),
                    supplied: hint.to_string(),
                }),
        }
    }

    fn namespaces(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| self.schema.node(*id).qname().namespace().to_string())
            .collect()
    }

    fn matches_hint(&self, id: NodeId, hint: &str) -> bool {
        let namespace = self.schema.node(id).qname().namespace();
        if namespace == hint {
            return true;
        }
        self.accept_module_name_hint
            && self.schema.module_name_by_namespace(namespace) == Some(hint)
    }

    /// `augmentation` is the qualified name of the closest augmenting
    /// ancestor, kept only while descendants stay in its module. It decides
    /// between same-named children augmented in by several modules.
    fn normalize_node(
        &self,
        payload: PayloadNode,
        id: NodeId,
        augmentation: Option<&QName>,
    ) -> Result<NormalizedNode> {
        let schema_node = self.schema.node(id);
        let qname = schema_node.qname().clone();
        let augmentation = if schema_node.is_augmenting() {
            Some(&qname)
        } else {
            augmentation.filter(|owner| owner.same_module(&qname))
        };

        let (name, _, content) = payload.into_parts();
        match schema_node.kind() {
            NodeKind::Container => {
                let children = self.normalize_children(&name, content, id, augmentation)?;
                Ok(NormalizedNode::container(qname, children))
            }
            NodeKind::List { keys } => {
                let children = self.normalize_children(&name, content, id, augmentation)?;
                let mut key_values = Vec::with_capacity(keys.len());
                for key in keys {
                    let leaf = children
                        .iter()
                        .find(|c| c.name().local_name() == key && !c.is_composite())
                        .ok_or_else(|| RestconfError::MissingListKey {
                            key: key.clone(),
                            list: name.clone(),
                        })?;
                    if let Some(value) = leaf.value() {
                        key_values.push((leaf.name().clone(), value.clone()));
                    }
                }
                Ok(NormalizedNode::list_entry(qname, key_values, children))
            }
            NodeKind::Leaf { ty } | NodeKind::LeafList { ty } => {
                let value = match content {
                    PayloadContent::Simple(raw) => Codec::new(self.schema).deserialize(&qname, &raw, ty)?,
                    PayloadContent::Empty => Value::Empty,
                    PayloadContent::Composite(_) => {
                        return Err(RestconfError::BadFormat(format!(
                            "\"{}\" is a {} and cannot have child nodes",
                            name,
                            schema_node.kind().name()
                        )));
                    }
                };
                Ok(NormalizedNode::leaf(qname, value))
            }
            NodeKind::AnyData => {
                let children = match content {
                    PayloadContent::Composite(children) => children
                        .into_iter()
                        .map(|child| opaque(&qname, child))
                        .collect(),
                    PayloadContent::Simple(raw) => {
                        return Ok(NormalizedNode::leaf(qname, opaque_value(raw)));
                    }
                    PayloadContent::Empty => Vec::new(),
                };
                Ok(NormalizedNode::new(qname, NodeBody::AnyData(children)))
            }
            NodeKind::Rpc { .. } => Err(RestconfError::BadFormat(format!(
                "\"{}\" is an operation and cannot be used as data",
                name
            ))),
        }
    }

    fn normalize_children(
        &self,
        name: &str,
        content: PayloadContent,
        parent: NodeId,
        augmentation: Option<&QName>,
    ) -> Result<Vec<NormalizedNode>> {
        let children = match content {
            PayloadContent::Composite(children) => children,
            PayloadContent::Empty => return Ok(Vec::new()),
            PayloadContent::Simple(_) => {
                return Err(RestconfError::BadFormat(format!(
                    "\"{}\" expects child nodes, not a value",
                    name
                )));
            }
        };

        let mut normalized = Vec::with_capacity(children.len());
        for child in children {
            let id = self.select(
                Some(parent),
                child.local_name(),
                child.namespace(),
                augmentation,
            )?;
            normalized.push(self.normalize_node(child, id, augmentation)?);
        }
        Ok(normalized)
    }
}

/// Schema-opaque content takes the namespace of the enclosing anydata node
fn opaque(owner: &QName, payload: PayloadNode) -> NormalizedNode {
    let (name, _, content) = payload.into_parts();
    let qname = owner.sibling(name);
    match content {
        PayloadContent::Composite(children) => NormalizedNode::container(
            qname,
            children.into_iter().map(|c| opaque(owner, c)).collect(),
        ),
        PayloadContent::Simple(raw) => NormalizedNode::leaf(qname, opaque_value(raw)),
        PayloadContent::Empty => NormalizedNode::leaf(qname, Value::Empty),
    }
}

fn opaque_value(raw: RawValue) -> Value {
    match raw {
        RawValue::Scalar(value) => Value::from_json_scalar(&value),
        RawValue::Identity(identity) => Value::String(identity.value),
    }
}
