//! Instance identifiers
//!
//! RESTCONF addresses data with slash-delimited identifiers such as
//! `ietf-interfaces:interfaces/interface=eth0/enabled`. A segment is a local
//! name with an optional `module:` prefix and, for list entries, a `=`
//! followed by comma-separated key values in the list's declared key order.
//! Key values are percent-decoded.
//!
//! A segment equal to the mount marker splits the identifier: the part in
//! front of it is resolved locally and must address a mount point, the part
//! behind it is resolved against the mount point's own schema.

use std::fmt;
use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{RestconfError, Result};
use crate::mount::{MountPoint, MountRegistry};
use crate::payload::RawValue;
use crate::qname::QName;
use crate::schema::{NodeId, NodeKind, SchemaContext};
use crate::types::{Codec, Value};

/// One step of an instance path
#[derive(Debug, Clone, PartialEq)]
pub enum PathArgument {
    /// Container, leaf or a whole list
    Node(QName),
    /// List entry selected by its key values, in declaration order
    Entry {
        name: QName,
        keys: Vec<(QName, Value)>,
    },
}

impl PathArgument {
    pub fn name(&self) -> &QName {
        match self {
            PathArgument::Node(name) | PathArgument::Entry { name, .. } => name,
        }
    }

    pub fn keys(&self) -> &[(QName, Value)] {
        match self {
            PathArgument::Node(_) => &[],
            PathArgument::Entry { keys, .. } => keys,
        }
    }
}

/// Resolved address of a node or list entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstancePath {
    arguments: Vec<PathArgument>,
}

impl InstancePath {
    /// Create an empty path denoting the data root
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, name: QName) {
        self.arguments.push(PathArgument::Node(name));
    }

    pub fn push_entry(&mut self, name: QName, keys: Vec<(QName, Value)>) {
        self.arguments.push(PathArgument::Entry { name, keys });
    }

    pub fn arguments(&self) -> &[PathArgument] {
        &self.arguments
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn last(&self) -> Option<&PathArgument> {
        self.arguments.last()
    }

    /// This path extended by one step
    pub fn child(&self, argument: PathArgument) -> Self {
        let mut arguments = self.arguments.clone();
        arguments.push(argument);
        Self { arguments }
    }

    /// Render as a RESTCONF identifier without leading slash.
    ///
    /// A module prefix is written whenever the namespace changes from the
    /// previous step. Stream names are derived from this form.
    pub fn to_restconf_identifier(&self, schema: &SchemaContext) -> String {
        let mut segments = Vec::with_capacity(self.arguments.len());
        let mut namespace = "";
        for argument in &self.arguments {
            let name = argument.name();
            let mut segment = String::new();
            if name.namespace() != namespace {
                namespace = name.namespace();
                let module = schema
                    .module_name_by_namespace(namespace)
                    .unwrap_or(namespace);
                segment.push_str(module);
                segment.push(':');
            }
            segment.push_str(name.local_name());
            if let PathArgument::Entry { keys, .. } = argument {
                let values: Vec<String> = keys
                    .iter()
                    .map(|(_, value)| percent_encode(&key_text(schema, value)))
                    .collect();
                segment.push('=');
                segment.push_str(&values.join(","));
            }
            segments.push(segment);
        }
        segments.join("/")
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arguments.is_empty() {
            return f.write_str("/");
        }
        for argument in &self.arguments {
            write!(f, "/{}", argument.name().local_name())?;
            for (key, value) in argument.keys() {
                write!(f, "[{}='{}']", key.local_name(), value)?;
            }
        }
        Ok(())
    }
}

fn key_text(schema: &SchemaContext, value: &Value) -> String {
    match value {
        Value::Identity(qname) => match schema.module_name_by_namespace(qname.namespace()) {
            Some(module) => format!("{}:{}", module, qname.local_name()),
            None => qname.local_name().to_string(),
        },
        other => other.to_string(),
    }
}

/// Mount point a request was routed through
#[derive(Clone)]
pub struct MountBinding {
    path: InstancePath,
    point: Arc<dyn MountPoint>,
}

impl MountBinding {
    /// Local path at which the mount point is attached
    pub fn path(&self) -> &InstancePath {
        &self.path
    }

    pub fn point(&self) -> &Arc<dyn MountPoint> {
        &self.point
    }
}

impl fmt::Debug for MountBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountBinding")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Result of resolving an identifier.
///
/// When the identifier crossed a mount marker, `path` and `schema_node` are
/// relative to the mount point and `schema` is the mounted schema.
#[derive(Debug, Clone)]
pub struct InstanceIdentifierContext {
    path: InstancePath,
    schema_node: Option<NodeId>,
    schema: Arc<SchemaContext>,
    mount: Option<MountBinding>,
}

impl InstanceIdentifierContext {
    pub fn path(&self) -> &InstancePath {
        &self.path
    }

    /// Schema node at the final step; `None` for the data root or a mount root
    pub fn schema_node(&self) -> Option<NodeId> {
        self.schema_node
    }

    /// Schema the path was resolved against
    pub fn schema(&self) -> &Arc<SchemaContext> {
        &self.schema
    }

    pub fn mount(&self) -> Option<&MountBinding> {
        self.mount.as_ref()
    }

    pub fn mount_point(&self) -> Option<&Arc<dyn MountPoint>> {
        self.mount.as_ref().map(MountBinding::point)
    }

    /// True if the identifier ended exactly at the mount marker
    pub fn is_mount_root(&self) -> bool {
        self.mount.is_some() && self.path.is_empty()
    }
}

/// Resolves RESTCONF identifiers against one schema snapshot
pub struct PathResolver<'a> {
    schema: &'a Arc<SchemaContext>,
    mounts: Option<&'a dyn MountRegistry>,
    marker: &'a str,
}

impl<'a> PathResolver<'a> {
    pub fn new(schema: &'a Arc<SchemaContext>, marker: &'a str) -> Self {
        Self {
            schema,
            mounts: None,
            marker,
        }
    }

    /// Allow identifiers to cross into mount points found in `mounts`
    pub fn with_mounts(mut self, mounts: &'a dyn MountRegistry) -> Self {
        self.mounts = Some(mounts);
        self
    }

    /// Resolve `identifier` into an instance path and its schema node
    pub fn resolve(&self, identifier: &str) -> Result<InstanceIdentifierContext> {
        let trimmed = identifier.trim_start_matches('/');
        if trimmed.ends_with(&format!("{}/", self.marker)) {
            return Err(RestconfError::MissingMountedPath(identifier.to_string()));
        }
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(InstanceIdentifierContext {
                path: InstancePath::new(),
                schema_node: None,
                schema: Arc::clone(self.schema),
                mount: None,
            });
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        let Some(split) = segments.iter().position(|s| *s == self.marker) else {
            let (path, schema_node) = walk(self.schema, &segments)?;
            debug!(identifier, path = %path, "resolved identifier");
            return Ok(InstanceIdentifierContext {
                path,
                schema_node,
                schema: Arc::clone(self.schema),
                mount: None,
            });
        };

        let (outer, inner) = (&segments[..split], &segments[split + 1..]);
        if inner.contains(&self.marker) {
            return Err(RestconfError::BadFormat(format!(
                "identifier \"{}\" crosses more than one mount point",
                identifier
            )));
        }
        if outer.is_empty() {
            return Err(RestconfError::BadFormat(format!(
                "identifier \"{}\" starts with a mount point marker",
                identifier
            )));
        }

        let (mount_path, _) = walk(self.schema, outer)?;
        let point = self.mount_point(&mount_path)?;
        let mounted = point.schema();
        let (path, schema_node) = if inner.is_empty() {
            (InstancePath::new(), None)
        } else {
            walk(&mounted, inner)?
        };
        debug!(identifier, mount = %mount_path, path = %path, "resolved mounted identifier");

        Ok(InstanceIdentifierContext {
            path,
            schema_node,
            schema: mounted,
            mount: Some(MountBinding {
                path: mount_path,
                point,
            }),
        })
    }

    fn mount_point(&self, path: &InstancePath) -> Result<Arc<dyn MountPoint>> {
        self.mounts
            .and_then(|registry| registry.lookup(path))
            .ok_or_else(|| {
                RestconfError::MountPointNotFound(path.to_restconf_identifier(self.schema))
            })
    }
}

fn walk(schema: &SchemaContext, segments: &[&str]) -> Result<(InstancePath, Option<NodeId>)> {
    let mut path = InstancePath::new();
    let mut parent: Option<NodeId> = None;

    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(RestconfError::BadFormat(
                "identifier contains an empty segment".into(),
            ));
        }
        if let Some(p) = parent
            && !schema.node(p).is_data_container()
        {
            return Err(RestconfError::BadFormat(format!(
                "\"{}\" is not a container or list entry",
                schema.describe(p)
            )));
        }
        let last = index + 1 == segments.len();
        let (name_part, key_part) = match segment.split_once('=') {
            Some((name, keys)) => (name, Some(keys)),
            None => (*segment, None),
        };
        let name = percent_decode(name_part)?;
        let (prefix, local) = match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name.as_str()),
        };

        let id = select_child(schema, parent, prefix, local)?;
        let node = schema.node(id);
        let qname = node.qname().clone();
        match (node.kind(), key_part) {
            (NodeKind::List { .. }, Some(raw)) => {
                let values = raw
                    .split(',')
                    .map(percent_decode)
                    .collect::<Result<Vec<_>>>()?;
                let keys = key_values(schema, id, values)?;
                path.push_entry(qname, keys);
            }
            (NodeKind::List { keys }, None) if keys.is_empty() => {
                path.push_entry(qname, Vec::new())
            }
            (NodeKind::List { .. }, None) if last => path.push_node(qname),
            (NodeKind::List { keys }, None) => {
                return Err(RestconfError::KeyCountMismatch {
                    list: local.to_string(),
                    expected: keys.len(),
                    actual: 0,
                });
            }
            (_, Some(_)) => {
                return Err(RestconfError::BadFormat(format!(
                    "\"{}\" is not a list, key values are not allowed",
                    local
                )));
            }
            (_, None) => path.push_node(qname),
        }
        parent = Some(id);
    }

    Ok((path, parent))
}

/// Pick the child of `parent` named `local`.
///
/// With a module prefix the child must belong to that module; without one
/// the local name must be unique among the children.
pub(crate) fn select_child(
    schema: &SchemaContext,
    parent: Option<NodeId>,
    module: Option<&str>,
    local: &str,
) -> Result<NodeId> {
    let candidates = schema.find_children_by_name(parent, local);
    match module {
        Some(module) => {
            let namespace = schema
                .module_by_name(module)
                .ok_or_else(|| RestconfError::UnknownModule {
                    name: module.to_string(),
                    revision: None,
                })?
                .namespace();
            candidates
                .into_iter()
                .find(|id| schema.node(*id).qname().namespace() == namespace)
                .ok_or_else(|| RestconfError::SchemaNodeNotFound(format!("{}:{}", module, local)))
        }
        None => match candidates.as_slice() {
            [] => Err(RestconfError::SchemaNodeNotFound(local.to_string())),
            [single] => Ok(*single),
            many => Err(RestconfError::AmbiguousAugmentation {
                name: local.to_string(),
                candidates: many
                    .iter()
                    .map(|id| schema.node(*id).qname().namespace().to_string())
                    .collect(),
            }),
        },
    }
}

/// Convert positional key values of `list` using the key leaf types
fn key_values(
    schema: &SchemaContext,
    list: NodeId,
    values: Vec<String>,
) -> Result<Vec<(QName, Value)>> {
    let node = schema.node(list);
    let declared = node.list_keys();
    if declared.len() != values.len() {
        return Err(RestconfError::KeyCountMismatch {
            list: node.qname().local_name().to_string(),
            expected: declared.len(),
            actual: values.len(),
        });
    }

    let codec = Codec::new(schema);
    let mut keys = Vec::with_capacity(values.len());
    for (key, value) in declared.iter().zip(values) {
        let leaf = schema
            .find_child(Some(list), key, node.qname().namespace())
            .or_else(|| schema.find_children_by_name(Some(list), key).first().copied())
            .ok_or_else(|| RestconfError::MissingListKey {
                key: key.clone(),
                list: node.qname().local_name().to_string(),
            })?;
        let leaf = schema.node(leaf);
        let qname = leaf.qname().clone();
        let value = match leaf.leaf_type() {
            Some(ty) => codec.deserialize(&qname, &RawValue::Scalar(JsonValue::String(value)), ty)?,
            None => Value::String(value),
        };
        keys.push((qname, value));
    }
    Ok(keys)
}

/// Parse an XPath-style instance identifier such as
/// `/ietf-interfaces:interfaces/interface[name='eth0']`.
///
/// Prefixes are module names. An unprefixed step belongs to the module of
/// the previous step; an unprefixed first step must be unique at the top level.
pub fn parse_instance_identifier(schema: &SchemaContext, input: &str) -> Result<InstancePath> {
    let input = input.trim();
    let body = input.strip_prefix('/').ok_or_else(|| {
        RestconfError::BadFormat(format!("instance identifier \"{}\" must start with '/'", input))
    })?;

    let mut path = InstancePath::new();
    let mut parent: Option<NodeId> = None;
    let mut module: Option<String> = None;

    for step in split_steps(body)? {
        let (name, predicates) = split_predicates(&step)?;
        let local = match name.split_once(':') {
            Some((prefix, local)) => {
                module = Some(prefix.to_string());
                local
            }
            None => name,
        };

        let id = select_child(schema, parent, module.as_deref(), local)?;
        let node = schema.node(id);
        if module.is_none() {
            module = schema
                .module_name_by_namespace(node.qname().namespace())
                .map(str::to_string);
        }

        if predicates.is_empty() {
            path.push_node(node.qname().clone());
        } else {
            let declared = node.list_keys();
            if declared.is_empty() {
                return Err(RestconfError::BadFormat(format!(
                    "\"{}\" is not a keyed list, predicates are not allowed",
                    local
                )));
            }
            if predicates.len() != declared.len() {
                return Err(RestconfError::KeyCountMismatch {
                    list: local.to_string(),
                    expected: declared.len(),
                    actual: predicates.len(),
                });
            }
            let mut ordered = Vec::with_capacity(declared.len());
            for key in declared {
                let value = predicates
                    .iter()
                    .find(|(name, _)| name.rsplit(':').next() == Some(key.as_str()))
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| RestconfError::MissingListKey {
                        key: key.clone(),
                        list: local.to_string(),
                    })?;
                ordered.push(value);
            }
            let keys = key_values(schema, id, ordered)?;
            path.push_entry(node.qname().clone(), keys);
        }
        parent = Some(id);
    }

    if path.is_empty() {
        return Err(RestconfError::BadFormat(
            "instance identifier has no steps".into(),
        ));
    }
    Ok(path)
}

/// Split on '/' outside of predicates and quoted strings
fn split_steps(body: &str) -> Result<Vec<String>> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, '/') if depth == 0 => {
                if current.is_empty() {
                    return Err(RestconfError::BadFormat(
                        "instance identifier contains an empty step".into(),
                    ));
                }
                steps.push(std::mem::take(&mut current));
            }
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(RestconfError::BadFormat(format!(
            "unterminated predicate in \"{}\"",
            body
        )));
    }
    if !current.is_empty() {
        steps.push(current);
    }
    Ok(steps)
}

/// Split `name[k='v'][k2="w"]` into the name and its key predicates
fn split_predicates(step: &str) -> Result<(&str, Vec<(String, String)>)> {
    let Some(open) = step.find('[') else {
        return Ok((step.trim(), Vec::new()));
    };
    let name = step[..open].trim();
    let mut rest = &step[open..];
    let mut predicates = Vec::new();

    while let Some(inner) = rest.strip_prefix('[') {
        let bad = || RestconfError::BadFormat(format!("malformed predicate in \"{}\"", step));
        let (key, after_eq) = inner.split_once('=').ok_or_else(bad)?;
        let after_eq = after_eq.trim_start();
        let quote = after_eq.chars().next().filter(|c| *c == '\'' || *c == '"').ok_or_else(bad)?;
        let value_and_rest = &after_eq[1..];
        let end = value_and_rest.find(quote).ok_or_else(bad)?;
        let value = &value_and_rest[..end];
        rest = value_and_rest[end + 1..]
            .trim_start()
            .strip_prefix(']')
            .ok_or_else(bad)?;
        predicates.push((key.trim().to_string(), value.to_string()));
    }
    if !rest.trim().is_empty() {
        return Err(RestconfError::BadFormat(format!(
            "unexpected text after predicates in \"{}\"",
            step
        )));
    }
    Ok((name, predicates))
}

/// Characters escaped in key values of generated identifiers
const KEY_VALUE: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'/').add(b',').add(b'=');

pub(crate) fn percent_decode(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    let escapes_valid = bytes.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !escapes_valid {
        return Err(RestconfError::BadFormat(format!(
            "invalid percent escape in \"{}\"",
            segment
        )));
    }
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RestconfError::BadFormat(format!("\"{}\" is not valid UTF-8", segment)))
}

fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, KEY_VALUE).to_string()
}
