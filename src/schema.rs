//! Schema registry
//!
//! A [`SchemaContext`] is an immutable snapshot of every loaded module and
//! its schema nodes. Nodes live in a flat arena and refer to each other by
//! [`NodeId`], so walking up or down the tree never needs shared pointers.
//! [`SchemaHandle`] publishes the current snapshot and lets a model reload
//! swap it atomically while in-flight requests keep the one they loaded.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::NaiveDate;

use crate::instance_id::InstancePath;
use crate::qname::QName;
use crate::types::TypeDefinition;

/// Index of a schema node inside its [`SchemaContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Index of a module inside its [`SchemaContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

/// Kind-specific part of a schema node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    /// List with key leaf local names in declaration order
    List {
        keys: Vec<String>,
    },
    Leaf {
        ty: TypeDefinition,
    },
    LeafList {
        ty: TypeDefinition,
    },
    AnyData,
    Rpc {
        input: Option<NodeId>,
        output: Option<NodeId>,
    },
}

impl NodeKind {
    pub fn container() -> Self {
        NodeKind::Container
    }

    pub fn list<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        NodeKind::List {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn leaf(ty: TypeDefinition) -> Self {
        NodeKind::Leaf { ty }
    }

    pub fn leaf_list(ty: TypeDefinition) -> Self {
        NodeKind::LeafList { ty }
    }

    /// Short kind name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Container => "container",
            NodeKind::List { .. } => "list",
            NodeKind::Leaf { .. } => "leaf",
            NodeKind::LeafList { .. } => "leaf-list",
            NodeKind::AnyData => "anydata",
            NodeKind::Rpc { .. } => "rpc",
        }
    }
}

/// One modeled element
#[derive(Debug, Clone)]
pub struct SchemaNode {
    qname: QName,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    augmenting: bool,
}

impl SchemaNode {
    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// True if contributed by a module other than the structural parent's module
    pub fn is_augmenting(&self) -> bool {
        self.augmenting
    }

    /// Containers and lists hold child data nodes
    pub fn is_data_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container | NodeKind::List { .. })
    }

    pub fn leaf_type(&self) -> Option<&TypeDefinition> {
        match &self.kind {
            NodeKind::Leaf { ty } | NodeKind::LeafList { ty } => Some(ty),
            _ => None,
        }
    }

    /// Declared key names; empty for anything but keyed lists
    pub fn list_keys(&self) -> &[String] {
        match &self.kind {
            NodeKind::List { keys } => keys,
            _ => &[],
        }
    }
}

/// A loaded module
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    namespace: String,
    revision: Option<NaiveDate>,
    features: Vec<String>,
    identities: Vec<String>,
    data: Vec<NodeId>,
    rpcs: Vec<NodeId>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn revision(&self) -> Option<NaiveDate> {
        self.revision
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    /// Top-level data nodes declared by this module
    pub fn data(&self) -> &[NodeId] {
        &self.data
    }

    pub fn rpcs(&self) -> &[NodeId] {
        &self.rpcs
    }

    /// Qualified name of an element of this module
    pub fn qname(&self, local_name: impl Into<String>) -> QName {
        QName::new(self.namespace.clone(), self.revision, local_name)
    }
}

/// Immutable snapshot of all loaded modules
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
}

impl SchemaContext {
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// Module by name; the latest revision wins when several are loaded
    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.modules
            .iter()
            .filter(|m| m.name == name)
            .max_by_key(|m| m.revision)
    }

    pub fn module_by_name_and_revision(
        &self,
        name: &str,
        revision: Option<NaiveDate>,
    ) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.name == name && m.revision == revision)
    }

    pub fn module_by_namespace(&self, namespace: &str) -> Option<&Module> {
        self.modules
            .iter()
            .filter(|m| m.namespace == namespace)
            .max_by_key(|m| m.revision)
    }

    pub fn module_name_by_namespace(&self, namespace: &str) -> Option<&str> {
        self.module_by_namespace(namespace).map(Module::name)
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// Data children of `parent`, or all top-level data nodes for `None`
    pub fn child_ids(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            Some(id) => self.node(id).children.clone(),
            None => self
                .modules
                .iter()
                .flat_map(|m| m.data.iter().copied())
                .collect(),
        }
    }

    /// All children sharing a local name.
    ///
    /// More than one entry means separate modules augmented the same name
    /// into `parent`; the caller decides how to disambiguate.
    pub fn find_children_by_name(&self, parent: Option<NodeId>, local_name: &str) -> Vec<NodeId> {
        self.child_ids(parent)
            .into_iter()
            .filter(|id| self.node(*id).qname.local_name() == local_name)
            .collect()
    }

    pub fn find_child(
        &self,
        parent: Option<NodeId>,
        local_name: &str,
        namespace: &str,
    ) -> Option<NodeId> {
        self.find_children_by_name(parent, local_name)
            .into_iter()
            .find(|id| self.node(*id).qname.namespace() == namespace)
    }

    /// Schema node addressed by an instance path; `None` for the empty path
    pub fn find_node(&self, path: &InstancePath) -> Option<NodeId> {
        let mut current = None;
        for argument in path.arguments() {
            let qname = argument.name();
            current = Some(self.find_child(current, qname.local_name(), qname.namespace())?);
        }
        current
    }

    /// Resolve a schema path like `/module:a/b/other:c`.
    ///
    /// Unprefixed steps inherit the module of the previous step.
    pub fn resolve_schema_path(&self, path: &str) -> Option<NodeId> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current = None;
        let mut namespace: Option<&str> = None;
        for step in path.split('/').filter(|s| !s.is_empty()) {
            let local = match step.split_once(':') {
                Some((prefix, local)) => {
                    namespace = Some(self.module_by_name(prefix)?.namespace());
                    local
                }
                None => step,
            };
            current = Some(self.find_child(current, local, namespace?)?);
        }
        current
    }

    /// RPC definitions with the given local name across all modules
    pub fn find_rpcs_by_name(&self, local_name: &str) -> Vec<NodeId> {
        self.modules
            .iter()
            .flat_map(|m| m.rpcs.iter().copied())
            .filter(|id| self.node(*id).qname.local_name() == local_name)
            .collect()
    }

    /// Qualified path of `id` from the schema root
    pub fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).parent;
        }
        chain.reverse();
        chain
    }

    /// Display form of `id` as `/module:a/b/c` for diagnostics
    pub fn describe(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut namespace = "";
        for step in self.ancestry(id) {
            let qname = &self.node(step).qname;
            out.push('/');
            if qname.namespace() != namespace {
                namespace = qname.namespace();
                if let Some(module) = self.module_name_by_namespace(namespace) {
                    out.push_str(module);
                    out.push(':');
                }
            }
            out.push_str(qname.local_name());
        }
        out
    }
}

/// Programmatic construction of a [`SchemaContext`]
#[derive(Debug, Default)]
pub struct SchemaContextBuilder {
    ctx: SchemaContext,
}

impl SchemaContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        revision: Option<NaiveDate>,
    ) -> ModuleId {
        self.ctx.modules.push(Module {
            name: name.into(),
            namespace: namespace.into(),
            revision,
            features: Vec::new(),
            identities: Vec::new(),
            data: Vec::new(),
            rpcs: Vec::new(),
        });
        ModuleId(self.ctx.modules.len() - 1)
    }

    pub fn add_feature(&mut self, module: ModuleId, feature: impl Into<String>) {
        self.ctx.modules[module.0].features.push(feature.into());
    }

    pub fn add_identity(&mut self, module: ModuleId, identity: impl Into<String>) {
        self.ctx.modules[module.0].identities.push(identity.into());
    }

    /// Add a data node owned by `module`.
    ///
    /// The node is flagged augmenting when its parent belongs to another module.
    pub fn add_data(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        local_name: impl Into<String>,
        kind: NodeKind,
    ) -> NodeId {
        let qname = self.ctx.modules[module.0].qname(local_name);
        let augmenting = parent
            .map(|p| self.ctx.node(p).qname.namespace() != qname.namespace())
            .unwrap_or(false);
        let id = self.push_node(qname, parent, kind, augmenting);
        if parent.is_none() {
            self.ctx.modules[module.0].data.push(id);
        }
        id
    }

    /// Attach a node with an arbitrary qualified name below `parent`
    pub fn add_augmenting(&mut self, parent: NodeId, qname: QName, kind: NodeKind) -> NodeId {
        self.push_node(qname, Some(parent), kind, true)
    }

    pub fn add_rpc(&mut self, module: ModuleId, local_name: impl Into<String>) -> NodeId {
        let qname = self.ctx.modules[module.0].qname(local_name);
        let id = self.push_node(
            qname,
            None,
            NodeKind::Rpc {
                input: None,
                output: None,
            },
            false,
        );
        self.ctx.modules[module.0].rpcs.push(id);
        id
    }

    /// Declare the input container of `rpc`, returning it for adding leaves
    pub fn add_rpc_input(&mut self, rpc: NodeId) -> NodeId {
        self.add_rpc_io(rpc, "input")
    }

    /// Declare the output container of `rpc`
    pub fn add_rpc_output(&mut self, rpc: NodeId) -> NodeId {
        self.add_rpc_io(rpc, "output")
    }

    fn add_rpc_io(&mut self, rpc: NodeId, local_name: &str) -> NodeId {
        let qname = self.ctx.node(rpc).qname.sibling(local_name);
        let id = self.push_node(qname, Some(rpc), NodeKind::container(), false);
        if let NodeKind::Rpc { input, output } = &mut self.ctx.nodes[rpc.0].kind {
            if local_name == "input" {
                *input = Some(id);
            } else {
                *output = Some(id);
            }
        }
        id
    }

    /// Read access to what has been built so far
    pub fn context(&self) -> &SchemaContext {
        &self.ctx
    }

    pub fn build(self) -> SchemaContext {
        self.ctx
    }

    fn push_node(
        &mut self,
        qname: QName,
        parent: Option<NodeId>,
        kind: NodeKind,
        augmenting: bool,
    ) -> NodeId {
        let id = NodeId(self.ctx.nodes.len());
        self.ctx.nodes.push(SchemaNode {
            qname,
            parent,
            children: Vec::new(),
            kind,
            augmenting,
        });
        // rpc input/output are reached through the rpc kind, not as data children
        if let Some(p) = parent
            && !matches!(self.ctx.nodes[p.0].kind, NodeKind::Rpc { .. })
        {
            self.ctx.nodes[p.0].children.push(id);
        }
        id
    }
}

/// Shared handle publishing the current schema snapshot
#[derive(Debug)]
pub struct SchemaHandle {
    current: ArcSwap<SchemaContext>,
}

impl SchemaHandle {
    pub fn new(ctx: SchemaContext) -> Self {
        Self {
            current: ArcSwap::from_pointee(ctx),
        }
    }

    /// Snapshot to use for the whole of one request
    pub fn snapshot(&self) -> Arc<SchemaContext> {
        self.current.load_full()
    }

    /// Publish a reloaded schema; existing snapshots stay valid
    pub fn replace(&self, ctx: SchemaContext) {
        self.current.store(Arc::new(ctx));
    }
}
