//! Schema bundle loading
//!
//! A schema bundle is a JSON document describing already compiled YANG
//! modules: data trees, RPCs, typedefs, identities, features and augment
//! statements. Loading builds a [`SchemaContext`].
//!
//! ```json
//! {"modules": [{
//!     "name": "example", "namespace": "urn:example", "revision": "2014-01-01",
//!     "typedefs": [{"name": "percent", "type": "uint8"}],
//!     "data": [{"kind": "container", "name": "top", "children": [
//!         {"kind": "leaf", "name": "load", "type": "percent"}
//!     ]}],
//!     "rpcs": [{"name": "reset", "input": [{"kind": "leaf", "name": "delay", "type": "uint32"}]}],
//!     "augments": [{"target": "/other:root", "data": []}]
//! }]}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{RestconfError, Result};
use crate::qname::parse_revision;
use crate::schema::{ModuleId, NodeId, NodeKind, SchemaContext, SchemaContextBuilder};
use crate::types::{TypeDefinition, YangType};

#[derive(Debug, Deserialize)]
struct RawBundle {
    modules: Vec<RawModule>,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    name: String,
    namespace: String,
    revision: Option<String>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    identities: Vec<String>,
    #[serde(default)]
    typedefs: Vec<RawTypedef>,
    #[serde(default)]
    data: Vec<RawNode>,
    #[serde(default)]
    rpcs: Vec<RawRpc>,
    #[serde(default)]
    augments: Vec<RawAugment>,
}

#[derive(Debug, Deserialize)]
struct RawTypedef {
    name: String,
    #[serde(rename = "type")]
    ty: RawType,
}

/// Either a type name (`string`, `percent`, `other-module:counter`) or a
/// type with arguments
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawType {
    Name(String),
    Spec(RawTypeSpec),
}

#[derive(Debug, Deserialize)]
struct RawTypeSpec {
    base: String,
    /// Enumeration member names, valued by position
    #[serde(rename = "enum", default)]
    enumeration: Vec<String>,
    #[serde(default)]
    bits: Vec<String>,
    /// Leafref target path
    path: Option<String>,
    /// Union member types
    #[serde(default)]
    types: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum RawNode {
    Container {
        name: String,
        #[serde(default)]
        children: Vec<RawNode>,
    },
    List {
        name: String,
        #[serde(default)]
        keys: Vec<String>,
        #[serde(default)]
        children: Vec<RawNode>,
    },
    Leaf {
        name: String,
        #[serde(rename = "type")]
        ty: RawType,
    },
    LeafList {
        name: String,
        #[serde(rename = "type")]
        ty: RawType,
    },
    Anydata {
        name: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawRpc {
    name: String,
    input: Option<Vec<RawNode>>,
    output: Option<Vec<RawNode>>,
}

#[derive(Debug, Deserialize)]
struct RawAugment {
    /// Absolute schema path of the augmented node
    target: String,
    #[serde(default)]
    data: Vec<RawNode>,
}

/// Resolves type references of one bundle, following typedef chains
struct TypeResolver<'r> {
    modules: &'r [RawModule],
    by_name: HashMap<&'r str, usize>,
}

impl<'r> TypeResolver<'r> {
    fn new(modules: &'r [RawModule]) -> Self {
        let by_name = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();
        Self { modules, by_name }
    }

    fn resolve(&self, module: usize, ty: &RawType, stack: &mut Vec<String>) -> Result<TypeDefinition> {
        let spec = match ty {
            RawType::Name(name) => return self.resolve_name(module, name, stack),
            RawType::Spec(spec) => spec,
        };
        let ty = match spec.base.as_str() {
            "enumeration" => YangType::Enumeration(
                spec.enumeration
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), i as i64))
                    .collect(),
            ),
            "bits" => YangType::Bits(spec.bits.clone()),
            "leafref" => YangType::Leafref(spec.path.clone().ok_or_else(|| {
                RestconfError::InvalidBundle("leafref type without a path".into())
            })?),
            "union" => YangType::Union(
                spec.types
                    .iter()
                    .map(|member| self.resolve(module, member, stack))
                    .collect::<Result<_>>()?,
            ),
            other => return self.resolve_name(module, other, stack),
        };
        Ok(TypeDefinition::builtin(ty))
    }

    fn resolve_name(&self, module: usize, name: &str, stack: &mut Vec<String>) -> Result<TypeDefinition> {
        if let Some(builtin) = YangType::from_name(name) {
            return Ok(TypeDefinition::builtin(builtin));
        }
        if YangType::is_parameterized(name) {
            return Err(RestconfError::InvalidBundle(format!(
                "type \"{}\" needs arguments",
                name
            )));
        }

        let (owner, local) = match name.split_once(':') {
            Some((prefix, local)) => {
                let owner = self.by_name.get(prefix).copied().ok_or_else(|| {
                    RestconfError::InvalidBundle(format!("unknown module in type \"{}\"", name))
                })?;
                (owner, local)
            }
            None => (module, name),
        };
        let typedef = self.modules[owner]
            .typedefs
            .iter()
            .find(|t| t.name == local)
            .ok_or_else(|| RestconfError::InvalidBundle(format!("unknown type \"{}\"", name)))?;

        let key = format!("{}:{}", self.modules[owner].name, local);
        if stack.contains(&key) {
            return Err(RestconfError::InvalidBundle(format!(
                "typedef \"{}\" derives from itself",
                key
            )));
        }
        stack.push(key);
        let base = self.resolve(owner, &typedef.ty, stack)?;
        stack.pop();
        Ok(TypeDefinition::derived(local, base))
    }
}

struct Loader<'r> {
    builder: SchemaContextBuilder,
    types: TypeResolver<'r>,
}

impl Loader<'_> {
    fn add_nodes(
        &mut self,
        raw_module: usize,
        module: ModuleId,
        parent: Option<NodeId>,
        nodes: &[RawNode],
    ) -> Result<()> {
        for node in nodes {
            self.add_node(raw_module, module, parent, node)?;
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        raw_module: usize,
        module: ModuleId,
        parent: Option<NodeId>,
        node: &RawNode,
    ) -> Result<()> {
        match node {
            RawNode::Container { name, children } => {
                let id = self
                    .builder
                    .add_data(module, parent, name.as_str(), NodeKind::Container);
                self.add_nodes(raw_module, module, Some(id), children)?;
            }
            RawNode::List {
                name,
                keys,
                children,
            } => {
                let id = self
                    .builder
                    .add_data(module, parent, name.as_str(), NodeKind::list(keys.iter().cloned()));
                self.add_nodes(raw_module, module, Some(id), children)?;
                let ctx = self.builder.context();
                if let Some(missing) = keys
                    .iter()
                    .find(|key| ctx.find_children_by_name(Some(id), key).is_empty())
                {
                    return Err(RestconfError::InvalidBundle(format!(
                        "list \"{}\" declares key \"{}\" but has no such leaf",
                        name, missing
                    )));
                }
            }
            RawNode::Leaf { name, ty } => {
                let ty = self.types.resolve(raw_module, ty, &mut Vec::new())?;
                self.builder
                    .add_data(module, parent, name.as_str(), NodeKind::leaf(ty));
            }
            RawNode::LeafList { name, ty } => {
                let ty = self.types.resolve(raw_module, ty, &mut Vec::new())?;
                self.builder
                    .add_data(module, parent, name.as_str(), NodeKind::leaf_list(ty));
            }
            RawNode::Anydata { name } => {
                self.builder
                    .add_data(module, parent, name.as_str(), NodeKind::AnyData);
            }
        }
        Ok(())
    }
}

impl SchemaContext {
    /// Load a schema bundle from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Load a schema bundle from a JSON string.
    ///
    /// Augments are applied after every module's own data is in place. An
    /// augment whose target is itself added by another augment waits until
    /// that target exists.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawBundle = serde_json::from_str(content)?;
        let mut loader = Loader {
            builder: SchemaContextBuilder::new(),
            types: TypeResolver::new(&raw.modules),
        };

        let mut ids = Vec::with_capacity(raw.modules.len());
        for module in &raw.modules {
            let revision = match module.revision.as_deref() {
                Some(rev) => Some(parse_revision(rev).ok_or_else(|| {
                    RestconfError::InvalidBundle(format!(
                        "module \"{}\" has malformed revision \"{}\"",
                        module.name, rev
                    ))
                })?),
                None => None,
            };
            let id = loader
                .builder
                .add_module(module.name.as_str(), module.namespace.as_str(), revision);
            for feature in &module.features {
                loader.builder.add_feature(id, feature.as_str());
            }
            for identity in &module.identities {
                loader.builder.add_identity(id, identity.as_str());
            }
            ids.push(id);
        }

        for (index, module) in raw.modules.iter().enumerate() {
            loader.add_nodes(index, ids[index], None, &module.data)?;
            for rpc in &module.rpcs {
                let rpc_id = loader.builder.add_rpc(ids[index], rpc.name.as_str());
                if let Some(input) = &rpc.input {
                    let input_id = loader.builder.add_rpc_input(rpc_id);
                    loader.add_nodes(index, ids[index], Some(input_id), input)?;
                }
                if let Some(output) = &rpc.output {
                    let output_id = loader.builder.add_rpc_output(rpc_id);
                    loader.add_nodes(index, ids[index], Some(output_id), output)?;
                }
            }
        }

        let mut pending: Vec<(usize, &RawAugment)> = raw
            .modules
            .iter()
            .enumerate()
            .flat_map(|(index, m)| m.augments.iter().map(move |a| (index, a)))
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (index, augment) in pending {
                match loader.builder.context().resolve_schema_path(&augment.target) {
                    Some(target) => {
                        debug!(module = %raw.modules[index].name, target = %augment.target, "applying augment");
                        loader.add_nodes(index, ids[index], Some(target), &augment.data)?;
                    }
                    None => waiting.push((index, augment)),
                }
            }
            if waiting.len() == before {
                let targets: Vec<&str> = waiting.iter().map(|(_, a)| a.target.as_str()).collect();
                return Err(RestconfError::InvalidBundle(format!(
                    "augment target(s) not found: {}",
                    targets.join(", ")
                )));
            }
            pending = waiting;
        }

        Ok(loader.builder.build())
    }
}

impl std::str::FromStr for SchemaContext {
    type Err = RestconfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}
