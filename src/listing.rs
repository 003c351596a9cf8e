//! Discovery listings
//!
//! Synthesized trees describing loaded modules, available operations and
//! registered notification streams. Containers and list entries are named
//! in the RESTCONF bootstrap module's namespace.

use chrono::NaiveDate;

use crate::config::BootstrapModule;
use crate::error::{RestconfError, Result};
use crate::normalized::NormalizedNode;
use crate::qname::{QName, format_revision, parse_revision};
use crate::schema::{Module, NodeId, NodeKind, SchemaContext, SchemaContextBuilder};
use crate::types::{TypeDefinition, Value, YangType};

/// Placeholder description attached to every stream entry
pub const STREAM_DESCRIPTION: &str = "DESCRIPTION_PLACEHOLDER";

/// Operations listing together with the schema describing it.
///
/// The schema holds one augmenting `empty` leaf per RPC below the bootstrap
/// `operations` container, so the tree can be serialized like any data.
#[derive(Debug, Clone)]
pub struct OperationsListing {
    pub data: NormalizedNode,
    pub schema: SchemaContext,
    pub container: NodeId,
}

/// Builds listings named after one bootstrap module
#[derive(Debug, Clone, Copy)]
pub struct Listings<'a> {
    restconf: &'a BootstrapModule,
}

impl<'a> Listings<'a> {
    pub fn new(restconf: &'a BootstrapModule) -> Self {
        Self { restconf }
    }

    fn qname(&self, local: &str) -> QName {
        QName::new(
            self.restconf.namespace.clone(),
            parse_revision(&self.restconf.revision),
            local,
        )
    }

    /// `modules` container with one entry per module of `schema`
    pub fn modules(&self, schema: &SchemaContext) -> NormalizedNode {
        let entries = schema
            .modules()
            .iter()
            .map(|module| self.module_entry(module))
            .collect();
        NormalizedNode::container(self.qname("modules"), entries)
    }

    /// `module` list entry: name, revision, namespace and features
    pub fn module_entry(&self, module: &Module) -> NormalizedNode {
        let revision = module.revision().map(format_revision).unwrap_or_default();
        let keys = vec![
            (self.qname("name"), Value::String(module.name().to_string())),
            (self.qname("revision"), Value::String(revision)),
        ];

        let mut children: Vec<NormalizedNode> = keys
            .iter()
            .map(|(name, value)| NormalizedNode::leaf(name.clone(), value.clone()))
            .collect();
        children.push(NormalizedNode::leaf(
            self.qname("namespace"),
            Value::String(module.namespace().to_string()),
        ));
        children.extend(module.features().iter().map(|feature| {
            NormalizedNode::leaf(self.qname("feature"), Value::String(feature.clone()))
        }));
        NormalizedNode::list_entry(self.qname("module"), keys, children)
    }

    /// `operations` container with an empty leaf per RPC of `schema`
    pub fn operations(&self, schema: &SchemaContext) -> OperationsListing {
        let mut builder = SchemaContextBuilder::new();
        let bootstrap = builder.add_module(
            self.restconf.name.clone(),
            self.restconf.namespace.clone(),
            parse_revision(&self.restconf.revision),
        );
        let container = builder.add_data(bootstrap, None, "operations", NodeKind::container());

        let mut leaves = Vec::new();
        for module in schema.modules() {
            if module.rpcs().is_empty() {
                continue;
            }
            builder.add_module(module.name(), module.namespace(), module.revision());
            for rpc in module.rpcs() {
                let qname = schema.node(*rpc).qname().clone();
                builder.add_augmenting(
                    container,
                    qname.clone(),
                    NodeKind::leaf(TypeDefinition::builtin(YangType::Empty)),
                );
                leaves.push(NormalizedNode::leaf(qname, Value::Empty));
            }
        }

        OperationsListing {
            data: NormalizedNode::container(self.qname("operations"), leaves),
            schema: builder.build(),
            container,
        }
    }

    /// `streams` container with one entry per stream name, sorted by name
    pub fn streams(&self, mut names: Vec<String>) -> NormalizedNode {
        names.sort();
        let entries = names
            .into_iter()
            .map(|name| {
                let key = (self.qname("name"), Value::String(name));
                NormalizedNode::list_entry(
                    self.qname("stream"),
                    vec![key.clone()],
                    vec![
                        NormalizedNode::leaf(key.0, key.1),
                        NormalizedNode::leaf(
                            self.qname("description"),
                            Value::String(STREAM_DESCRIPTION.into()),
                        ),
                        NormalizedNode::leaf(self.qname("replay-support"), Value::Boolean(true)),
                        NormalizedNode::leaf(
                            self.qname("replay-log-creation-time"),
                            Value::String(String::new()),
                        ),
                        NormalizedNode::leaf(self.qname("events"), Value::String(String::new())),
                    ],
                )
            })
            .collect();
        NormalizedNode::container(self.qname("streams"), entries)
    }
}

/// Split `[<mount>/yang-ext:mount/]name/yyyy-MM-dd` into module name and revision
pub fn parse_module_identifier(identifier: &str, marker: &str) -> Result<(String, NaiveDate)> {
    let tail = match identifier.find(marker) {
        Some(index) => &identifier[index + marker.len()..],
        None => identifier,
    };
    let parts: Vec<&str> = tail.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() < 2 {
        return Err(RestconfError::BadFormat(
            "End of URI should be in format 'moduleName/yyyy-MM-dd'".into(),
        ));
    }
    let revision = parse_revision(parts[1]).ok_or_else(|| {
        RestconfError::BadFormat("URI should end with 'moduleName/yyyy-MM-dd'".into())
    })?;
    Ok((parts[0].to_string(), revision))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaContext {
        let mut b = SchemaContextBuilder::new();
        let toaster = b.add_module("toaster", "urn:toaster", NaiveDate::from_ymd_opt(2009, 11, 20));
        b.add_feature(toaster, "heating");
        b.add_rpc(toaster, "make-toast");
        b.add_rpc(toaster, "cancel-toast");
        b.add_module("plain", "urn:plain", None);
        b.build()
    }

    #[test]
    fn test_modules_listing() {
        let restconf = BootstrapModule::default();
        let schema = schema();
        let modules = Listings::new(&restconf).modules(&schema);

        assert_eq!(modules.name().local_name(), "modules");
        assert_eq!(modules.name().namespace(), restconf.namespace);
        assert_eq!(modules.children().len(), 2);

        let toaster = &modules.children()[0];
        assert_eq!(toaster.leaf_value("revision"), Some(&Value::String("2009-11-20".into())));
        assert_eq!(toaster.leaf_value("feature"), Some(&Value::String("heating".into())));
        assert_eq!(toaster.keys().len(), 2);
        assert_eq!(
            modules.children()[1].leaf_value("revision"),
            Some(&Value::String(String::new()))
        );
    }

    #[test]
    fn test_operations_listing_is_augmented() {
        let restconf = BootstrapModule::default();
        let schema = schema();
        let listing = Listings::new(&restconf).operations(&schema);

        assert_eq!(listing.data.children().len(), 2);
        assert_eq!(listing.data.children()[0].value(), Some(&Value::Empty));

        let children = listing.schema.node(listing.container).children();
        assert_eq!(children.len(), 2);
        let leaf = listing.schema.node(children[0]);
        assert!(leaf.is_augmenting());
        assert_eq!(leaf.qname().namespace(), "urn:toaster");
        assert_eq!(listing.schema.module_name_by_namespace("urn:toaster"), Some("toaster"));
    }

    #[test]
    fn test_streams_listing() {
        let restconf = BootstrapModule::default();
        let streams = Listings::new(&restconf).streams(vec!["b".into(), "a".into()]);
        assert_eq!(streams.children().len(), 2);
        let first = &streams.children()[0];
        assert_eq!(first.leaf_value("name"), Some(&Value::String("a".into())));
        assert_eq!(
            first.leaf_value("description"),
            Some(&Value::String(STREAM_DESCRIPTION.into()))
        );
        assert_eq!(first.leaf_value("replay-support"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_parse_module_identifier() {
        let (name, revision) = parse_module_identifier("toaster/2009-11-20", "yang-ext:mount").unwrap();
        assert_eq!(name, "toaster");
        assert_eq!(revision, NaiveDate::from_ymd_opt(2009, 11, 20).unwrap());

        let (name, _) = parse_module_identifier(
            "nodes/node=d1/yang-ext:mount/device/2014-01-01",
            "yang-ext:mount",
        )
        .unwrap();
        assert_eq!(name, "device");

        assert!(parse_module_identifier("toaster", "yang-ext:mount").is_err());
        assert!(parse_module_identifier("toaster/20-11-2009x", "yang-ext:mount").is_err());
    }
}
