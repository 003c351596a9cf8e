//! RPC resolution and result handling
//!
//! An RPC identifier is `module:name`, optionally behind a mount point:
//! `<mount path>/yang-ext:mount/module:name`. The resolved [`RpcTarget`]
//! records which schema declared the RPC and which executor it is bound to.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::broker::StreamRegistry;
use crate::config::SubscriptionConfig;
use crate::error::{RestconfError, Result};
use crate::instance_id::{PathArgument, PathResolver, percent_decode};
use crate::mount::{MountPoint, MountRegistry};
use crate::normalized::NormalizedNode;
use crate::payload::PayloadNode;
use crate::qname::QName;
use crate::schema::{NodeId, NodeKind, SchemaContext};
use crate::types::Value;

/// Severity of a reported RPC error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

/// One error reported by an RPC executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// RESTCONF error-tag, e.g. `operation-failed`
    pub tag: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub app_tag: Option<String>,
}

impl RpcError {
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
            app_tag: None,
        }
    }
}

/// Result of one RPC execution
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResult {
    pub successful: bool,
    pub output: Option<NormalizedNode>,
    pub errors: Vec<RpcError>,
}

impl RpcResult {
    pub fn success(output: Option<NormalizedNode>) -> Self {
        Self {
            successful: true,
            output,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<RpcError>) -> Self {
        Self {
            successful: false,
            output: None,
            errors,
        }
    }

    /// Output of a successful result, or the failure it reported.
    ///
    /// A failed result without any errors is still a failure.
    pub fn into_output(self) -> Result<Option<NormalizedNode>> {
        if self.successful {
            return Ok(self.output);
        }
        if self.errors.is_empty() {
            warn!("rpc failed without reporting errors");
            return Err(RestconfError::OperationFailedNoDetail);
        }
        warn!(errors = self.errors.len(), "rpc failed");
        Err(RestconfError::OperationFailed {
            errors: self.errors,
        })
    }
}

/// RPC executor, local or provided by a mount point
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn invoke(&self, rpc: &QName, input: Option<NormalizedNode>) -> Result<RpcResult>;
}

/// Executor an RPC is dispatched to
#[derive(Clone)]
pub enum RpcBinding {
    Local,
    Mounted(Arc<dyn MountPoint>),
}

impl RpcBinding {
    pub fn is_mounted(&self) -> bool {
        matches!(self, RpcBinding::Mounted(_))
    }
}

impl std::fmt::Debug for RpcBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcBinding::Local => f.write_str("Local"),
            RpcBinding::Mounted(_) => f.write_str("Mounted"),
        }
    }
}

/// Resolved RPC invocation target
#[derive(Debug, Clone)]
pub struct RpcTarget {
    node: NodeId,
    schema: Arc<SchemaContext>,
    binding: RpcBinding,
}

impl RpcTarget {
    pub fn qname(&self) -> &QName {
        self.schema.node(self.node).qname()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Schema declaring the RPC; the mounted schema for mount-bound targets
    pub fn schema(&self) -> &Arc<SchemaContext> {
        &self.schema
    }

    pub fn binding(&self) -> &RpcBinding {
        &self.binding
    }

    pub fn input(&self) -> Option<NodeId> {
        match self.schema.node(self.node).kind() {
            NodeKind::Rpc { input, .. } => *input,
            _ => None,
        }
    }

    pub fn output(&self) -> Option<NodeId> {
        match self.schema.node(self.node).kind() {
            NodeKind::Rpc { output, .. } => *output,
            _ => None,
        }
    }

    /// Check payload presence against the declared input.
    ///
    /// An input without any children counts as not declared.
    pub fn validate_input(&self, payload: Option<&PayloadNode>) -> Result<()> {
        let declared = self
            .input()
            .is_some_and(|input| !self.schema.node(input).children().is_empty());
        match (declared, payload) {
            (true, None) => Err(RestconfError::MissingInput),
            (false, Some(_)) => Err(RestconfError::UnexpectedInput),
            _ => Ok(()),
        }
    }

    pub fn is_subscription(&self, config: &SubscriptionConfig) -> bool {
        let qname = self.qname();
        qname.namespace() == config.namespace && qname.local_name() == config.rpc_name
    }
}

/// Resolves RPC identifiers against a schema snapshot and its mount points
pub struct RpcResolver<'a> {
    schema: &'a Arc<SchemaContext>,
    mounts: Option<&'a dyn MountRegistry>,
    marker: &'a str,
}

impl<'a> RpcResolver<'a> {
    pub fn new(schema: &'a Arc<SchemaContext>, marker: &'a str) -> Self {
        Self {
            schema,
            mounts: None,
            marker,
        }
    }

    pub fn with_mounts(mut self, mounts: &'a dyn MountRegistry) -> Self {
        self.mounts = Some(mounts);
        self
    }

    pub fn resolve(&self, identifier: &str) -> Result<RpcTarget> {
        let trimmed = identifier.trim_start_matches('/');
        let mount_separator = format!("/{}/", self.marker);

        let (schema, binding, name) = match trimmed.split_once(&mount_separator) {
            Some((outer, name)) => {
                let mut resolver = PathResolver::new(self.schema, self.marker);
                if let Some(mounts) = self.mounts {
                    resolver = resolver.with_mounts(mounts);
                }
                let mount_root = resolver.resolve(&format!("{}/{}", outer, self.marker))?;
                let point = mount_root
                    .mount_point()
                    .cloned()
                    .ok_or_else(|| RestconfError::MountPointNotFound(outer.to_string()))?;
                (point.schema(), RpcBinding::Mounted(point), name)
            }
            None => (Arc::clone(self.schema), RpcBinding::Local, trimmed),
        };

        if name.is_empty() {
            return Err(RestconfError::BadFormat(format!(
                "identifier \"{}\" does not name an operation",
                identifier
            )));
        }
        if name.contains('/') {
            return Err(RestconfError::IllegalSeparator(identifier.to_string()));
        }

        let name = percent_decode(name)?;
        let node = find_rpc(&schema, &name)?;
        debug!(rpc = %schema.node(node).qname(), mounted = binding.is_mounted(), "resolved rpc");
        Ok(RpcTarget {
            node,
            schema,
            binding,
        })
    }
}

/// Find an RPC by `module:name`, or by a bare name defined in only one module
fn find_rpc(schema: &SchemaContext, name: &str) -> Result<NodeId> {
    match name.split_once(':') {
        Some((module, local)) => {
            let module = schema
                .module_by_name(module)
                .ok_or_else(|| RestconfError::UnknownRpc(name.to_string()))?;
            module
                .rpcs()
                .iter()
                .copied()
                .find(|id| schema.node(*id).qname().local_name() == local)
                .ok_or_else(|| RestconfError::UnknownRpc(name.to_string()))
        }
        None => match schema.find_rpcs_by_name(name).as_slice() {
            [] => Err(RestconfError::UnknownRpc(name.to_string())),
            [single] => Ok(*single),
            _ => Err(RestconfError::BadFormat(format!(
                "operation \"{}\" is defined by several modules, prefix it with a module name",
                name
            ))),
        },
    }
}

/// Handle the built-in stream subscription RPC.
///
/// The input's path leaf must hold an instance identifier denoting a
/// container or list entry. The derived stream name is registered once and
/// returned in the output.
pub fn subscribe(
    target: &RpcTarget,
    input: Option<&NormalizedNode>,
    config: &SubscriptionConfig,
    streams: &dyn StreamRegistry,
) -> Result<NormalizedNode> {
    let schema = target.schema();
    let path = match input.and_then(|input| input.leaf_value(&config.path_leaf)) {
        Some(Value::InstanceIdentifier(path)) if !path.is_empty() => path,
        _ => {
            return Err(RestconfError::invalid_value(
                config.path_leaf.as_str(),
                "instance identifier was not normalized correctly",
            ));
        }
    };

    let subscribable = match (path.last(), schema.find_node(path)) {
        (Some(PathArgument::Entry { .. }), Some(_)) => true,
        (Some(PathArgument::Node(_)), Some(id)) => {
            matches!(schema.node(id).kind(), NodeKind::Container)
        }
        _ => false,
    };
    if !subscribable {
        return Err(RestconfError::invalid_value(
            config.path_leaf.as_str(),
            format!("{} does not denote a container or list entry", path),
        ));
    }

    let stream_name = path.to_restconf_identifier(schema);
    if streams.register_if_absent(path, &stream_name) {
        info!(stream = %stream_name, "registered data change stream");
    } else {
        debug!(stream = %stream_name, "stream already registered");
    }

    let rpc = target.qname();
    let output_name = match target.output() {
        Some(output) => schema.node(output).qname().clone(),
        None => rpc.sibling("output"),
    };
    Ok(NormalizedNode::container(
        output_name,
        vec![NormalizedNode::leaf(
            rpc.sibling(config.output_leaf.as_str()),
            Value::String(stream_name),
        )],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DataBroker;
    use crate::instance_id::InstancePath;
    use crate::schema::SchemaContextBuilder;
    use crate::types::{TypeDefinition, YangType};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const REMOTE_NS: &str = "urn:opendaylight:params:xml:ns:yang:controller:md:sal:remote";

    fn local_schema() -> SchemaContext {
        let mut b = SchemaContextBuilder::new();
        let m = b.add_module("toaster", "urn:toaster", None);
        let nodes = b.add_data(m, None, "nodes", NodeKind::container());
        let node = b.add_data(m, Some(nodes), "node", NodeKind::list(["id"]));
        b.add_data(m, Some(node), "id", NodeKind::leaf(TypeDefinition::builtin(YangType::String)));

        let make = b.add_rpc(m, "make-toast");
        let input = b.add_rpc_input(make);
        b.add_data(m, Some(input), "doneness", NodeKind::leaf(TypeDefinition::builtin(YangType::Uint8)));
        b.add_rpc(m, "cancel-toast");

        let remote = b.add_module("sal-remote", REMOTE_NS, None);
        let sub = b.add_rpc(remote, "create-data-change-event-subscription");
        let input = b.add_rpc_input(sub);
        b.add_data(
            remote,
            Some(input),
            "path",
            NodeKind::leaf(TypeDefinition::builtin(YangType::InstanceIdentifier)),
        );
        let output = b.add_rpc_output(sub);
        b.add_data(remote, Some(output), "stream-name", NodeKind::leaf(TypeDefinition::builtin(YangType::String)));
        b.build()
    }

    struct Device(Arc<SchemaContext>);

    impl MountPoint for Device {
        fn schema(&self) -> Arc<SchemaContext> {
            Arc::clone(&self.0)
        }

        fn broker(&self) -> Option<&dyn DataBroker> {
            None
        }

        fn rpc_service(&self) -> Option<&dyn RpcService> {
            None
        }
    }

    struct AnyMount(Arc<dyn MountPoint>);

    impl MountRegistry for AnyMount {
        fn lookup(&self, _path: &InstancePath) -> Option<Arc<dyn MountPoint>> {
            Some(Arc::clone(&self.0))
        }
    }

    #[derive(Default)]
    struct Streams(Mutex<HashMap<String, InstancePath>>);

    impl StreamRegistry for Streams {
        fn register_if_absent(&self, path: &InstancePath, name: &str) -> bool {
            let mut streams = self.0.lock().unwrap();
            if streams.contains_key(name) {
                return false;
            }
            streams.insert(name.to_string(), path.clone());
            true
        }

        fn stream_names(&self) -> Vec<String> {
            self.0.lock().unwrap().keys().cloned().collect()
        }
    }

    #[test]
    fn test_resolve_local_rpc() {
        let schema = Arc::new(local_schema());
        let resolver = RpcResolver::new(&schema, "yang-ext:mount");

        let target = resolver.resolve("toaster:make-toast").unwrap();
        assert_eq!(target.qname().local_name(), "make-toast");
        assert!(!target.binding().is_mounted());

        let bare = resolver.resolve("/cancel-toast").unwrap();
        assert_eq!(bare.qname().namespace(), "urn:toaster");

        assert!(matches!(
            resolver.resolve("toaster:burn-toast"),
            Err(RestconfError::UnknownRpc(_))
        ));
        assert!(matches!(
            resolver.resolve("toaster:nodes/toaster:make-toast"),
            Err(RestconfError::IllegalSeparator(_))
        ));
    }

    #[test]
    fn test_resolve_mounted_rpc_binds_mounted_schema() {
        let local = Arc::new(local_schema());
        let mut b = SchemaContextBuilder::new();
        let dev = b.add_module("device", "urn:device", None);
        b.add_rpc(dev, "reboot");
        let mounted = Arc::new(b.build());
        let registry = AnyMount(Arc::new(Device(Arc::clone(&mounted))));

        let resolver = RpcResolver::new(&local, "yang-ext:mount").with_mounts(&registry);
        let target = resolver
            .resolve("toaster:nodes/node=d1/yang-ext:mount/device:reboot")
            .unwrap();
        assert!(target.binding().is_mounted());
        assert!(Arc::ptr_eq(target.schema(), &mounted));
        assert!(!Arc::ptr_eq(target.schema(), &local));

        // the remote rpc is not visible locally
        assert!(resolver.resolve("device:reboot").is_err());
    }

    #[test]
    fn test_validate_input() {
        let schema = Arc::new(local_schema());
        let resolver = RpcResolver::new(&schema, "yang-ext:mount");
        let make = resolver.resolve("toaster:make-toast").unwrap();
        let cancel = resolver.resolve("toaster:cancel-toast").unwrap();
        let payload = PayloadNode::composite("input", vec![]);

        assert!(matches!(make.validate_input(None), Err(RestconfError::MissingInput)));
        assert!(make.validate_input(Some(&payload)).is_ok());
        assert!(matches!(
            cancel.validate_input(Some(&payload)),
            Err(RestconfError::UnexpectedInput)
        ));
        assert!(cancel.validate_input(None).is_ok());
    }

    #[test]
    fn test_result_into_output() {
        assert!(RpcResult::success(None).into_output().unwrap().is_none());
        assert!(matches!(
            RpcResult::failed(Vec::new()).into_output(),
            Err(RestconfError::OperationFailedNoDetail)
        ));
        match RpcResult::failed(vec![RpcError::new("operation-failed", "toaster is on fire")])
            .into_output()
        {
            Err(RestconfError::OperationFailed { errors }) => {
                assert_eq!(errors[0].message, "toaster is on fire");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_registers_once() {
        let schema = Arc::new(local_schema());
        let resolver = RpcResolver::new(&schema, "yang-ext:mount");
        let target = resolver
            .resolve("sal-remote:create-data-change-event-subscription")
            .unwrap();
        let config = SubscriptionConfig::default();
        assert!(target.is_subscription(&config));

        let path = crate::instance_id::parse_instance_identifier(
            &schema,
            "/toaster:nodes/node[id='n1']",
        )
        .unwrap();
        let input = NormalizedNode::container(
            QName::new(REMOTE_NS, None, "input"),
            vec![NormalizedNode::leaf(
                QName::new(REMOTE_NS, None, "path"),
                Value::InstanceIdentifier(path),
            )],
        );
        let streams = Streams::default();

        let first = subscribe(&target, Some(&input), &config, &streams).unwrap();
        let name = first.leaf_value("stream-name").cloned().unwrap();
        assert_eq!(name, Value::String("toaster:nodes/node=n1".into()));
        assert_eq!(first.name().local_name(), "output");

        let second = subscribe(&target, Some(&input), &config, &streams).unwrap();
        assert_eq!(second.leaf_value("stream-name"), Some(&name));
        assert_eq!(streams.stream_names().len(), 1);
    }

    #[test]
    fn test_subscribe_rejects_whole_list() {
        let schema = Arc::new(local_schema());
        let target = RpcResolver::new(&schema, "yang-ext:mount")
            .resolve("sal-remote:create-data-change-event-subscription")
            .unwrap();
        let path = crate::instance_id::parse_instance_identifier(&schema, "/toaster:nodes/node")
            .unwrap();
        let input = NormalizedNode::container(
            QName::new(REMOTE_NS, None, "input"),
            vec![NormalizedNode::leaf(
                QName::new(REMOTE_NS, None, "path"),
                Value::InstanceIdentifier(path),
            )],
        );
        let streams = Streams::default();
        assert!(subscribe(&target, Some(&input), &SubscriptionConfig::default(), &streams).is_err());
        assert!(subscribe(&target, None, &SubscriptionConfig::default(), &streams).is_err());
    }
}
