//! RESTCONF request engine
//!
//! Transport-agnostic entry point tying path resolution, normalization, RPC
//! dispatch, read projection and listings together. Plug it into any HTTP
//! server: the transport decodes the body into a [`PayloadNode`], calls one
//! operation and renders the returned tree or error.
//!
//! Every operation takes exactly one schema snapshot and uses it for the
//! whole request, so a concurrent reload never yields a mixed view.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::{CommitStatus, DataBroker, LogicalDatastore, StreamRegistry};
use crate::config::EngineConfig;
use crate::error::{RestconfError, Result};
use crate::instance_id::{InstanceIdentifierContext, InstancePath, PathResolver};
use crate::listing::{Listings, OperationsListing, parse_module_identifier};
use crate::mount::{MountPoint, MountRegistry};
use crate::normalized::NormalizedNode;
use crate::normalizer::Normalizer;
use crate::payload::{PayloadContent, PayloadNode};
use crate::projection::{parse_depth, project};
use crate::qname::{QName, format_revision};
use crate::rpc::{RpcBinding, RpcResolver, RpcService, subscribe};
use crate::schema::{NodeKind, SchemaContext, SchemaHandle};

/// Namespace of the `data` element wrapping a whole mounted data tree
pub const NETCONF_BASE_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Local name of the element wrapping a whole mounted data tree
pub const DATA_ROOT: &str = "data";

/// Successful outcome of a configuration write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Replaced or deleted
    Ok,
    /// Created
    NoContent,
    /// Handed to the store, which has not reported a status yet
    Accepted,
}

impl WriteOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            WriteOutcome::Ok => 200,
            WriteOutcome::NoContent => 204,
            WriteOutcome::Accepted => 202,
        }
    }
}

/// Main RESTCONF engine
///
/// # Example
/// ```ignore
/// let schema = Arc::new(SchemaHandle::new(SchemaContext::from_file("bundle.json")?));
/// let restconf = Restconf::new(EngineConfig::default(), schema).with_broker(broker);
/// let data = restconf.read_config("ietf-interfaces:interfaces", Some("2")).await?;
/// ```
pub struct Restconf {
    config: EngineConfig,
    schema: Arc<SchemaHandle>,
    broker: Option<Arc<dyn DataBroker>>,
    rpc_service: Option<Arc<dyn RpcService>>,
    mounts: Option<Arc<dyn MountRegistry>>,
    streams: Option<Arc<dyn StreamRegistry>>,
}

impl std::fmt::Debug for Restconf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restconf")
            .field("config", &self.config)
            .field("broker", &self.broker.is_some())
            .field("rpc_service", &self.rpc_service.is_some())
            .field("mounts", &self.mounts.is_some())
            .field("streams", &self.streams.is_some())
            .finish_non_exhaustive()
    }
}

impl Restconf {
    /// Create an engine without any collaborators attached
    pub fn new(config: EngineConfig, schema: Arc<SchemaHandle>) -> Self {
        Self {
            config,
            schema,
            broker: None,
            rpc_service: None,
            mounts: None,
            streams: None,
        }
    }

    /// Local data store
    pub fn with_broker(mut self, broker: Arc<dyn DataBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Local RPC executor
    pub fn with_rpc_service(mut self, service: Arc<dyn RpcService>) -> Self {
        self.rpc_service = Some(service);
        self
    }

    pub fn with_mounts(mut self, mounts: Arc<dyn MountRegistry>) -> Self {
        self.mounts = Some(mounts);
        self
    }

    pub fn with_streams(mut self, streams: Arc<dyn StreamRegistry>) -> Self {
        self.streams = Some(streams);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle used to publish reloaded schemas
    pub fn schema_handle(&self) -> &Arc<SchemaHandle> {
        &self.schema
    }

    fn path_resolver<'a>(&'a self, schema: &'a Arc<SchemaContext>) -> PathResolver<'a> {
        let resolver = PathResolver::new(schema, &self.config.mount_marker);
        match self.mounts.as_deref() {
            Some(mounts) => resolver.with_mounts(mounts),
            None => resolver,
        }
    }

    fn normalizer<'a>(&self, schema: &'a SchemaContext) -> Normalizer<'a> {
        Normalizer::new(schema).accept_module_name_hint(self.config.accept_module_name_hint)
    }

    /// Resolve an identifier against the current schema
    pub fn resolve_path(&self, identifier: &str) -> Result<InstanceIdentifierContext> {
        let schema = self.schema.snapshot();
        self.path_resolver(&schema).resolve(identifier)
    }

    /// Normalize `payload` for the node `target` denotes.
    ///
    /// For the data root or a mount root the payload must be a top-level
    /// data node of the (mounted) schema.
    pub fn normalize(
        &self,
        payload: PayloadNode,
        target: &InstanceIdentifierContext,
    ) -> Result<NormalizedNode> {
        let normalizer = self.normalizer(target.schema());
        match target.schema_node() {
            Some(id) => normalizer.normalize(payload, id),
            None => normalizer
                .normalize_child(payload, None)
                .map(|(_, normalized)| normalized),
        }
    }

    fn broker_for<'a>(
        &'a self,
        mount: Option<&'a Arc<dyn MountPoint>>,
    ) -> Result<&'a dyn DataBroker> {
        match mount {
            Some(point) => point
                .broker()
                .ok_or_else(|| RestconfError::ServiceUnavailable("mounted data broker".into())),
            None => self
                .broker
                .as_deref()
                .ok_or_else(|| RestconfError::ServiceUnavailable("data broker".into())),
        }
    }

    // ---- RPC ----

    /// Invoke the RPC named by `identifier`.
    ///
    /// Returns the RPC output, or `None` when the RPC declares no output or
    /// the executor returned none.
    pub async fn invoke_rpc(
        &self,
        identifier: &str,
        payload: Option<PayloadNode>,
    ) -> Result<Option<NormalizedNode>> {
        let schema = self.schema.snapshot();
        let mut resolver = RpcResolver::new(&schema, &self.config.mount_marker);
        if let Some(mounts) = self.mounts.as_deref() {
            resolver = resolver.with_mounts(mounts);
        }
        let target = resolver.resolve(identifier)?;
        let normalizer = self.normalizer(target.schema());

        if target.is_subscription(&self.config.subscription) {
            let input = match (target.input(), payload) {
                (Some(id), Some(payload)) => normalizer.normalize(payload, id)?,
                (_, None) => return Err(RestconfError::MissingInput),
                (None, Some(_)) => return Err(RestconfError::UnexpectedInput),
            };
            let streams = self
                .streams
                .as_deref()
                .ok_or_else(|| RestconfError::ServiceUnavailable("stream registry".into()))?;
            return subscribe(&target, Some(&input), &self.config.subscription, streams)
                .map(Some);
        }

        target.validate_input(payload.as_ref())?;
        let input = match (target.input(), payload) {
            (Some(id), Some(payload)) => Some(normalizer.normalize(payload, id)?),
            _ => None,
        };

        let service: &dyn RpcService = match target.binding() {
            RpcBinding::Local => self
                .rpc_service
                .as_deref()
                .ok_or_else(|| RestconfError::ServiceUnavailable("rpc service".into()))?,
            RpcBinding::Mounted(point) => point
                .rpc_service()
                .ok_or_else(|| RestconfError::ServiceUnavailable("mounted rpc service".into()))?,
        };
        debug!(rpc = %target.qname(), mounted = target.binding().is_mounted(), "invoking rpc");
        let output = service.invoke(target.qname(), input).await?.into_output()?;

        if target.output().is_none() {
            return Ok(None);
        }
        Ok(output)
    }

    /// Invoke an RPC whose request carried a raw body instead of a payload
    pub async fn invoke_rpc_without_payload(
        &self,
        identifier: &str,
        body: &str,
    ) -> Result<Option<NormalizedNode>> {
        if !body.trim().is_empty() {
            return Err(RestconfError::UnexpectedContent);
        }
        self.invoke_rpc(identifier, None).await
    }

    // ---- Data ----

    /// Read configuration data; `depth` is the raw query parameter
    pub async fn read_config(
        &self,
        identifier: &str,
        depth: Option<&str>,
    ) -> Result<Option<NormalizedNode>> {
        self.read(LogicalDatastore::Configuration, identifier, depth)
            .await
    }

    /// Read operational data; `depth` is the raw query parameter
    pub async fn read_operational(
        &self,
        identifier: &str,
        depth: Option<&str>,
    ) -> Result<Option<NormalizedNode>> {
        self.read(LogicalDatastore::Operational, identifier, depth)
            .await
    }

    async fn read(
        &self,
        datastore: LogicalDatastore,
        identifier: &str,
        depth: Option<&str>,
    ) -> Result<Option<NormalizedNode>> {
        let depth = match depth {
            Some(raw) => parse_depth(Some(raw))?,
            None => self.config.default_depth,
        };
        let schema = self.schema.snapshot();
        let target = self.path_resolver(&schema).resolve(identifier)?;
        let broker = self.broker_for(target.mount_point())?;

        debug!(?datastore, path = %target.path(), ?depth, "reading data");
        let data = broker.read(datastore, target.path()).await?;
        Ok(data.map(|tree| project(tree, depth)))
    }

    /// Create or replace the configuration at `identifier`
    pub async fn put_config(
        &self,
        identifier: &str,
        payload: Option<PayloadNode>,
    ) -> Result<WriteOutcome> {
        let payload = payload.ok_or(RestconfError::MissingInput)?;
        let schema = self.schema.snapshot();
        let target = self.path_resolver(&schema).resolve(identifier)?;
        let data = self.normalize(payload, &target)?;

        let broker = self.broker_for(target.mount_point())?;
        let status = broker.commit_put(target.path(), data).await?;
        commit_outcome("updating", target.path(), status, WriteOutcome::Ok)
    }

    /// Create configuration below `identifier` (the data root when `None`).
    ///
    /// The payload root must carry a namespace or module-name hint. The
    /// created node's path is the parent path extended with the payload
    /// root, keyed by its list keys. A `data` root in the NETCONF base
    /// namespace holds a whole mounted tree and is posted to the mount
    /// point attached at `identifier`.
    pub async fn post_config(
        &self,
        identifier: Option<&str>,
        payload: Option<PayloadNode>,
    ) -> Result<WriteOutcome> {
        let payload = payload.ok_or(RestconfError::MissingInput)?;
        let Some(hint) = payload.namespace().map(str::to_string) else {
            return Err(RestconfError::BadFormat(
                "Root element node must have namespace (XML format) or module name (JSON format)"
                    .into(),
            ));
        };
        let schema = self.schema.snapshot();
        let resolver = self.path_resolver(&schema);
        let marker = self.config.mount_marker.as_str();

        let (target, path, data) = if payload.local_name() == DATA_ROOT
            && hint == NETCONF_BASE_NAMESPACE
        {
            let identifier = identifier.unwrap_or_default().trim_end_matches('/');
            if identifier.ends_with(marker) {
                return Err(RestconfError::BadFormat(format!(
                    "URI should be without \"{}\" for POST operation",
                    marker
                )));
            }
            let target = resolver.resolve(&format!("{}/{}", identifier, marker))?;
            let data = self.normalize_mount_root(payload, target.schema())?;
            let path = target.path().clone();
            (target, path, data)
        } else {
            let target = resolver.resolve(identifier.unwrap_or_default())?;
            let module = target
                .schema()
                .module_by_namespace(&hint)
                .or_else(|| target.schema().module_by_name(&hint))
                .ok_or_else(|| RestconfError::UnknownNamespace(hint.clone()))?;
            debug!(module = module.name(), "post payload module");

            let (id, data) = self
                .normalizer(target.schema())
                .normalize_child(payload, target.schema_node())?;
            let node = target.schema().node(id);
            let mut path = target.path().clone();
            match node.kind() {
                NodeKind::List { .. } => path.push_entry(node.qname().clone(), data.keys().to_vec()),
                _ => path.push_node(node.qname().clone()),
            }
            (target, path, data)
        };

        let broker = self.broker_for(target.mount_point())?;
        let status = broker.commit_post(&path, data).await?;
        commit_outcome("creating", &path, status, WriteOutcome::NoContent)
    }

    /// Normalize a `data` wrapper whose children are top-level nodes of `schema`
    fn normalize_mount_root(
        &self,
        payload: PayloadNode,
        schema: &SchemaContext,
    ) -> Result<NormalizedNode> {
        let normalizer = self.normalizer(schema);
        let children = match payload.into_parts().2 {
            PayloadContent::Composite(children) => children,
            _ => Vec::new(),
        };
        let children = children
            .into_iter()
            .map(|child| {
                normalizer
                    .normalize_child(child, None)
                    .map(|(_, normalized)| normalized)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NormalizedNode::container(
            QName::new(NETCONF_BASE_NAMESPACE, None, DATA_ROOT),
            children,
        ))
    }

    /// Delete the configuration at `identifier`
    pub async fn delete_config(&self, identifier: &str) -> Result<WriteOutcome> {
        let schema = self.schema.snapshot();
        let target = self.path_resolver(&schema).resolve(identifier)?;
        let broker = self.broker_for(target.mount_point())?;
        let status = broker.commit_delete(target.path()).await?;
        commit_outcome("deleting", target.path(), status, WriteOutcome::Ok)
    }

    // ---- Listings ----

    fn listings(&self) -> Listings<'_> {
        Listings::new(&self.config.restconf_module)
    }

    /// Schema of the mount point `identifier` ends at
    fn mounted_schema(
        &self,
        schema: &Arc<SchemaContext>,
        identifier: &str,
    ) -> Result<Arc<SchemaContext>> {
        let marker = self.config.mount_marker.as_str();
        if !identifier.trim_end_matches('/').ends_with(marker) {
            return Err(RestconfError::BadFormat(format!(
                "URI has bad format. If modules behind mount point should be showed, URI has to end with {}",
                marker
            )));
        }
        let target = self.path_resolver(schema).resolve(identifier)?;
        Ok(Arc::clone(target.schema()))
    }

    /// Modules of the local schema
    pub fn list_modules(&self) -> NormalizedNode {
        self.listings().modules(&self.schema.snapshot())
    }

    /// Modules of the mount point `identifier` ends at
    pub fn list_modules_at(&self, identifier: &str) -> Result<NormalizedNode> {
        let schema = self.schema.snapshot();
        let mounted = self.mounted_schema(&schema, identifier)?;
        Ok(self.listings().modules(&mounted))
    }

    /// One module entry, addressed as `[<mount>/yang-ext:mount/]name/yyyy-MM-dd`
    pub fn module(&self, identifier: &str) -> Result<NormalizedNode> {
        let marker = self.config.mount_marker.as_str();
        let (name, revision) = parse_module_identifier(identifier, marker)?;

        let mut schema = self.schema.snapshot();
        if let Some(index) = identifier.find(marker) {
            schema = self.mounted_schema(&schema, &identifier[..index + marker.len()])?;
        }
        let module = schema
            .module_by_name_and_revision(&name, Some(revision))
            .ok_or_else(|| RestconfError::UnknownModule {
                name: name.clone(),
                revision: Some(format_revision(revision)),
            })?;
        Ok(self.listings().module_entry(module))
    }

    /// RPCs of the local schema
    pub fn list_operations(&self) -> OperationsListing {
        self.listings().operations(&self.schema.snapshot())
    }

    /// RPCs of the mount point `identifier` ends at
    pub fn list_operations_at(&self, identifier: &str) -> Result<OperationsListing> {
        let schema = self.schema.snapshot();
        let mounted = self.mounted_schema(&schema, identifier)?;
        Ok(self.listings().operations(&mounted))
    }

    /// Registered notification streams
    pub fn list_streams(&self) -> Result<NormalizedNode> {
        let streams = self
            .streams
            .as_deref()
            .ok_or_else(|| RestconfError::ServiceUnavailable("stream registry".into()))?;
        Ok(self.listings().streams(streams.stream_names()))
    }
}

fn commit_outcome(
    operation: &str,
    path: &InstancePath,
    status: CommitStatus,
    committed: WriteOutcome,
) -> Result<WriteOutcome> {
    match status {
        CommitStatus::Committed => {
            debug!(operation, path = %path, "committed");
            Ok(committed)
        }
        CommitStatus::Accepted => {
            debug!(operation, path = %path, "commit accepted");
            Ok(WriteOutcome::Accepted)
        }
        CommitStatus::Failed(message) => {
            warn!(operation, path = %path, message = message.as_str(), "commit failed");
            Err(RestconfError::DataStore {
                operation: operation.to_string(),
                message,
            })
        }
    }
}
