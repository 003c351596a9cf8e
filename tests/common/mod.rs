//! Shared fixtures: schema bundles and in-memory collaborators
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_restconf::{
    CommitStatus, DataBroker, EngineConfig, InstancePath, LogicalDatastore, MountPoint,
    MountRegistry, NormalizedNode, QName, Restconf, Result, RpcResult, RpcService, SchemaContext,
    SchemaHandle, StreamRegistry, Value,
};

pub const LOCAL_BUNDLE: &str = r#"{
    "modules": [
        {
            "name": "ietf-interfaces",
            "namespace": "urn:ietf:params:xml:ns:yang:ietf-interfaces",
            "revision": "2014-05-08",
            "features": ["arbitrary-names"],
            "data": [
                {"kind": "container", "name": "interfaces", "children": [
                    {"kind": "list", "name": "interface", "keys": ["name"], "children": [
                        {"kind": "leaf", "name": "name", "type": "string"},
                        {"kind": "leaf", "name": "type", "type": "identityref"},
                        {"kind": "leaf", "name": "enabled", "type": "boolean"},
                        {"kind": "container", "name": "statistics", "children": [
                            {"kind": "leaf", "name": "in-octets", "type": "uint64"}
                        ]}
                    ]}
                ]}
            ]
        },
        {
            "name": "vendor-a",
            "namespace": "urn:vendor-a",
            "augments": [
                {"target": "/ietf-interfaces:interfaces/interface", "data": [
                    {"kind": "leaf", "name": "speed", "type": "uint32"}
                ]}
            ]
        },
        {
            "name": "vendor-b",
            "namespace": "urn:vendor-b",
            "augments": [
                {"target": "/ietf-interfaces:interfaces/interface", "data": [
                    {"kind": "leaf", "name": "speed", "type": "string"}
                ]}
            ]
        },
        {
            "name": "network-topology",
            "namespace": "urn:network-topology",
            "revision": "2013-10-21",
            "data": [
                {"kind": "container", "name": "nodes", "children": [
                    {"kind": "list", "name": "node", "keys": ["id"], "children": [
                        {"kind": "leaf", "name": "id", "type": "string"}
                    ]}
                ]}
            ]
        },
        {
            "name": "toaster",
            "namespace": "urn:toaster",
            "revision": "2009-11-20",
            "rpcs": [
                {"name": "make-toast",
                 "input": [{"kind": "leaf", "name": "doneness", "type": "uint32"}],
                 "output": [{"kind": "leaf", "name": "toast-id", "type": "string"}]},
                {"name": "cancel-toast"}
            ]
        },
        {
            "name": "sal-remote",
            "namespace": "urn:opendaylight:params:xml:ns:yang:controller:md:sal:remote",
            "revision": "2014-01-14",
            "rpcs": [
                {"name": "create-data-change-event-subscription",
                 "input": [{"kind": "leaf", "name": "path", "type": "instance-identifier"}],
                 "output": [{"kind": "leaf", "name": "stream-name", "type": "string"}]}
            ]
        }
    ]
}"#;

pub const DEVICE_BUNDLE: &str = r#"{
    "modules": [
        {
            "name": "device",
            "namespace": "urn:device",
            "revision": "2014-01-01",
            "data": [
                {"kind": "container", "name": "system", "children": [
                    {"kind": "leaf", "name": "hostname", "type": "string"}
                ]}
            ],
            "rpcs": [
                {"name": "reboot",
                 "input": [{"kind": "leaf", "name": "delay", "type": "uint32"}],
                 "output": [{"kind": "leaf", "name": "status", "type": "string"}]}
            ]
        }
    ]
}"#;

/// Identifier of the mount point attached by [`engine`]
pub const DEVICE_MOUNT: &str = "network-topology:nodes/node=d1/yang-ext:mount";

/// Data store keyed by the display form of instance paths
#[derive(Default)]
pub struct MemoryBroker {
    config: Mutex<BTreeMap<String, NormalizedNode>>,
    operational: Mutex<BTreeMap<String, NormalizedNode>>,
    /// Report every commit as accepted without applying it
    pub deferred: bool,
}

impl MemoryBroker {
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    pub fn seed(&self, datastore: LogicalDatastore, path: &str, data: NormalizedNode) {
        let store = match datastore {
            LogicalDatastore::Configuration => &self.config,
            LogicalDatastore::Operational => &self.operational,
        };
        store.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn config_paths(&self) -> Vec<String> {
        self.config.lock().unwrap().keys().cloned().collect()
    }

    pub fn config_at(&self, path: &str) -> Option<NormalizedNode> {
        self.config.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl DataBroker for MemoryBroker {
    async fn read(
        &self,
        datastore: LogicalDatastore,
        path: &InstancePath,
    ) -> Result<Option<NormalizedNode>> {
        let store = match datastore {
            LogicalDatastore::Configuration => &self.config,
            LogicalDatastore::Operational => &self.operational,
        };
        Ok(store.lock().unwrap().get(&path.to_string()).cloned())
    }

    async fn commit_put(&self, path: &InstancePath, data: NormalizedNode) -> Result<CommitStatus> {
        if self.deferred {
            return Ok(CommitStatus::Accepted);
        }
        self.config.lock().unwrap().insert(path.to_string(), data);
        Ok(CommitStatus::Committed)
    }

    async fn commit_post(
        &self,
        path: &InstancePath,
        data: NormalizedNode,
    ) -> Result<CommitStatus> {
        if self.deferred {
            return Ok(CommitStatus::Accepted);
        }
        let mut config = self.config.lock().unwrap();
        let key = path.to_string();
        if config.contains_key(&key) {
            return Ok(CommitStatus::Failed("data already exists".into()));
        }
        config.insert(key, data);
        Ok(CommitStatus::Committed)
    }

    async fn commit_delete(&self, path: &InstancePath) -> Result<CommitStatus> {
        if self.deferred {
            return Ok(CommitStatus::Accepted);
        }
        match self.config.lock().unwrap().remove(&path.to_string()) {
            Some(_) => Ok(CommitStatus::Committed),
            None => Ok(CommitStatus::Failed("data is missing".into())),
        }
    }
}

/// RPC executor answering `make-toast` and `reboot`, failing everything else
#[derive(Default)]
pub struct RecordingRpc {
    calls: Mutex<Vec<(QName, Option<NormalizedNode>)>>,
}

impl RecordingRpc {
    pub fn calls(&self) -> Vec<(QName, Option<NormalizedNode>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcService for RecordingRpc {
    async fn invoke(&self, rpc: &QName, input: Option<NormalizedNode>) -> Result<RpcResult> {
        self.calls.lock().unwrap().push((rpc.clone(), input));
        let output = |leaf: &str, value: &str| {
            NormalizedNode::container(
                rpc.sibling("output"),
                vec![NormalizedNode::leaf(rpc.sibling(leaf), Value::String(value.into()))],
            )
        };
        match rpc.local_name() {
            "make-toast" => Ok(RpcResult::success(Some(output("toast-id", "toast-1")))),
            "reboot" => Ok(RpcResult::success(Some(output("status", "rebooting")))),
            _ => Ok(RpcResult::failed(Vec::new())),
        }
    }
}

/// Mounted device with its own schema, store and RPC executor
pub struct Device {
    pub schema: Arc<SchemaContext>,
    pub broker: MemoryBroker,
    pub rpc: RecordingRpc,
}

impl Device {
    pub fn new() -> Self {
        Self {
            schema: Arc::new(DEVICE_BUNDLE.parse().unwrap()),
            broker: MemoryBroker::default(),
            rpc: RecordingRpc::default(),
        }
    }
}

impl MountPoint for Device {
    fn schema(&self) -> Arc<SchemaContext> {
        Arc::clone(&self.schema)
    }

    fn broker(&self) -> Option<&dyn DataBroker> {
        Some(&self.broker)
    }

    fn rpc_service(&self) -> Option<&dyn RpcService> {
        Some(&self.rpc)
    }
}

/// Mount points keyed by the display form of their local path
#[derive(Default)]
pub struct Mounts(HashMap<String, Arc<dyn MountPoint>>);

impl Mounts {
    pub fn attach(&mut self, path: &str, point: Arc<dyn MountPoint>) {
        self.0.insert(path.to_string(), point);
    }
}

impl MountRegistry for Mounts {
    fn lookup(&self, path: &InstancePath) -> Option<Arc<dyn MountPoint>> {
        self.0.get(&path.to_string()).cloned()
    }
}

#[derive(Default)]
pub struct Streams {
    registered: Mutex<HashMap<String, InstancePath>>,
    pub registrations: Mutex<usize>,
}

impl StreamRegistry for Streams {
    fn register_if_absent(&self, path: &InstancePath, name: &str) -> bool {
        let mut registered = self.registered.lock().unwrap();
        if registered.contains_key(name) {
            return false;
        }
        registered.insert(name.to_string(), path.clone());
        *self.registrations.lock().unwrap() += 1;
        true
    }

    fn stream_names(&self) -> Vec<String> {
        self.registered.lock().unwrap().keys().cloned().collect()
    }
}

/// Collaborators wired into an engine, kept for inspection
pub struct Fixture {
    pub restconf: Restconf,
    pub broker: Arc<MemoryBroker>,
    pub rpc: Arc<RecordingRpc>,
    pub device: Arc<Device>,
    pub streams: Arc<Streams>,
}

pub fn engine() -> Fixture {
    engine_with(EngineConfig::default(), MemoryBroker::default())
}

pub fn engine_with(config: EngineConfig, broker: MemoryBroker) -> Fixture {
    let schema: SchemaContext = LOCAL_BUNDLE.parse().unwrap();
    let broker = Arc::new(broker);
    let rpc = Arc::new(RecordingRpc::default());
    let device = Arc::new(Device::new());
    let streams = Arc::new(Streams::default());

    let mut mounts = Mounts::default();
    mounts.attach("/nodes/node[id='d1']", device.clone());

    let restconf = Restconf::new(config, Arc::new(SchemaHandle::new(schema)))
        .with_broker(broker.clone())
        .with_rpc_service(rpc.clone())
        .with_mounts(Arc::new(mounts))
        .with_streams(streams.clone());

    Fixture {
        restconf,
        broker,
        rpc,
        device,
        streams,
    }
}
