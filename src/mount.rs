//! Mount point collaborators
//!
//! A mount point stands for a remote managed device reachable through a
//! local instance path. It carries its own schema and, when the device
//! offers them, a data broker and an RPC service.

use std::sync::Arc;

use crate::broker::DataBroker;
use crate::instance_id::InstancePath;
use crate::rpc::RpcService;
use crate::schema::SchemaContext;

/// Handle to a mounted device
pub trait MountPoint: Send + Sync {
    /// Schema snapshot of the mounted device
    fn schema(&self) -> Arc<SchemaContext>;

    fn broker(&self) -> Option<&dyn DataBroker>;

    fn rpc_service(&self) -> Option<&dyn RpcService>;
}

/// Registry of mount points, owned outside the engine
pub trait MountRegistry: Send + Sync {
    /// Mount point attached at exactly `path`
    fn lookup(&self, path: &InstancePath) -> Option<Arc<dyn MountPoint>>;
}
