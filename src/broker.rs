//! Data store and stream registry collaborators
//!
//! The engine never stores data itself. Reads and commits are delegated to
//! a [`DataBroker`], either the local one or the one of a mount point.

use async_trait::async_trait;

use crate::error::Result;
use crate::instance_id::InstancePath;
use crate::normalized::NormalizedNode;

/// Which data tree a read targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalDatastore {
    Configuration,
    Operational,
}

/// Outcome reported by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Transaction was committed
    Committed,
    /// Transaction was handed off and has not reported a status yet
    Accepted,
    /// Store refused or failed the transaction
    Failed(String),
}

/// Transactional data store
#[async_trait]
pub trait DataBroker: Send + Sync {
    /// Read the subtree at `path`; `None` if nothing is stored there
    async fn read(
        &self,
        datastore: LogicalDatastore,
        path: &InstancePath,
    ) -> Result<Option<NormalizedNode>>;

    /// Create or replace the configuration at `path`
    async fn commit_put(&self, path: &InstancePath, data: NormalizedNode) -> Result<CommitStatus>;

    /// Create the configuration at `path`; fails in the store if it already exists
    async fn commit_post(&self, path: &InstancePath, data: NormalizedNode)
    -> Result<CommitStatus>;

    async fn commit_delete(&self, path: &InstancePath) -> Result<CommitStatus>;
}

/// Bookkeeping of notification streams
pub trait StreamRegistry: Send + Sync {
    /// Register a stream for `path` unless one named `name` exists; true if added
    fn register_if_absent(&self, path: &InstancePath, name: &str) -> bool;

    /// Names of all registered streams
    fn stream_names(&self) -> Vec<String>;
}
