//! rust-restconf - RESTCONF request translation engine
//!
//! This library maps RESTCONF identifiers and untyped payload trees onto a
//! YANG schema: instance paths (including paths behind mount points),
//! schema-validated data trees, RPC targets, depth-limited read results and
//! discovery listings. Data stores, RPC executors, mount points and stream
//! bookkeeping are supplied by the caller through traits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_restconf::{EngineConfig, Restconf, SchemaContext, SchemaHandle};
//!
//! // Load a pre-compiled schema bundle
//! let schema = SchemaContext::from_file("bundle.json").unwrap();
//!
//! // Create the engine
//! let restconf = Restconf::new(EngineConfig::default(), Arc::new(SchemaHandle::new(schema)));
//!
//! // Resolve a request path
//! let target = restconf.resolve_path("ietf-interfaces:interfaces/interface=eth0").unwrap();
//! println!("{}", target.path());
//! ```

pub mod broker;
mod bundle;
pub mod config;
mod error;
pub mod instance_id;
pub mod listing;
pub mod mount;
pub mod normalized;
pub mod normalizer;
pub mod payload;
pub mod projection;
pub mod qname;
pub mod restconf;
pub mod rpc;
pub mod schema;
pub mod types;

pub use broker::{CommitStatus, DataBroker, LogicalDatastore, StreamRegistry};
pub use config::EngineConfig;
pub use error::{ErrorKind, RestconfError, Result};
pub use instance_id::{InstanceIdentifierContext, InstancePath, PathArgument};
pub use mount::{MountPoint, MountRegistry};
pub use normalized::NormalizedNode;
pub use payload::PayloadNode;
pub use qname::QName;
pub use restconf::{Restconf, WriteOutcome};
pub use rpc::{RpcError, RpcResult, RpcService};
pub use schema::{SchemaContext, SchemaContextBuilder, SchemaHandle};
pub use types::{Value, YangType};
