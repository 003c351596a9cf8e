//! Error types for rust-restconf

use thiserror::Error;

use crate::rpc::RpcError;

/// Coarse classification of a failure, independent of the concrete variant.
///
/// Every request-level error falls into one of the first five kinds.
/// `Internal` is only produced while loading configuration or schema bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or unexpected input, bad query parameter, illegal identifier shape
    MalformedRequest,
    /// Identifier segment, module, namespace or RPC not present in the schema
    UnknownElement,
    /// A local name matched several augmenting schema nodes without a hint
    AmbiguousElement,
    /// Namespace mismatch, missing list key, unparsable scalar
    InvalidValue,
    /// A downstream executor or data store reported failure
    OperationFailed,
    /// Configuration or schema bundle could not be loaded
    Internal,
}

/// Main error type for restconf operations
#[derive(Debug, Error)]
pub enum RestconfError {
    /// Operation requires a payload but none was supplied
    #[error("Input is required.")]
    MissingInput,

    /// Operation declares no input but a payload was supplied
    #[error("No input expected.")]
    UnexpectedInput,

    /// Body of a payload-less RPC invocation was not blank
    #[error("Content must be empty.")]
    UnexpectedContent,

    /// Depth query parameter is not a positive integer or "unbounded"
    #[error("Invalid depth parameter: {0}. The depth parameter must be an integer >= 1 or \"unbounded\"")]
    InvalidDepth(String),

    /// RPC identifier contains a raw path separator
    #[error("Identifier \"{0}\" can't contain slash character (/). If slash is part of identifier name then use %2F placeholder.")]
    IllegalSeparator(String),

    /// Identifier or payload does not have the expected shape
    #[error("Bad format: {0}")]
    BadFormat(String),

    /// A path segment or payload node has no matching schema node
    #[error("Schema node \"{0}\" does not exist in yang schema")]
    SchemaNodeNotFound(String),

    /// Identifier ends with a mount marker but carries no mounted path
    #[error("Identifier \"{0}\" ends with a mount point marker but has no mounted path")]
    MissingMountedPath(String),

    /// No mount point is registered at the given path
    #[error("Mount point \"{0}\" does not exist")]
    MountPointNotFound(String),

    /// Module lookup by name (and revision) failed
    #[error("Module with name '{name}' and revision '{}' was not found", .revision.as_deref().unwrap_or("none"))]
    UnknownModule {
        name: String,
        revision: Option<String>,
    },

    /// Namespace hint does not resolve to a loaded module
    #[error("Module was not found for namespace or module name \"{0}\"")]
    UnknownNamespace(String),

    /// RPC lookup failed
    #[error("RPC \"{0}\" does not exist")]
    UnknownRpc(String),

    /// Local name matches several augmenting nodes and no namespace hint was supplied
    #[error(
        "Node \"{name}\" is added as augment from more than one module. Therefore node must have namespace (XML format) or module name (JSON format). Candidate namespaces: {}",
        .candidates.join(", ")
    )]
    AmbiguousAugmentation {
        name: String,
        candidates: Vec<String>,
    },

    /// Supplied namespace hint does not denote the resolved schema node's module
    #[error("Namespace \"{supplied}\" of node \"{name}\" does not match \"{expected}\"")]
    NamespaceMismatch {
        name: String,
        expected: String,
        supplied: String,
    },

    /// A list entry lacks one of its declared keys
    #[error("Missing key \"{key}\" of list \"{list}\"")]
    MissingListKey { key: String, list: String },

    /// Identifier supplies the wrong number of key values for a list
    #[error("List \"{list}\" declares {expected} key(s) but {actual} value(s) were supplied")]
    KeyCountMismatch {
        list: String,
        expected: usize,
        actual: usize,
    },

    /// A scalar could not be converted to its declared type
    #[error("Invalid value for \"{name}\": {message}")]
    InvalidValue { name: String, message: String },

    /// Executor reported failure with detail
    #[error("Operation failed: {}", .errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
    OperationFailed { errors: Vec<RpcError> },

    /// Executor reported failure without any detail
    #[error("The operation was not successful and there were no RPC errors returned")]
    OperationFailedNoDetail,

    /// No collaborator is attached to serve the request
    #[error("{0} is not available")]
    ServiceUnavailable(String),

    /// Data store rejected or failed a request
    #[error("Error {operation} data: {message}")]
    DataStore { operation: String, message: String },

    /// Schema bundle is inconsistent
    #[error("Invalid schema bundle: {0}")]
    InvalidBundle(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestconfError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use RestconfError::*;
        match self {
            MissingInput | UnexpectedInput | UnexpectedContent | InvalidDepth(_)
            | IllegalSeparator(_) | BadFormat(_) => ErrorKind::MalformedRequest,
            SchemaNodeNotFound(_)
            | MissingMountedPath(_)
            | MountPointNotFound(_)
            | UnknownModule { .. }
            | UnknownNamespace(_)
            | UnknownRpc(_) => ErrorKind::UnknownElement,
            AmbiguousAugmentation { .. } => ErrorKind::AmbiguousElement,
            NamespaceMismatch { .. }
            | MissingListKey { .. }
            | KeyCountMismatch { .. }
            | InvalidValue { .. } => ErrorKind::InvalidValue,
            OperationFailed { .. }
            | OperationFailedNoDetail
            | ServiceUnavailable(_)
            | DataStore { .. } => ErrorKind::OperationFailed,
            InvalidBundle(_) | Io(_) | Json(_) => ErrorKind::Internal,
        }
    }

    /// RESTCONF `error-tag` for this error
    pub fn error_tag(&self) -> &'static str {
        match self {
            Self::MissingInput | Self::UnexpectedInput => "malformed-message",
            Self::UnknownNamespace(_) => "unknown-namespace",
            Self::ServiceUnavailable(_) => "operation-not-supported",
            _ => match self.kind() {
                ErrorKind::MalformedRequest
                | ErrorKind::AmbiguousElement
                | ErrorKind::InvalidValue => "invalid-value",
                ErrorKind::UnknownElement => "unknown-element",
                ErrorKind::OperationFailed | ErrorKind::Internal => "operation-failed",
            },
        }
    }

    /// HTTP status the transport should answer with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::MalformedRequest
            | ErrorKind::UnknownElement
            | ErrorKind::AmbiguousElement
            | ErrorKind::InvalidValue => 400,
            ErrorKind::OperationFailed | ErrorKind::Internal => 500,
        }
    }

    pub(crate) fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for restconf operations
pub type Result<T> = std::result::Result<T, RestconfError>;
