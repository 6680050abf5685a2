//! Coordination Layer Error Hierarchy
//!
//! Defines the error types surfaced by the store protocol, the service
//! registry and the configuration source, categorized by how callers are
//! expected to react to them.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::store::LeaseId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an unusable request (e.g. a service without nodes)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No key matched a registry or config lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store unreachable or refused the call
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Per-call deadline elapsed before the store answered
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Lease expired or was revoked on the store side.
    ///
    /// Used as a control signal during renewal, never returned by `register`.
    #[error("Lease {0} not found")]
    LeaseNotFound(LeaseId),

    /// Watch stream closed, compacted or canceled by the store
    #[error("Watch terminated: {0}")]
    WatchTerminated(String),

    /// Watcher was stopped by its owner
    #[error("watcher stopped")]
    WatcherStopped,

    /// Stored payload could not be decoded
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// Structured document could not be encoded
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Some nodes of a service failed to register
    #[error("{} of the service nodes failed to register", failures.len())]
    PartialRegistration { failures: Vec<NodeFailure> },

    /// Settings validation or loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// A node that could not be registered, with the reason.
#[derive(Debug)]
pub struct NodeFailure {
    pub node_id: String,
    pub error: Error,
}

impl Error {
    /// Store connectivity problems, including elapsed deadlines.
    ///
    /// A partial registration counts when every failed node failed this way.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::Timeout(_) => true,
            Error::PartialRegistration { failures } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_unavailable())
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Node ids that failed in a partial registration, empty otherwise.
    pub fn failed_nodes(&self) -> Vec<&str> {
        match self {
            Error::PartialRegistration { failures } => {
                failures.iter().map(|f| f.node_id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
