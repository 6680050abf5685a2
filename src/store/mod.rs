//! Coordination store abstraction
//!
//! The registry and the config source only talk to the remote store through
//! the [`Store`] trait:
//! - ranged `get` with an optional stale (serializable) read
//! - `put` with an optional lease attachment, `delete`
//! - lease `grant` and a single `keep_alive_once` renewal
//! - prefix `watch` yielding batches of put/delete events, where delete events
//!   carry the pre-deletion value
//!
//! Implementations:
//! - [`MemStore`]: in-process store, used for embedded deployments and tests
//! - `EtcdStore`: remote etcd cluster (cargo feature `etcd`)

mod mem_store;
pub use mem_store::*;

#[cfg(feature = "etcd")]
mod etcd_store;
#[cfg(feature = "etcd")]
pub use etcd_store::*;


use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::Error;
use crate::Result;

/// Store-side liveness handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaseId(pub i64);

impl fmt::Display for LeaseId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A stored key with its revision bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
    /// Lease the key is attached to, if any
    pub lease: Option<LeaseId>,
    /// Revision of the last creation of this key
    pub create_revision: i64,
    /// Revision of the last modification of this key
    pub mod_revision: i64,
    /// Number of writes since creation
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

/// One raw mutation reported by a store watch
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub event_type: EventType,
    /// Key after the mutation; for deletes only key and revision are meaningful
    pub kv: KeyValue,
    /// Value the key held right before the mutation
    pub prev_kv: Option<KeyValue>,
}

impl StoreEvent {
    /// Put that created the key
    pub fn is_create(&self) -> bool {
        self.event_type == EventType::Put && self.kv.create_revision == self.kv.mod_revision
    }

    /// Put that overwrote an existing key
    pub fn is_modify(&self) -> bool {
        self.event_type == EventType::Put && self.kv.create_revision != self.kv.mod_revision
    }
}

/// A batch delivered on a watch subscription
#[derive(Debug, Clone, Default)]
pub struct WatchResponse {
    pub events: Vec<StoreEvent>,
    /// The store canceled the subscription (compaction, shutdown, ...)
    pub canceled: bool,
    /// Reason attached to a failed or canceled batch
    pub error: Option<String>,
    pub compact_revision: i64,
}

impl WatchResponse {
    pub fn from_events(events: Vec<StoreEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn canceled(reason: impl Into<String>) -> Self {
        Self {
            canceled: true,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Terminal error carried by this batch, if any
    pub fn err(&self) -> Option<Error> {
        match (&self.error, self.canceled) {
            (Some(reason), _) => Some(Error::WatchTerminated(reason.clone())),
            (None, true) => Some(Error::WatchTerminated("watch canceled by store".to_string())),
            (None, false) => None,
        }
    }
}

/// Receiving side of one watch subscription. Closed when the store resets it.
pub type WatchStream = mpsc::UnboundedReceiver<WatchResponse>;

/// Range options for [`Store::get`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Match every key starting with the given key
    pub prefix: bool,
    /// Allow a stale read served by any member
    pub serializable: bool,
}

impl GetOptions {
    pub fn with_prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn with_serializable(mut self) -> Self {
        self.serializable = true;
        self
    }
}

/// Remote coordination store protocol
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Fetches a key, or every key under a prefix, ordered by key.
    async fn get(
        &self,
        key: &str,
        options: GetOptions,
    ) -> Result<Vec<KeyValue>>;

    /// Writes a key, attaching it to `lease` when given.
    ///
    /// # Errors
    /// - [`Error::LeaseNotFound`] if the lease expired or never existed
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> Result<()>;

    /// Removes a key. Deleting a missing key succeeds.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<()>;

    /// Grants a new lease expiring after `ttl_secs` without renewal.
    async fn grant(
        &self,
        ttl_secs: i64,
    ) -> Result<LeaseId>;

    /// Renews a lease once.
    ///
    /// # Errors
    /// - [`Error::LeaseNotFound`] if the lease is unknown to the store
    async fn keep_alive_once(
        &self,
        lease: LeaseId,
    ) -> Result<()>;

    /// Opens one subscription on `key` (or every key under it when `prefix`).
    ///
    /// Delete events carry the pre-deletion value in `prev_kv`.
    async fn watch(
        &self,
        key: &str,
        prefix: bool,
    ) -> Result<WatchStream>;

    /// Releases the connection. Later calls fail with [`Error::Unavailable`].
    async fn close(&self) -> Result<()>;

    /// Backend name used in logs
    fn name(&self) -> &'static str;
}
