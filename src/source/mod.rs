//! Configuration sources
//!
//! A [`Source`] produces [`ChangeSet`]s: checksummed snapshots of the whole
//! configuration document in one encoding. [`KvSource`] folds every key under
//! a store prefix into a nested [`Document`] and keeps it current by patching
//! it with each watch event.

mod document;
mod encoder;
mod kv_source;
mod watcher;
pub use document::*;
pub use encoder::*;
pub use kv_source::*;
pub use watcher::*;

#[cfg(test)]
mod document_test;

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::utils::checksum;
use crate::Result;

/// Snapshot of configuration data from one source.
///
/// Two change-sets are equal when their checksums match.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub data: Bytes,
    /// Hex SHA-256 of `data`
    pub checksum: String,
    /// Encoding of `data`, e.g. `json`
    pub format: String,
    /// Name of the source that produced it
    pub source: String,
    pub timestamp: SystemTime,
}

impl ChangeSet {
    /// Stamps `data` with its checksum and the current time.
    pub fn new(
        data: Bytes,
        format: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let checksum = checksum(&data);
        Self {
            data,
            checksum,
            format: format.into(),
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Checksum recomputed from `data`
    pub fn sum(&self) -> String {
        checksum(&self.data)
    }
}

impl PartialEq for ChangeSet {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.checksum == other.checksum
    }
}

impl Eq for ChangeSet {}

#[async_trait]
pub trait Source: Send + Sync {
    /// Full snapshot of the source.
    ///
    /// # Errors
    /// - [`crate::Error::NotFound`] if the source holds no data
    async fn read(&self) -> Result<ChangeSet>;

    /// Reads a baseline, then follows changes from there.
    async fn watch(&self) -> Result<Box<dyn SourceWatcher>>;

    /// Stores a change-set. Read-only sources accept and ignore it.
    async fn write(
        &self,
        change_set: &ChangeSet,
    ) -> Result<()>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait SourceWatcher: Send {
    /// Waits for the next change-set.
    ///
    /// # Errors
    /// - [`crate::Error::WatcherStopped`] once stopped
    async fn next(&mut self) -> Result<ChangeSet>;

    async fn stop(&mut self) -> Result<()>;
}
