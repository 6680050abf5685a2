use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::ChangeSet;
use super::SourceInner;
use super::SourceWatcher;
use crate::config::WatchConfig;
use crate::metrics::CONFIG_FALLBACK_READS;
use crate::store::EventType;
use crate::store::StoreEvent;
use crate::store::WatchStream;
use crate::watch::WatchClient;
use crate::watch::WatchHandler;
use crate::watch::WatchTask;
use crate::Error;
use crate::Result;

/// Patches the latest change-set with every watch batch.
struct PatchHandler {
    inner: Arc<SourceInner>,
    baseline: Mutex<ChangeSet>,
    tx: mpsc::Sender<ChangeSet>,
    token: CancellationToken,
}

impl PatchHandler {
    /// Applies `events` to the baseline document and installs the result.
    ///
    /// Returns `None` when nothing changed, which is the case for events
    /// already contained in the baseline read.
    fn patch(
        &self,
        events: &[StoreEvent],
    ) -> Option<ChangeSet> {
        let mut baseline = self.baseline.lock();

        let mut document = match self.inner.encoder.decode(&baseline.data) {
            Ok(document) if document.is_map() => document,
            Ok(_) => {
                warn!(prefix = %self.inner.prefix, "config baseline is not a map, ignoring batch");
                return None;
            }
            Err(e) => {
                warn!(prefix = %self.inner.prefix, "config baseline did not decode: {}", e);
                return None;
            }
        };

        for event in events {
            let value = match event.event_type {
                EventType::Put => Some(self.inner.decode_value(&event.kv.value)),
                EventType::Delete => None,
            };
            document.patch(&self.inner.path(&event.kv.key), value);
        }

        match self.inner.change_set(&document) {
            Ok(change_set) if change_set == *baseline => {
                trace!(checksum = %change_set.checksum, "config unchanged by batch");
                None
            }
            Ok(change_set) => {
                *baseline = change_set.clone();
                Some(change_set)
            }
            Err(e) => {
                warn!(prefix = %self.inner.prefix, "patched config did not encode: {}", e);
                None
            }
        }
    }

    async fn reload(&self) {
        CONFIG_FALLBACK_READS.with_label_values(&[&self.inner.name]).inc();
        match self.inner.read().await {
            Ok(change_set) => {
                *self.baseline.lock() = change_set.clone();
                self.push(change_set).await;
            }
            Err(e) => {
                error!(prefix = %self.inner.prefix, "reload change set failed: {}", e);
            }
        }
    }

    async fn push(
        &self,
        change_set: ChangeSet,
    ) {
        trace!(checksum = %change_set.checksum, "config change");
        tokio::select! {
            _ = self.token.cancelled() => {}
            sent = self.tx.send(change_set) => {
                if sent.is_err() {
                    self.token.cancel();
                }
            }
        }
    }
}

#[async_trait]
impl WatchHandler for PatchHandler {
    async fn handle(
        &self,
        events: Vec<StoreEvent>,
        err: Option<Error>,
    ) {
        if !events.is_empty() {
            if let Some(change_set) = self.patch(&events) {
                self.push(change_set).await;
            }
        }

        if let Some(err) = err {
            warn!(prefix = %self.inner.prefix, "config watch failed, reading full snapshot: {}", err);
            self.reload().await;
        }
    }
}

/// Follows a key/value source, yielding a change-set per applied batch.
pub struct ConfigWatcher {
    updates: mpsc::Receiver<ChangeSet>,
    task: WatchTask,
}

impl ConfigWatcher {
    /// Follows `stream`, which must have been opened before `baseline` was read.
    pub(crate) fn start(
        inner: Arc<SourceInner>,
        baseline: ChangeSet,
        stream: WatchStream,
        config: &WatchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let token = CancellationToken::new();
        let store = inner.store.clone();
        let prefix = inner.prefix.clone();
        let handler = PatchHandler {
            inner,
            baseline: Mutex::new(baseline),
            tx,
            token: token.clone(),
        };

        let task = WatchClient::new(store, config.reconnect).resume(token, &prefix, true, stream, handler);

        Self { updates: rx, task }
    }
}

#[async_trait]
impl SourceWatcher for ConfigWatcher {
    async fn next(&mut self) -> Result<ChangeSet> {
        tokio::select! {
            biased;
            _ = self.task.token().cancelled() => Err(Error::WatcherStopped),
            change_set = self.updates.recv() => change_set.ok_or(Error::WatcherStopped),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.task.stop().await
    }
}
