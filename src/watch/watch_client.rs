use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::WatchHandler;
use super::WatchTask;
use crate::config::BackoffPolicy;
use crate::metrics::WATCH_RECONNECTS;
use crate::store::Store;
use crate::store::WatchStream;
use crate::Result;

/// Opens supervised subscriptions on a store.
#[derive(Clone)]
pub struct WatchClient {
    store: Arc<dyn Store>,
    reconnect: BackoffPolicy,
}

impl WatchClient {
    pub fn new(
        store: Arc<dyn Store>,
        reconnect: BackoffPolicy,
    ) -> Self {
        Self { store, reconnect }
    }

    /// Starts watching `key` (every key below it when `prefix`).
    ///
    /// The first subscription is opened before this returns, so writes made
    /// afterwards are observed. The loop runs until `token` is cancelled.
    pub async fn watch<H>(
        &self,
        token: CancellationToken,
        key: &str,
        prefix: bool,
        handler: H,
    ) -> WatchTask
    where
        H: WatchHandler,
    {
        let first = self.store.watch(key, prefix).await;
        self.spawn(token, key, prefix, first, handler)
    }

    /// Supervises a subscription the caller already opened on `key`.
    ///
    /// Used when state must be read after subscribing, so nothing written
    /// in between is missed.
    pub fn resume<H>(
        &self,
        token: CancellationToken,
        key: &str,
        prefix: bool,
        stream: WatchStream,
        handler: H,
    ) -> WatchTask
    where
        H: WatchHandler,
    {
        self.spawn(token, key, prefix, Ok(stream), handler)
    }

    fn spawn<H>(
        &self,
        token: CancellationToken,
        key: &str,
        prefix: bool,
        first: Result<WatchStream>,
        handler: H,
    ) -> WatchTask
    where
        H: WatchHandler,
    {
        let supervisor = Supervisor {
            store: self.store.clone(),
            key: key.to_string(),
            prefix,
            reconnect: self.reconnect,
            token: token.clone(),
        };

        debug!(key, prefix, store = self.store.name(), "starting watch loop");
        let handle = tokio::spawn(supervisor.run(handler, first));
        WatchTask::new(token, handle)
    }
}

struct Supervisor {
    store: Arc<dyn Store>,
    key: String,
    prefix: bool,
    reconnect: BackoffPolicy,
    token: CancellationToken,
}

impl Supervisor {
    async fn run<H: WatchHandler>(
        self,
        handler: H,
        first: Result<WatchStream>,
    ) {
        let mut pending = Some(first);
        let mut attempt: u32 = 0;

        while !self.token.is_cancelled() {
            let subscription = match pending.take() {
                Some(subscription) => subscription,
                None => tokio::select! {
                    _ = self.token.cancelled() => break,
                    subscription = self.store.watch(&self.key, self.prefix) => subscription,
                },
            };

            let delivered = match subscription {
                Ok(stream) => match self.drain(stream, &handler).await {
                    Some(delivered) => delivered,
                    None => break,
                },
                Err(e) => {
                    warn!(key = %self.key, "watch subscription failed: {}", e);
                    handler.handle(vec![], Some(e)).await;
                    false
                }
            };

            WATCH_RECONNECTS.with_label_values(&[&self.key]).inc();
            if delivered {
                attempt = 0;
                warn!(key = %self.key, "watch channel closed, resubscribing");
                continue;
            }

            let delay = self.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(key = %self.key, ?delay, "watch channel closed without delivery, backing off");
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(key = %self.key, "watch loop stopped");
    }

    /// Forwards one subscription until it closes.
    ///
    /// Returns whether anything arrived, or `None` once cancelled.
    async fn drain<H: WatchHandler>(
        &self,
        mut stream: WatchStream,
        handler: &H,
    ) -> Option<bool> {
        let mut delivered = false;
        loop {
            let response = tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                response = stream.recv() => response,
            };

            let Some(response) = response else {
                return Some(delivered);
            };
            delivered = true;

            let err = response.err();
            if !response.events.is_empty() {
                trace!(key = %self.key, events = response.events.len(), "watch batch");
                handler.handle(response.events, None).await;
            }
            if let Some(err) = err {
                handler.handle(vec![], Some(err)).await;
            }
        }
    }
}
