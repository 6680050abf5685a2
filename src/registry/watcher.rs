use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use tracing::warn;

use super::Action;
use super::RegistryResult;
use super::Service;
use super::Watcher;
use crate::config::WatchConfig;
use crate::store::EventType;
use crate::store::Store;
use crate::store::StoreEvent;
use crate::watch::WatchClient;
use crate::watch::WatchHandler;
use crate::watch::WatchTask;
use crate::Error;
use crate::Result;

/// A batch handed over by the watch loop
struct RawBatch {
    events: Vec<StoreEvent>,
    error: Option<Error>,
}

/// Forwards watch loop batches to the watcher's channel.
struct ForwardHandler {
    tx: mpsc::Sender<RawBatch>,
    token: CancellationToken,
}

#[async_trait]
impl WatchHandler for ForwardHandler {
    async fn handle(
        &self,
        events: Vec<StoreEvent>,
        err: Option<Error>,
    ) {
        let batch = RawBatch { events, error: err };
        tokio::select! {
            _ = self.token.cancelled() => {}
            sent = self.tx.send(batch) => {
                if sent.is_err() {
                    trace!("registry watcher dropped, cancelling watch loop");
                    self.token.cancel();
                }
            }
        }
    }
}

/// Translates store events under a registry key into [`RegistryResult`]s.
pub struct RegistryWatcher {
    key: String,
    events: mpsc::Receiver<RawBatch>,
    /// Remainder of the batch currently being consumed
    pending: VecDeque<StoreEvent>,
    task: WatchTask,
}

impl RegistryWatcher {
    pub(crate) async fn start(
        store: Arc<dyn Store>,
        key: &str,
        config: &WatchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let token = CancellationToken::new();
        let handler = ForwardHandler {
            tx,
            token: token.clone(),
        };

        let task = WatchClient::new(store, config.reconnect)
            .watch(token, key, true, handler)
            .await;

        Self {
            key: key.to_string(),
            events: rx,
            pending: VecDeque::new(),
            task,
        }
    }

    /// Key prefix this watcher observes
    pub fn key(&self) -> &str {
        &self.key
    }

    fn translate(
        &self,
        event: &StoreEvent,
    ) -> Option<RegistryResult> {
        let (action, payload) = match event.event_type {
            EventType::Put if event.is_create() => (Action::Create, &event.kv.value),
            EventType::Put => (Action::Update, &event.kv.value),
            EventType::Delete => match &event.prev_kv {
                Some(prev) => (Action::Delete, &prev.value),
                None => {
                    warn!(key = %event.kv.key, "delete event without previous value, skipping");
                    return None;
                }
            },
        };

        match serde_json::from_slice::<Service>(payload) {
            Ok(service) => Some(RegistryResult { action, service }),
            Err(e) => {
                warn!(key = %event.kv.key, watch = %self.key, "skipping undecodable registry event: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Watcher for RegistryWatcher {
    async fn next(&mut self) -> Result<RegistryResult> {
        loop {
            while let Some(event) = self.pending.pop_front() {
                if let Some(result) = self.translate(&event) {
                    return Ok(result);
                }
            }

            let batch = tokio::select! {
                biased;
                _ = self.task.token().cancelled() => return Err(Error::WatcherStopped),
                batch = self.events.recv() => batch,
            };

            match batch {
                None => {
                    return Err(Error::WatchTerminated(format!("watch on {} closed", self.key)));
                }
                Some(RawBatch { error: Some(e), .. }) => return Err(e),
                Some(RawBatch { events, .. }) => self.pending.extend(events),
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.pending.clear();
        self.task.stop().await
    }
}
