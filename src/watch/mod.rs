//! Supervised store subscriptions.
//!
//! A store watch channel may close or fail at any moment (leader change,
//! compaction, connection reset). [`WatchClient`] keeps one logical
//! subscription alive on top of it and hands every batch to a
//! [`WatchHandler`]. Cancellation of the owning token is the only clean way
//! for the loop to end.

mod watch_client;
pub use watch_client::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::StoreEvent;
use crate::Error;
use crate::Result;

/// Receives the batches of a supervised subscription.
///
/// Called with `(events, None)` for every delivered batch and with
/// `(vec![], Some(err))` when the store reports a failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatchHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        events: Vec<StoreEvent>,
        err: Option<Error>,
    );
}

/// Handle on a running watch loop.
///
/// Dropping it cancels the loop without waiting for it.
#[derive(Debug)]
pub struct WatchTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WatchTask {
    pub(crate) fn new(
        token: CancellationToken,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancels the loop and waits for it to exit. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for WatchTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
