//! In-process coordination store.
//!
//! Implements the full [`Store`] protocol in memory: monotonically increasing
//! revisions, TTL leases that delete their keys on expiry, and prefix watches
//! with pre-image delete events. Cloning a [`MemStore`] shares its state, so
//! several registries or config sources can observe each other like separate
//! processes connected to the same cluster.
//!
//! Expired leases are removed at the start of every operation and by a
//! background sweeper started with the first lease grant, so watchers see
//! the deletes of an idle store too. The sweeper stops on `close()` or once
//! the last handle is dropped. Deadlines use `tokio::time` so paused-clock
//! tests can drive them.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::EventType;
use super::GetOptions;
use super::KeyValue;
use super::LeaseId;
use super::Store;
use super::StoreEvent;
use super::WatchResponse;
use super::WatchStream;
use crate::constants::LEASE_SWEEP_INTERVAL_MS;
use crate::Error;
use crate::Result;

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<MemStoreInner>,
}

#[derive(Default)]
struct MemStoreInner {
    state: Mutex<MemState>,

    /// Active subscriptions keyed by watcher id
    watchers: DashMap<u64, MemWatcher>,

    next_watcher_id: AtomicU64,

    /// Total number of successful puts, for write accounting
    puts: AtomicU64,

    closed: AtomicBool,

    sweeper_started: AtomicBool,

    /// Stops the lease sweeper
    shutdown: CancellationToken,
}

impl Drop for MemStoreInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Default)]
struct MemState {
    revision: i64,
    compact_revision: i64,
    next_lease_id: i64,
    kvs: BTreeMap<String, KeyValue>,
    leases: HashMap<LeaseId, LeaseEntry>,
}

struct LeaseEntry {
    ttl: Duration,
    expires_at: Instant,
    keys: HashSet<String>,
}

struct MemWatcher {
    key: String,
    prefix: bool,
    sender: mpsc::UnboundedSender<WatchResponse>,
}

impl MemWatcher {
    fn matches(
        &self,
        key: &str,
    ) -> bool {
        if self.prefix {
            key.starts_with(&self.key)
        } else {
            key == self.key
        }
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current store revision
    pub fn revision(&self) -> i64 {
        self.inner.state.lock().revision
    }

    /// Number of successful puts since creation
    pub fn put_count(&self) -> u64 {
        self.inner.puts.load(Ordering::Acquire)
    }

    /// Number of open watch subscriptions
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    /// Lease currently attached to `key`
    pub fn lease_of(
        &self,
        key: &str,
    ) -> Option<LeaseId> {
        self.inner.state.lock().kvs.get(key).and_then(|kv| kv.lease)
    }

    /// Number of live leases
    pub fn lease_count(&self) -> usize {
        self.inner.state.lock().leases.len()
    }

    /// Expires every lease whose deadline passed, deleting its keys.
    pub fn sweep_expired(&self) {
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);
    }

    /// Revokes a lease immediately, deleting every key attached to it.
    pub fn revoke(
        &self,
        lease: LeaseId,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        let entry = state.leases.remove(&lease).ok_or(Error::LeaseNotFound(lease))?;
        let events = Self::delete_keys(&mut state, entry.keys);
        self.dispatch(events);
        Ok(())
    }

    /// Closes every subscription without a response, like a server-side reset.
    pub fn disconnect_watchers(&self) {
        debug!(watchers = self.inner.watchers.len(), "disconnecting all watchers");
        self.inner.watchers.clear();
    }

    /// Cancels every subscription with an error response, then closes it.
    pub fn cancel_watchers(
        &self,
        reason: &str,
    ) {
        let compact_revision = self.inner.state.lock().compact_revision;
        for entry in self.inner.watchers.iter() {
            let mut response = WatchResponse::canceled(reason);
            response.compact_revision = compact_revision;
            let _ = entry.value().sender.send(response);
        }
        self.inner.watchers.clear();
    }

    /// Compacts history up to `revision`. Open watchers are canceled.
    pub fn compact(
        &self,
        revision: i64,
    ) {
        {
            let mut state = self.inner.state.lock();
            state.compact_revision = revision.min(state.revision);
        }
        self.cancel_watchers("required revision has been compacted");
    }

    /// Spawns the lease sweeper once per store.
    fn ensure_sweeper(&self) {
        if self.inner.sweeper_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(Self::sweep_loop(inner, shutdown));
    }

    /// Holds only a weak handle so dropping every `MemStore` ends the loop.
    async fn sweep_loop(
        inner: Weak<MemStoreInner>,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Duration::from_millis(LEASE_SWEEP_INTERVAL_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    MemStore { inner }.sweep_expired();
                }
            }
        }

        debug!("lease sweeper stopped");
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Unavailable("memory store closed".to_string()));
        }
        Ok(())
    }

    fn expire_leases(
        &self,
        state: &mut MemState,
    ) {
        let now = Instant::now();
        let expired: Vec<LeaseId> = state
            .leases
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(entry) = state.leases.remove(&id) {
                trace!(lease = %id, keys = entry.keys.len(), "lease expired");
                let events = Self::delete_keys(state, entry.keys);
                self.dispatch(events);
            }
        }
    }

    fn delete_keys(
        state: &mut MemState,
        keys: HashSet<String>,
    ) -> Vec<StoreEvent> {
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();

        let mut events = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(event) = Self::delete_key(state, &key) {
                events.push(event);
            }
        }
        events
    }

    fn delete_key(
        state: &mut MemState,
        key: &str,
    ) -> Option<StoreEvent> {
        let prev = state.kvs.remove(key)?;
        if let Some(lease) = prev.lease {
            if let Some(entry) = state.leases.get_mut(&lease) {
                entry.keys.remove(key);
            }
        }

        state.revision += 1;
        Some(StoreEvent {
            event_type: EventType::Delete,
            kv: KeyValue {
                key: key.to_string(),
                value: Bytes::new(),
                lease: None,
                create_revision: 0,
                mod_revision: state.revision,
                version: 0,
            },
            prev_kv: Some(prev),
        })
    }

    /// Fans events out to matching watchers.
    ///
    /// Called with the state lock held so every watcher sees store order.
    fn dispatch(
        &self,
        events: Vec<StoreEvent>,
    ) {
        if events.is_empty() {
            return;
        }

        self.inner.watchers.retain(|id, watcher| {
            let matching: Vec<StoreEvent> = events
                .iter()
                .filter(|event| watcher.matches(&event.kv.key))
                .cloned()
                .collect();
            if matching.is_empty() {
                return true;
            }

            let delivered = watcher.sender.send(WatchResponse::from_events(matching)).is_ok();
            if !delivered {
                trace!(watcher_id = id, "watch receiver dropped, removing subscription");
            }
            delivered
        });
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(
        &self,
        key: &str,
        options: GetOptions,
    ) -> Result<Vec<KeyValue>> {
        self.check_open()?;
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);

        if !options.prefix {
            return Ok(state.kvs.get(key).cloned().into_iter().collect());
        }

        Ok(state
            .kvs
            .range(key.to_string()..)
            .take_while(|(k, _)| k.starts_with(key))
            .map(|(_, kv)| kv.clone())
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> Result<()> {
        self.check_open()?;
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);

        if let Some(id) = lease {
            let entry = state.leases.get_mut(&id).ok_or(Error::LeaseNotFound(id))?;
            entry.keys.insert(key.to_string());
        }

        let prev = state.kvs.get(key).cloned();
        if let Some(old_lease) = prev.as_ref().and_then(|kv| kv.lease) {
            if Some(old_lease) != lease {
                if let Some(entry) = state.leases.get_mut(&old_lease) {
                    entry.keys.remove(key);
                }
            }
        }

        state.revision += 1;
        let revision = state.revision;
        let kv = KeyValue {
            key: key.to_string(),
            value,
            lease,
            create_revision: prev.as_ref().map(|kv| kv.create_revision).unwrap_or(revision),
            mod_revision: revision,
            version: prev.as_ref().map(|kv| kv.version).unwrap_or(0) + 1,
        };
        state.kvs.insert(key.to_string(), kv.clone());
        self.inner.puts.fetch_add(1, Ordering::AcqRel);

        self.dispatch(vec![StoreEvent {
            event_type: EventType::Put,
            kv,
            prev_kv: prev,
        }]);
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.check_open()?;
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);

        if let Some(event) = Self::delete_key(&mut state, key) {
            self.dispatch(vec![event]);
        }
        Ok(())
    }

    async fn grant(
        &self,
        ttl_secs: i64,
    ) -> Result<LeaseId> {
        self.check_open()?;
        if ttl_secs <= 0 {
            return Err(Error::InvalidArgument(format!("lease ttl must be positive, got {ttl_secs}")));
        }

        self.ensure_sweeper();
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);

        state.next_lease_id += 1;
        let id = LeaseId(state.next_lease_id);
        let ttl = Duration::from_secs(ttl_secs as u64);
        state.leases.insert(
            id,
            LeaseEntry {
                ttl,
                expires_at: Instant::now() + ttl,
                keys: HashSet::new(),
            },
        );
        trace!(lease = %id, ttl_secs, "lease granted");
        Ok(id)
    }

    async fn keep_alive_once(
        &self,
        lease: LeaseId,
    ) -> Result<()> {
        self.check_open()?;
        let mut state = self.inner.state.lock();
        self.expire_leases(&mut state);

        let entry = state.leases.get_mut(&lease).ok_or(Error::LeaseNotFound(lease))?;
        entry.expires_at = Instant::now() + entry.ttl;
        Ok(())
    }

    async fn watch(
        &self,
        key: &str,
        prefix: bool,
    ) -> Result<WatchStream> {
        self.check_open()?;
        // Registration under the state lock orders it against concurrent writes
        let _state = self.inner.state.lock();

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        self.inner.watchers.insert(
            id,
            MemWatcher {
                key: key.to_string(),
                prefix,
                sender,
            },
        );
        trace!(watcher_id = id, key, prefix, "watch registered");
        Ok(receiver)
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.cancel();
        self.inner.watchers.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
