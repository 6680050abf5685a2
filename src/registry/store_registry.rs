use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::node_path;
use super::service_path;
use super::DeregisterOptions;
use super::LookupOptions;
use super::Node;
use super::RegisterOptions;
use super::Registry;
use super::RegistryWatcher;
use super::Service;
use super::WatchOptions;
use super::Watcher;
use crate::config::RegistryConfig;
use crate::config::Settings;
use crate::config::WatchConfig;
use crate::constants::REGISTRY_NAME;
use crate::metrics::REGISTRY_LEASE_LOST;
use crate::metrics::REGISTRY_SKIPPED_WRITES;
use crate::metrics::REGISTRY_WRITES;
use crate::store::GetOptions;
use crate::store::KeyValue;
use crate::store::LeaseId;
use crate::store::Store;
use crate::utils::checksum;
use crate::utils::scoped_timer::ScopedTimer;
use crate::utils::with_timeout;
use crate::Error;
use crate::NodeFailure;
use crate::Result;

/// `(service name, node id)`
type NodeKey = (String, String);

#[derive(Default)]
struct RegistrationCache {
    /// Content hash of the last record written for a node
    hashes: HashMap<NodeKey, String>,
    /// Lease the node's record is attached to
    leases: HashMap<NodeKey, LeaseId>,
}

struct StoreHandle {
    store: Arc<dyn Store>,
}

/// [`Registry`] backed by a coordination [`Store`].
pub struct StoreRegistry {
    handle: ArcSwap<StoreHandle>,
    config: RegistryConfig,
    watch: WatchConfig,

    /// Both caches behind one lock. Store calls are never made while it is
    /// held, so a cache entry may briefly lag the store; the worst outcome is
    /// one redundant write.
    cache: Mutex<RegistrationCache>,
}

impl StoreRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        config: RegistryConfig,
        watch: WatchConfig,
    ) -> Self {
        Self {
            handle: ArcSwap::from_pointee(StoreHandle { store }),
            config,
            watch,
            cache: Mutex::new(RegistrationCache::default()),
        }
    }

    pub fn from_settings(
        store: Arc<dyn Store>,
        settings: &Settings,
    ) -> Self {
        Self::new(store, settings.registry.clone(), settings.watch.clone())
    }

    /// Connects to the etcd cluster named in `settings`.
    #[cfg(feature = "etcd")]
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let store = crate::store::EtcdStore::connect(&settings.store).await?;
        Ok(Self::from_settings(Arc::new(store), settings))
    }

    pub fn options(&self) -> &RegistryConfig {
        &self.config
    }

    /// Replaces the store connection, closing the current one first.
    ///
    /// Cached leases belong to the old connection and are dropped.
    pub async fn reconfigure(
        &self,
        store: Arc<dyn Store>,
    ) -> Result<()> {
        let previous = self.store();
        if let Err(e) = previous.close().await {
            warn!(store = previous.name(), "closing previous store failed: {}", e);
        }

        self.handle.store(Arc::new(StoreHandle { store }));
        let mut cache = self.cache.lock();
        cache.hashes.clear();
        cache.leases.clear();
        debug!("registry store replaced");
        Ok(())
    }

    /// Number of nodes with a cached lease
    pub fn cached_leases(&self) -> usize {
        self.cache.lock().leases.len()
    }

    fn store(&self) -> Arc<dyn Store> {
        self.handle.load().store.clone()
    }

    fn call_timeout(
        &self,
        requested: Option<Duration>,
    ) -> Duration {
        requested.unwrap_or_else(|| self.config.timeout())
    }

    async fn register_node(
        &self,
        service: &Service,
        node: &Node,
        options: &RegisterOptions,
    ) -> Result<()> {
        let _timer = ScopedTimer::new("register_node");
        if service.nodes.is_empty() {
            return Err(Error::InvalidArgument("require at least one node".to_string()));
        }

        let store = self.store();
        let timeout = self.call_timeout(options.timeout);
        let key = node_path(&self.config.prefix, &service.name, &node.id);
        let cache_key: NodeKey = (service.name.clone(), node.id.clone());

        let cached_lease = self.cache.lock().leases.get(&cache_key).copied();
        let lease = match cached_lease {
            Some(lease) => Some(lease),
            None => self.discover_lease(&store, &key, &cache_key, timeout).await?,
        };

        let mut lease_not_found = false;
        if let Some(lease) = lease {
            trace!(service = %service.name, %lease, "renewing existing lease");
            match with_timeout(timeout, store.keep_alive_once(lease)).await {
                Ok(()) => {}
                Err(Error::LeaseNotFound(_)) => {
                    trace!(service = %service.name, %lease, "lease not found, registering again");
                    REGISTRY_LEASE_LOST.with_label_values(&[&service.name]).inc();
                    lease_not_found = true;
                }
                Err(e) => return Err(e),
            }
        }

        let hash = node_hash(node)?;
        let unchanged = self.cache.lock().hashes.get(&cache_key) == Some(&hash);
        if unchanged && !lease_not_found {
            trace!(service = %service.name, node = %node.id, "node unchanged, skipping registration");
            REGISTRY_SKIPPED_WRITES.with_label_values(&[&service.name]).inc();
            return Ok(());
        }

        let record = service.single_node(node);
        let data = serde_json::to_vec(&record)?;

        let ttl_secs = options.ttl.as_secs();
        let granted = if ttl_secs > 0 {
            Some(with_timeout(timeout, store.grant(ttl_secs as i64)).await?)
        } else {
            None
        };

        debug!(
            service = %service.name,
            node = %node.id,
            lease = ?granted,
            ttl_secs,
            "registering node"
        );
        with_timeout(timeout, store.put(&key, Bytes::from(data), granted)).await?;
        REGISTRY_WRITES.with_label_values(&[&service.name]).inc();

        let mut cache = self.cache.lock();
        cache.hashes.insert(cache_key.clone(), hash);
        match granted {
            Some(lease) => cache.leases.insert(cache_key, lease),
            None => cache.leases.remove(&cache_key),
        };
        Ok(())
    }

    /// Looks up the stored record of a node after a cache miss.
    ///
    /// Seeds both caches when the record carries a lease and decodes.
    async fn discover_lease(
        &self,
        store: &Arc<dyn Store>,
        key: &str,
        cache_key: &NodeKey,
        timeout: Duration,
    ) -> Result<Option<LeaseId>> {
        let kvs = with_timeout(timeout, store.get(key, GetOptions::default().with_serializable())).await?;

        let mut lease = None;
        for kv in kvs {
            let Some(id) = kv.lease else {
                continue;
            };
            lease = Some(id);

            let Some(stored) = decode_service(&kv) else {
                continue;
            };
            let Some(first) = stored.nodes.first() else {
                continue;
            };

            let hash = node_hash(first)?;
            let mut cache = self.cache.lock();
            cache.leases.insert(cache_key.clone(), id);
            cache.hashes.insert(cache_key.clone(), hash);
        }
        Ok(lease)
    }
}

fn node_hash(node: &Node) -> Result<String> {
    Ok(checksum(&serde_json::to_vec(node)?))
}

fn decode_service(kv: &KeyValue) -> Option<Service> {
    match serde_json::from_slice::<Service>(&kv.value) {
        Ok(service) => Some(service),
        Err(e) => {
            warn!(key = %kv.key, "skipping undecodable service record: {}", e);
            None
        }
    }
}

#[async_trait]
impl Registry for StoreRegistry {
    async fn register(
        &self,
        service: &Service,
        options: RegisterOptions,
    ) -> Result<()> {
        if service.nodes.is_empty() {
            return Err(Error::InvalidArgument("require at least one node".to_string()));
        }

        let options = RegisterOptions {
            ttl: if options.ttl.is_zero() { self.config.ttl() } else { options.ttl },
            ..options
        };

        let mut failures = Vec::new();
        for node in &service.nodes {
            if let Err(error) = self.register_node(service, node, &options).await {
                warn!(service = %service.name, node = %node.id, "node registration failed: {}", error);
                failures.push(NodeFailure {
                    node_id: node.id.clone(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialRegistration { failures })
        }
    }

    async fn deregister(
        &self,
        service: &Service,
        options: DeregisterOptions,
    ) -> Result<()> {
        if service.nodes.is_empty() {
            return Err(Error::InvalidArgument("require at least one node".to_string()));
        }

        let store = self.store();
        let timeout = self.call_timeout(options.timeout);
        for node in &service.nodes {
            let cache_key: NodeKey = (service.name.clone(), node.id.clone());
            {
                let mut cache = self.cache.lock();
                cache.hashes.remove(&cache_key);
                cache.leases.remove(&cache_key);
            }

            debug!(service = %service.name, node = %node.id, "deregistering node");
            let key = node_path(&self.config.prefix, &service.name, &node.id);
            with_timeout(timeout, store.delete(&key)).await?;
        }
        Ok(())
    }

    async fn get_service(
        &self,
        name: &str,
        options: LookupOptions,
    ) -> Result<Vec<Service>> {
        let _timer = ScopedTimer::new("get_service");
        let key = service_path(&self.config.prefix, name);
        let get = GetOptions::default().with_prefix().with_serializable();
        let kvs = with_timeout(self.call_timeout(options.timeout), self.store().get(&key, get)).await?;
        if kvs.is_empty() {
            return Err(Error::NotFound(format!("service {name}")));
        }

        let mut services: Vec<Service> = Vec::new();
        for record in kvs.iter().filter_map(decode_service) {
            match services.iter_mut().find(|s| s.version == record.version) {
                Some(merged) => merged.nodes.extend(record.nodes),
                None => services.push(record),
            }
        }
        Ok(services)
    }

    async fn list_services(
        &self,
        options: LookupOptions,
    ) -> Result<Vec<Service>> {
        let _timer = ScopedTimer::new("list_services");
        let get = GetOptions::default().with_prefix().with_serializable();
        let kvs =
            with_timeout(self.call_timeout(options.timeout), self.store().get(&self.config.prefix, get)).await?;

        let mut services: Vec<Service> = Vec::new();
        for record in kvs.iter().filter_map(decode_service) {
            match services
                .iter_mut()
                .find(|s| s.name == record.name && s.version == record.version)
            {
                Some(merged) => merged.nodes.extend(record.nodes),
                None => services.push(record),
            }
        }

        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn Watcher>> {
        let key = match options.service.as_deref() {
            Some(service) if !service.is_empty() => service_path(&self.config.prefix, service),
            _ => self.config.prefix.clone(),
        };
        let watcher = RegistryWatcher::start(self.store(), &key, &self.watch).await;
        Ok(Box::new(watcher))
    }

    fn name(&self) -> &'static str {
        REGISTRY_NAME
    }
}
