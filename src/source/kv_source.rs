use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use tracing::trace;

use super::ChangeSet;
use super::ConfigWatcher;
use super::Document;
use super::Encoder;
use super::JsonEncoder;
use super::Source;
use super::SourceWatcher;
use crate::config::Settings;
use crate::config::SourceConfig;
use crate::config::WatchConfig;
use crate::store::GetOptions;
use crate::store::Store;
use crate::utils::scoped_timer::ScopedTimer;
use crate::utils::with_timeout;
use crate::Error;
use crate::Result;

/// Configuration source reading every key under a store prefix.
///
/// `/micro/config/database/address` becomes `{"database": {"address": ..}}`
/// once the configured strip prefix (`/micro/config` here) is removed.
pub struct KvSource {
    inner: Arc<SourceInner>,
    watch: WatchConfig,
}

/// State shared between the source and its watchers
pub(crate) struct SourceInner {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) prefix: String,
    strip_prefix: Option<String>,
    pub(crate) encoder: Arc<dyn Encoder>,
    pub(crate) name: String,
    timeout: Duration,
}

impl KvSource {
    pub fn new(
        store: Arc<dyn Store>,
        config: SourceConfig,
        watch: WatchConfig,
    ) -> Self {
        let timeout = config.timeout();
        Self {
            inner: Arc::new(SourceInner {
                store,
                prefix: config.prefix,
                strip_prefix: config.strip_prefix.filter(|p| !p.is_empty()),
                encoder: Arc::new(JsonEncoder),
                name: config.name,
                timeout,
            }),
            watch,
        }
    }

    pub fn from_settings(
        store: Arc<dyn Store>,
        settings: &Settings,
    ) -> Self {
        Self::new(store, settings.source.clone(), settings.watch.clone())
    }

    /// Connects to the etcd cluster named in `settings`.
    #[cfg(feature = "etcd")]
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let store = crate::store::EtcdStore::connect(&settings.store).await?;
        Ok(Self::from_settings(Arc::new(store), settings))
    }

    /// Replaces the default JSON encoder.
    pub fn with_encoder(
        self,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let inner = SourceInner {
            store: self.inner.store.clone(),
            prefix: self.inner.prefix.clone(),
            strip_prefix: self.inner.strip_prefix.clone(),
            encoder,
            name: self.inner.name.clone(),
            timeout: self.inner.timeout,
        };
        Self {
            inner: Arc::new(inner),
            watch: self.watch,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }
}

impl SourceInner {
    pub(crate) async fn read(&self) -> Result<ChangeSet> {
        let _timer = ScopedTimer::new("config_read");
        let kvs = with_timeout(
            self.timeout,
            self.store.get(&self.prefix, GetOptions::default().with_prefix()),
        )
        .await?;
        if kvs.is_empty() {
            return Err(Error::NotFound(format!("source not found: {}", self.prefix)));
        }

        let mut document = Document::empty();
        for kv in &kvs {
            document.patch(&self.path(&kv.key), Some(self.decode_value(&kv.value)));
        }

        trace!(prefix = %self.prefix, keys = kvs.len(), "config snapshot read");
        self.change_set(&document)
    }

    /// Document path of a store key
    pub(crate) fn path<'a>(
        &self,
        key: &'a str,
    ) -> Vec<&'a str> {
        let key = match &self.strip_prefix {
            Some(strip) => key.strip_prefix(strip.as_str()).unwrap_or(key),
            None => key,
        };
        let key = key.strip_prefix('/').unwrap_or(key);
        key.split('/').collect()
    }

    /// Raw values that do not decode are kept as null.
    pub(crate) fn decode_value(
        &self,
        value: &Bytes,
    ) -> Document {
        self.encoder.decode(value).unwrap_or_else(|e| {
            trace!("config value did not decode, storing null: {}", e);
            Document::Null
        })
    }

    pub(crate) fn change_set(
        &self,
        document: &Document,
    ) -> Result<ChangeSet> {
        let data = self.encoder.encode(document)?;
        Ok(ChangeSet::new(data, self.encoder.format(), self.name.clone()))
    }
}

#[async_trait]
impl Source for KvSource {
    async fn read(&self) -> Result<ChangeSet> {
        self.inner.read().await
    }

    async fn watch(&self) -> Result<Box<dyn SourceWatcher>> {
        // Subscribe before reading so writes racing the read are replayed
        let stream = with_timeout(self.inner.timeout, self.inner.store.watch(&self.inner.prefix, true)).await?;
        let baseline = self.inner.read().await?;
        debug!(prefix = %self.inner.prefix, checksum = %baseline.checksum, "starting config watcher");
        let watcher = ConfigWatcher::start(self.inner.clone(), baseline, stream, &self.watch);
        Ok(Box::new(watcher))
    }

    async fn write(
        &self,
        _change_set: &ChangeSet,
    ) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}
