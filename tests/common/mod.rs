use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use micro_coord::config::BackoffPolicy;
use micro_coord::KvSource;
use micro_coord::MemStore;
use micro_coord::Settings;
use micro_coord::StoreRegistry;
use tokio::time::timeout;

pub const WAIT_FOR_EVENT: Duration = Duration::from_secs(2);

/// Defaults with fast watch reconnects and `/micro/config` stripped from
/// config keys.
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.watch.reconnect = BackoffPolicy {
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    settings.source.strip_prefix = Some("/micro/config".to_string());
    settings
}

pub fn registry(store: &MemStore) -> StoreRegistry {
    StoreRegistry::from_settings(Arc::new(store.clone()), &settings())
}

pub fn source(store: &MemStore) -> KvSource {
    KvSource::from_settings(Arc::new(store.clone()), &settings())
}

/// Awaits `fut`, failing the test when nothing arrives in time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    timeout(WAIT_FOR_EVENT, fut).await.expect("no event within deadline")
}

pub async fn wait_for_watchers(
    store: &MemStore,
    expected: usize,
) {
    within(async {
        while store.watcher_count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}
