use lazy_static::lazy_static;
use prometheus::proto::MetricFamily;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;


lazy_static! {
    pub static ref REGISTRY_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new("registry_writes_total", "Node records written to the store"),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY_SKIPPED_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "registry_skipped_writes_total",
            "Registrations answered by a lease renewal because the node was unchanged"
        ),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY_LEASE_LOST: IntCounterVec = IntCounterVec::new(
        Opts::new("registry_lease_lost_total", "Renewals that found the lease gone"),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_RECONNECTS: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_reconnects_total", "Watch subscriptions reopened after closing"),
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref CONFIG_FALLBACK_READS: IntCounterVec = IntCounterVec::new(
        Opts::new("config_fallback_reads_total", "Full reads issued after a config watch error"),
        &["source"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("micro".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(REGISTRY_WRITES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REGISTRY_SKIPPED_WRITES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REGISTRY_LEASE_LOST.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_RECONNECTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CONFIG_FALLBACK_READS.clone()))
        .expect("collector can be registered");
}

/// Snapshot of every coordination metric, names prefixed `micro_`.
pub fn gather() -> Vec<MetricFamily> {
    REGISTRY.gather()
}

/// Prometheus text exposition of [`gather`].
pub fn encode_text() -> crate::Result<String> {
    TextEncoder::new()
        .encode_to_string(&gather())
        .map_err(|e| crate::Error::Encode(e.to_string()))
}
