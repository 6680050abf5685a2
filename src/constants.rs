// -
// Key namespaces

/// Namespace under which service nodes are stored
pub const DEFAULT_REGISTRY_PREFIX: &str = "/micro/registry/";

/// Namespace read by the key/value config source
pub const DEFAULT_CONFIG_PREFIX: &str = "/micro/config/";

// -
// Store defaults

/// Client port assumed for endpoints given without one
pub const DEFAULT_STORE_PORT: u16 = 2379;

pub const DEFAULT_STORE_ENDPOINT: &str = "127.0.0.1:2379";

/// Per-call deadline for registry and source store round trips
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5000;

/// Period of the in-process store's expired lease sweep
pub const LEASE_SWEEP_INTERVAL_MS: u64 = 100;

// -
// Naming

pub const REGISTRY_NAME: &str = "store";
pub const DEFAULT_SOURCE_NAME: &str = "kv";

/// Separator used in node keys in place of `/` inside names and ids
pub(crate) const KEY_ESCAPE: &str = "-";
