use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CALL_TIMEOUT_MS;
use crate::constants::DEFAULT_REGISTRY_PREFIX;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Key namespace holding one record per registered node
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Deadline of every store round trip, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Lease TTL applied by callers that do not pass their own (0 = no lease)
    #[serde(default)]
    pub ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            timeout_ms: default_timeout_ms(),
            ttl_secs: 0,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.prefix.starts_with('/') || !self.prefix.ends_with('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "registry prefix {:?} must start and end with '/'",
                self.prefix
            ))));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "registry timeout_ms must be > 0".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_prefix() -> String {
    DEFAULT_REGISTRY_PREFIX.to_string()
}
fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}
