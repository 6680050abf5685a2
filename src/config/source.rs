use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CALL_TIMEOUT_MS;
use crate::constants::DEFAULT_CONFIG_PREFIX;
use crate::constants::DEFAULT_SOURCE_NAME;
use crate::Error;
use crate::Result;

/// Key/value configuration source settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    /// Namespace read and watched by the source
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Removed from every key before it is split into a document path
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Recorded as `source` on every change-set
    #[serde(default = "default_name")]
    pub name: String,

    /// Deadline of a full read, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            strip_prefix: None,
            name: default_name(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "source prefix must be non-empty".to_string(),
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "source timeout_ms must be > 0".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_prefix() -> String {
    DEFAULT_CONFIG_PREFIX.to_string()
}
fn default_name() -> String {
    DEFAULT_SOURCE_NAME.to_string()
}
fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}
