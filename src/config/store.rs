use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_STORE_ENDPOINT;
use crate::Error;
use crate::Result;

/// Connection parameters of the coordination store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Cluster endpoints, `host[:port]`. The default client port is filled
    /// in for entries without one.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            dial_timeout_ms: default_dial_timeout_ms(),
            username: None,
            password: None,
        }
    }
}

impl StoreConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(
                "store endpoints must be non-empty".to_string(),
            )));
        }

        if self.dial_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store dial_timeout_ms must be > 0".to_string(),
            )));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "store username and password must be set together".to_string(),
            )));
        }

        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec![DEFAULT_STORE_ENDPOINT.to_string()]
}
fn default_dial_timeout_ms() -> u64 {
    3000
}
