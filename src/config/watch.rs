use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Watch supervision parameters shared by registry and config watchers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Capacity of the channel between the watch task and its consumer
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Delay policy between failed or empty subscriptions
    #[serde(default)]
    pub reconnect: BackoffPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            reconnect: BackoffPolicy::default(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_buffer == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch channel_buffer must be > 0".to_string(),
            )));
        }
        self.reconnect.validate()
    }
}

fn default_channel_buffer() -> usize {
    64
}
