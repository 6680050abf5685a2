//! Settings of the coordination layer.
//!
//! Loaded from multiple sources with priority (later overrides earlier):
//! 1. Default values (hardcoded)
//! 2. Configuration file from `CONFIG_PATH` (if set)
//! 3. Configuration file passed to [`Settings::load`]
//! 4. Environment variables prefixed `MICRO__` (highest priority)
//!
//! `MICRO__STORE__ENDPOINTS` accepts a comma separated list.

mod registry;
mod retry;
mod source;
mod store;
mod watch;
pub use registry::*;
pub use retry::*;
pub use source::*;
pub use store::*;
pub use watch::*;

#[cfg(test)]
mod config_test;

//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Coordination store connection
    #[serde(default)]
    pub store: StoreConfig,
    /// Service registry namespace and deadlines
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Key/value configuration source
    #[serde(default)]
    pub source: SourceConfig,
    /// Watch supervision
    #[serde(default)]
    pub watch: WatchConfig,
}

fn environment() -> Environment {
    Environment::with_prefix("MICRO")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("store.endpoints")
}

impl Settings {
    /// Builds settings from defaults, `CONFIG_PATH`, `path` and the environment.
    ///
    /// No validation happens here, call [`Settings::validate`] once all
    /// overrides are applied.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings: Self = builder.add_source(environment()).build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Layers another file over the current values, environment on top.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.registry.validate()?;
        self.source.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}
