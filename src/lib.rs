//! # micro-coord
//!
//! Coordination layer for microservices on top of a watchable key/value
//! store (etcd, or the in-process [`MemStore`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use micro_coord::registry::{Node, RegisterOptions, Registry, Service, StoreRegistry};
//! use micro_coord::{MemStore, Settings};
//!
//! #[tokio::main]
//! async fn main() -> micro_coord::Result<()> {
//!     let settings = Settings::load(None)?.validate()?;
//!     let registry = StoreRegistry::from_settings(Arc::new(MemStore::new()), &settings);
//!
//!     let service = Service::new("greeter", "1.0.0").with_node(Node::new("greeter-1", "10.0.0.5:8080"));
//!     let options = RegisterOptions::default().with_ttl(Duration::from_secs(15));
//!
//!     // Call again before the TTL elapses; unchanged nodes only renew their lease
//!     registry.register(&service, options).await?;
//!
//!     for svc in registry.get_service("greeter", Default::default()).await? {
//!         println!("{} {} -> {} nodes", svc.name, svc.version, svc.nodes.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - [`registry`] - lease based service registration, merged lookups and
//!   change watches
//! - [`source`] - configuration snapshots read from a key prefix, kept up to
//!   date by patching the document with every watch event
//! - [`watch`] - reconnecting store subscriptions shared by both
//! - [`store`] - the store protocol, [`MemStore`] and `EtcdStore` (feature
//!   `etcd`)

pub mod config;
pub mod constants;
mod errors;
pub mod metrics;
pub mod registry;
pub mod source;
pub mod store;
pub mod utils;
pub mod watch;

pub use config::Settings;
pub use errors::*;
pub use registry::Registry;
pub use registry::StoreRegistry;
pub use source::KvSource;
pub use source::Source;
pub use store::LeaseId;
pub use store::MemStore;
pub use store::Store;
