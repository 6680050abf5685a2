//! Service registry
//!
//! Services announce their nodes with [`Registry::register`]. Every node is
//! stored as its own single-node record under
//! `<prefix>/<escaped service name>/<escaped node id>`, optionally attached to
//! a lease so the store removes it when the owner stops renewing. Readers get
//! the merged view: one [`Service`] per `(name, version)` carrying every node.
//!
//! [`StoreRegistry`] remembers, per `(service, node)`, the content hash of the
//! last written record and the lease it was attached to. Periodic
//! re-announcements of an unchanged node then cost a single lease renewal
//! instead of a write. The caches are advisory: after a restart they are
//! seeded again from the store.

mod service;
mod store_registry;
mod watcher;
pub use service::*;
pub use store_registry::*;
pub use watcher::*;

#[cfg(test)]
mod registry_test;

use std::fmt;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::Result;

/// Registry consumer interface
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Registers (or renews) every node of `service`.
    ///
    /// # Errors
    /// - [`crate::Error::InvalidArgument`] if `service` has no nodes
    /// - [`crate::Error::PartialRegistration`] naming each node that failed;
    ///   the other nodes are registered
    async fn register(
        &self,
        service: &Service,
        options: RegisterOptions,
    ) -> Result<()>;

    /// Removes every node of `service`, stopping at the first failure.
    async fn deregister(
        &self,
        service: &Service,
        options: DeregisterOptions,
    ) -> Result<()>;

    /// All versions of `name`, nodes merged per version.
    ///
    /// # Errors
    /// - [`crate::Error::NotFound`] if no node of `name` is stored
    async fn get_service(
        &self,
        name: &str,
        options: LookupOptions,
    ) -> Result<Vec<Service>>;

    /// Every `(name, version)` in the namespace, sorted by name. Empty when
    /// nothing is registered.
    async fn list_services(
        &self,
        options: LookupOptions,
    ) -> Result<Vec<Service>>;

    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn Watcher>>;

    fn name(&self) -> &'static str;
}

/// Stream of registry changes
#[async_trait]
pub trait Watcher: Send {
    /// Waits for the next change.
    ///
    /// # Errors
    /// - [`crate::Error::WatchTerminated`] if the store reported a failure
    ///   or the subscription ended
    /// - [`crate::Error::WatcherStopped`] after [`Watcher::stop`]
    async fn next(&mut self) -> Result<RegistryResult>;

    /// Cancels the watch and waits for its task to finish.
    async fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Lease TTL, whole seconds. Zero falls back to the registry's
    /// configured `ttl_secs`; zero there too registers without a lease.
    pub ttl: Duration,
    /// Per store call deadline, overriding the registry default
    pub timeout: Option<Duration>,
}

impl RegisterOptions {
    pub fn with_ttl(
        mut self,
        ttl: Duration,
    ) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeregisterOptions {
    pub timeout: Option<Duration>,
}

/// Options of `get_service` and `list_services`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOptions {
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Restrict the watch to one service; the whole namespace otherwise
    pub service: Option<String>,
}

impl WatchOptions {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// One change observed by a [`Watcher`].
///
/// `service` carries only the node touched by the store event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResult {
    pub action: Action,
    pub service: Service,
}

impl RegistryResult {
    pub fn is_create(&self) -> bool {
        self.action == Action::Create
    }

    pub fn is_update(&self) -> bool {
        self.action == Action::Update
    }

    pub fn is_delete(&self) -> bool {
        self.action == Action::Delete
    }

    /// Timestamped event attributed to registry `id`.
    pub fn into_event(
        self,
        id: impl Into<String>,
    ) -> Event {
        let event_type = match self.action {
            Action::Create => EventType::Create,
            Action::Update => EventType::Update,
            Action::Delete => EventType::Delete,
        };
        Event {
            id: id.into(),
            event_type,
            timestamp: SystemTime::now(),
            service: self.service,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A new service node was registered
    Create,
    /// A service node was deregistered or expired
    Delete,
    /// A registered node was rewritten
    Update,
}

impl fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            EventType::Create => write!(f, "create"),
            EventType::Delete => write!(f, "delete"),
            EventType::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Registry the event came from
    pub id: String,
    pub event_type: EventType,
    pub timestamp: SystemTime,
    pub service: Service,
}
