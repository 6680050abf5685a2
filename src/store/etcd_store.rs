//! etcd backend for the [`Store`] protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use etcd_client::Client;
use etcd_client::ConnectOptions;
use etcd_client::GetOptions as EtcdGetOptions;
use etcd_client::PutOptions;
use etcd_client::WatchOptions;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use super::EventType;
use super::GetOptions;
use super::KeyValue;
use super::LeaseId;
use super::Store;
use super::StoreEvent;
use super::WatchResponse;
use super::WatchStream;
use crate::config::StoreConfig;
use crate::utils::fill_addresses_port;
use crate::Error;
use crate::Result;

const LEASE_NOT_FOUND: &str = "requested lease not found";

pub struct EtcdStore {
    client: RwLock<Option<Client>>,
}

impl EtcdStore {
    /// Connects to the cluster described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let endpoints = fill_addresses_port(&config.endpoints);
        let mut options = ConnectOptions::new()
            .with_connect_timeout(config.dial_timeout())
            .with_keep_alive(Duration::from_secs(30), Duration::from_secs(10));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options = options.with_user(username.clone(), password.clone());
        }

        debug!(?endpoints, "connecting to etcd");
        let client = Client::connect(endpoints, Some(options)).await.map_err(map_error)?;
        Ok(Self {
            client: RwLock::new(Some(client)),
        })
    }

    fn client(&self) -> Result<Client> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| Error::Unavailable("etcd client closed".to_string()))
    }
}

fn map_error(err: etcd_client::Error) -> Error {
    match err {
        etcd_client::Error::GRpcStatus(status) => Error::Unavailable(format!("etcd: {}", status.message())),
        other => Error::Unavailable(other.to_string()),
    }
}

fn map_lease_error(
    err: etcd_client::Error,
    lease: LeaseId,
) -> Error {
    if err.to_string().contains(LEASE_NOT_FOUND) {
        return Error::LeaseNotFound(lease);
    }
    map_error(err)
}

fn convert_kv(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: Bytes::copy_from_slice(kv.value()),
        lease: (kv.lease() != 0).then_some(LeaseId(kv.lease())),
        create_revision: kv.create_revision(),
        mod_revision: kv.mod_revision(),
        version: kv.version(),
    }
}

fn convert_response(resp: &etcd_client::WatchResponse) -> WatchResponse {
    let events = resp
        .events()
        .iter()
        .filter_map(|event| {
            let kv = convert_kv(event.kv()?);
            let event_type = match event.event_type() {
                etcd_client::EventType::Put => EventType::Put,
                etcd_client::EventType::Delete => EventType::Delete,
            };
            Some(StoreEvent {
                event_type,
                kv,
                prev_kv: event.prev_kv().map(convert_kv),
            })
        })
        .collect();

    let reason = resp.cancel_reason();
    WatchResponse {
        events,
        canceled: resp.canceled(),
        error: (!reason.is_empty()).then(|| reason.to_string()),
        compact_revision: resp.compact_revision(),
    }
}

#[async_trait]
impl Store for EtcdStore {
    async fn get(
        &self,
        key: &str,
        options: GetOptions,
    ) -> Result<Vec<KeyValue>> {
        let mut get_options = EtcdGetOptions::new();
        if options.prefix {
            get_options = get_options.with_prefix();
        }
        if options.serializable {
            get_options = get_options.with_serializable();
        }

        let resp = self.client()?.get(key, Some(get_options)).await.map_err(map_error)?;
        Ok(resp.kvs().iter().map(convert_kv).collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> Result<()> {
        let options = lease.map(|id| PutOptions::new().with_lease(id.0));
        self.client()?
            .put(key, value.to_vec(), options)
            .await
            .map_err(|e| match lease {
                Some(id) => map_lease_error(e, id),
                None => map_error(e),
            })?;
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.client()?.delete(key, None).await.map_err(map_error)?;
        Ok(())
    }

    async fn grant(
        &self,
        ttl_secs: i64,
    ) -> Result<LeaseId> {
        let resp = self.client()?.lease_grant(ttl_secs, None).await.map_err(map_error)?;
        Ok(LeaseId(resp.id()))
    }

    async fn keep_alive_once(
        &self,
        lease: LeaseId,
    ) -> Result<()> {
        let (mut keeper, mut stream) = self
            .client()?
            .lease_keep_alive(lease.0)
            .await
            .map_err(|e| map_lease_error(e, lease))?;
        keeper.keep_alive().await.map_err(|e| map_lease_error(e, lease))?;

        match stream.message().await.map_err(|e| map_lease_error(e, lease))? {
            Some(resp) if resp.ttl() > 0 => Ok(()),
            _ => Err(Error::LeaseNotFound(lease)),
        }
    }

    async fn watch(
        &self,
        key: &str,
        prefix: bool,
    ) -> Result<WatchStream> {
        let mut options = WatchOptions::new().with_prev_key();
        if prefix {
            options = options.with_prefix();
        }

        let (mut watcher, mut stream) = self.client()?.watch(key, Some(options)).await.map_err(map_error)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        let _ = watcher.cancel().await;
                        break;
                    }
                    message = stream.message() => match message {
                        Ok(Some(resp)) => {
                            if tx.send(convert_response(&resp)).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(%key, "etcd watch stream failed: {}", e);
                            let _ = tx.send(WatchResponse::canceled(e.to_string()));
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.client.write().take();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "etcd"
    }
}
