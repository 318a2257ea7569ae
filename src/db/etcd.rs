//! etcd adapter (coordination store).
//!
//! Keys are strings and values are raw bytes. [`EtcdStore::watch`] opens a
//! live change stream for one key.

use crate::config::{BackendConfig, BackendKind, DEFAULT_MAX_RETRIES};
use crate::db::interface::DbInterface;
use crate::error::{DbError, DbResult};
use crate::models::{WatchEvent, WatchEventKind};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, Event, EventType, WatchStream, Watcher};
use futures_util::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const BACKEND: BackendKind = BackendKind::Etcd;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Key read to check liveness. It need not exist.
const LIVENESS_KEY: &str = "ping";

pub struct EtcdStore {
    config: Arc<BackendConfig>,
    client: Option<Client>,
    connected: bool,
    max_retries: u32,
}

impl EtcdStore {
    pub fn new(config: Arc<BackendConfig>) -> Self {
        Self {
            config,
            client: None,
            connected: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Endpoint in `host:port` form.
    pub fn endpoint(&self) -> String {
        self.config.address()
    }

    fn connect_options(&self) -> ConnectOptions {
        let options = ConnectOptions::new().with_connect_timeout(DIAL_TIMEOUT);
        if self.config.username.is_empty() {
            options
        } else {
            options.with_user(self.config.username.clone(), self.config.password.clone())
        }
    }

    /// Clone of the client handle. Clones share one channel.
    fn client(&self) -> DbResult<Client> {
        self.client
            .clone()
            .ok_or_else(|| DbError::not_connected(BACKEND))
    }

    async fn read_liveness_key(client: &mut Client) -> Result<(), etcd_client::Error> {
        client.get(LIVENESS_KEY, None).await?;
        Ok(())
    }

    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> DbResult<()> {
        let mut client = self.client()?;
        let resp = client.put(key, value, None).await?;
        debug!(
            backend = %BACKEND,
            key,
            revision = resp.header().map(|h| h.revision()).unwrap_or_default(),
            "Put key"
        );
        Ok(())
    }

    /// Fetch the value stored under `key`, or [`DbError::NotFound`].
    pub async fn get(&self, key: &str) -> DbResult<Vec<u8>> {
        let mut client = self.client()?;
        let resp = client.get(key, None).await?;
        resp.kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or_else(|| DbError::not_found(BACKEND, format!("key '{}'", key)))
    }

    /// [`EtcdStore::get`] decoded as UTF-8.
    pub async fn get_string(&self, key: &str) -> DbResult<String> {
        let value = self.get(key).await?;
        String::from_utf8(value)
            .map_err(|e| DbError::decode(BACKEND, format!("Value of '{}' is not UTF-8: {}", key, e)))
    }

    /// Remove `key`. Returns the number of keys deleted.
    pub async fn delete(&self, key: &str) -> DbResult<i64> {
        let mut client = self.client()?;
        let resp = client.delete(key, None).await?;
        Ok(resp.deleted())
    }

    /// Watch `key` for changes until `cancel` fires or the server ends the
    /// stream.
    pub async fn watch(&self, key: &str, cancel: CancellationToken) -> DbResult<Watch> {
        let mut client = self.client()?;
        let (watcher, stream) = client.watch(key, None).await?;
        debug!(backend = %BACKEND, key, watch_id = watcher.watch_id(), "Watch started");
        Ok(Watch {
            watcher,
            stream,
            pending: VecDeque::new(),
            cancel,
            done: false,
        })
    }
}

#[async_trait]
impl DbInterface for EtcdStore {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.client.is_some() {
            return Err(DbError::already_connected(BACKEND));
        }

        let connect = async {
            let mut client = Client::connect([self.endpoint()], Some(self.connect_options())).await?;
            // The channel is lazy; a read proves the endpoint answers
            Self::read_liveness_key(&mut client).await?;
            Ok::<_, etcd_client::Error>(client)
        };
        // An unreachable endpoint can leave the balanced channel pending forever
        let client = tokio::time::timeout(DIAL_TIMEOUT, connect)
            .await
            .map_err(|_| DbError::connect_failed(BACKEND, format!("timed out after {:?}", DIAL_TIMEOUT)))?
            .map_err(|e| DbError::connect_failed(BACKEND, e))?;

        info!(backend = %BACKEND, endpoint = %self.endpoint(), "Connected");
        self.client = Some(client);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> DbResult<()> {
        if self.client.take().is_some() {
            info!(backend = %BACKEND, "Disconnected");
        }
        self.connected = false;
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        let mut client = self.client()?;
        Ok(Self::read_liveness_key(&mut client).await?)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Live change stream for one key.
///
/// Events arrive in revision order. Once the stream ends it cannot be
/// restarted; open a new watch instead.
pub struct Watch {
    watcher: Watcher,
    stream: WatchStream,
    pending: VecDeque<WatchEvent>,
    cancel: CancellationToken,
    done: bool,
}

impl Watch {
    /// Wait for the next change. `Ok(None)` once cancelled or closed by the
    /// server.
    pub async fn next_event(&mut self) -> DbResult<Option<WatchEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                message = self.stream.message() => Some(message),
            };

            match message {
                None => {
                    self.done = true;
                    if let Err(e) = self.watcher.cancel().await {
                        debug!(backend = %BACKEND, error = %e, "Watch cancel request failed");
                    }
                    debug!(backend = %BACKEND, "Watch cancelled");
                }
                Some(Ok(Some(resp))) => {
                    if resp.canceled() {
                        self.done = true;
                    }
                    self.pending
                        .extend(resp.events().iter().filter_map(convert_event));
                }
                Some(Ok(None)) => self.done = true,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Consume the watch as a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = DbResult<WatchEvent>> + Send {
        futures_util::stream::unfold(self, |mut watch| async move {
            match watch.next_event().await {
                Ok(Some(event)) => Some((Ok(event), watch)),
                Ok(None) => None,
                Err(e) => Some((Err(e), watch)),
            }
        })
    }
}

fn convert_event(event: &Event) -> Option<WatchEvent> {
    let kv = event.kv()?;
    let kind = match event.event_type() {
        EventType::Put => WatchEventKind::Put,
        EventType::Delete => WatchEventKind::Delete,
    };
    Some(WatchEvent {
        kind,
        key: kv.key().to_vec(),
        value: kv.value().to_vec(),
        revision: kv.mod_revision(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(config: BackendConfig) -> EtcdStore {
        EtcdStore::new(Arc::new(config))
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(store(BackendConfig::new("etcd-0", 2379)).endpoint(), "etcd-0:2379");
        assert_eq!(store(BackendConfig::new("::1", 2379)).endpoint(), "[::1]:2379");
    }

    #[test]
    fn test_new_store_is_disconnected() {
        let store = store(BackendConfig::new("localhost", 2379)).with_max_retries(5);
        assert!(!store.is_connected());
        assert_eq!(store.max_retries(), 5);
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let mut store = store(BackendConfig::new("localhost", 2379));
        assert!(matches!(
            store.ping().await.unwrap_err(),
            DbError::NotConnected { .. }
        ));
        assert!(matches!(
            store.get("a").await.unwrap_err(),
            DbError::NotConnected { .. }
        ));
        assert!(
            store
                .watch("a", CancellationToken::new())
                .await
                .is_err()
        );
        tokio_test::assert_ok!(store.disconnect().await);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_bounded() {
        let mut store = store(BackendConfig::new("127.0.0.1", 1));

        let err = tokio::time::timeout(DIAL_TIMEOUT * 2, store.connect())
            .await
            .expect("connect gives up within the dial timeout")
            .unwrap_err();

        assert!(matches!(err, DbError::Connection { .. }), "{}", err);
        assert_eq!(err.to_string().matches("Connection failed").count(), 1, "{}", err);
        assert!(!store.is_connected());
    }
}
