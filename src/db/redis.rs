//! Redis adapter (key-value cache).
//!
//! Holds a `ConnectionManager`, which multiplexes one connection and
//! re-establishes it transparently. Always uses logical database 0.
//!
//! The manager is built with its own dial retries switched off: a failed
//! `connect` returns at once and retrying is left to `reconnect`.

use crate::config::{BackendConfig, BackendKind, DEFAULT_MAX_RETRIES};
use crate::db::interface::DbInterface;
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const BACKEND: BackendKind = BackendKind::Redis;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisStore {
    config: Arc<BackendConfig>,
    manager: Option<ConnectionManager>,
    connected: bool,
    max_retries: u32,
}

impl RedisStore {
    pub fn new(config: Arc<BackendConfig>) -> Self {
        Self {
            config,
            manager: None,
            connected: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `redis://:pass@host:port/0`
    pub fn connection_url(&self) -> DbResult<Url> {
        let mut url = self.config.connection_url("redis")?;
        url.set_path("/0");
        Ok(url)
    }

    /// Clone of the shared manager. Clones share one underlying connection.
    fn conn(&self) -> DbResult<ConnectionManager> {
        self.manager
            .clone()
            .ok_or_else(|| DbError::not_connected(BACKEND))
    }

    fn manager_config() -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(DIAL_TIMEOUT)
    }

    async fn send_ping(conn: &mut ConnectionManager) -> redis::RedisResult<()> {
        let _: String = redis::cmd("PING").query_async(conn).await?;
        Ok(())
    }

    /// Store `value` under `key`.
    ///
    /// `None` or a zero duration means no expiry. Expirations are sent in
    /// milliseconds, rounding sub-millisecond durations up.
    pub async fn set(&self, key: &str, value: &str, expiration: Option<Duration>) -> DbResult<()> {
        let mut conn = self.conn()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(millis) = expiration.and_then(expiry_millis) {
            cmd.arg("PX").arg(millis);
        }
        let () = cmd.query_async(&mut conn).await?;
        debug!(backend = %BACKEND, key, ?expiration, "Set key");
        Ok(())
    }

    /// Fetch the value stored under `key`.
    ///
    /// A missing key is [`DbError::NotFound`], never an empty string.
    pub async fn get(&self, key: &str) -> DbResult<String> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.get(key).await?;
        value.ok_or_else(|| DbError::not_found(BACKEND, format!("key '{}'", key)))
    }

    /// Remove `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.conn()?;
        Ok(conn.exists(key).await?)
    }
}

fn expiry_millis(expiration: Duration) -> Option<u64> {
    if expiration.is_zero() {
        return None;
    }
    let millis = expiration.as_nanos().div_ceil(1_000_000);
    Some(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[async_trait]
impl DbInterface for RedisStore {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.manager.is_some() {
            return Err(DbError::already_connected(BACKEND));
        }

        let url = self.connection_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| DbError::invalid_input(format!("Invalid Redis address: {}", e)))?;

        let connect = async {
            let mut manager = ConnectionManager::new_with_config(client, Self::manager_config()).await?;
            Self::send_ping(&mut manager).await?;
            Ok::<_, redis::RedisError>(manager)
        };
        let manager = connect
            .await
            .map_err(|e| DbError::connect_failed(BACKEND, e))?;

        info!(backend = %BACKEND, host = %self.config.host, port = self.config.port, "Connected");
        self.manager = Some(manager);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> DbResult<()> {
        if self.manager.take().is_some() {
            info!(backend = %BACKEND, "Disconnected");
        }
        self.connected = false;
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.conn()?;
        Ok(Self::send_ping(&mut conn).await?)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
