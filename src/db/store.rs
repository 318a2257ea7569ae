//! Backend selection.
//!
//! [`AnyStore`] picks an adapter from a [`BackendKind`] and forwards the
//! lifecycle contract to it. Data operations differ per backend, so callers
//! reach them through the typed accessors (`as_redis`, `as_postgres`, ...).

use crate::config::{BackendConfig, BackendKind};
use crate::db::etcd::EtcdStore;
use crate::db::interface::DbInterface;
use crate::db::mongo::MongoStore;
use crate::db::postgres::PostgresStore;
use crate::db::redis::RedisStore;
use crate::db::sqlserver::SqlServerStore;
use crate::error::DbResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub enum AnyStore {
    MongoDB(MongoStore),
    SqlServer(SqlServerStore),
    PostgreSQL(PostgresStore),
    Redis(RedisStore),
    Etcd(EtcdStore),
}

impl AnyStore {
    /// Construct the adapter for `kind`. Nothing is dialled until `connect`.
    pub fn new(kind: BackendKind, config: Arc<BackendConfig>) -> Self {
        match kind {
            BackendKind::MongoDB => Self::MongoDB(MongoStore::new(config)),
            BackendKind::SqlServer => Self::SqlServer(SqlServerStore::new(config)),
            BackendKind::PostgreSQL => Self::PostgreSQL(PostgresStore::new(config)),
            BackendKind::Redis => Self::Redis(RedisStore::new(config)),
            BackendKind::Etcd => Self::Etcd(EtcdStore::new(config)),
        }
    }

    /// Parse a connection URL and construct the matching adapter.
    pub fn from_url(url: &str) -> DbResult<Self> {
        let (kind, config) = BackendConfig::from_url(url)?;
        Ok(Self::new(kind, Arc::new(config)))
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        match self {
            Self::MongoDB(s) => Self::MongoDB(s.with_max_retries(max_retries)),
            Self::SqlServer(s) => Self::SqlServer(s.with_max_retries(max_retries)),
            Self::PostgreSQL(s) => Self::PostgreSQL(s.with_max_retries(max_retries)),
            Self::Redis(s) => Self::Redis(s.with_max_retries(max_retries)),
            Self::Etcd(s) => Self::Etcd(s.with_max_retries(max_retries)),
        }
    }

    pub fn as_mongo(&self) -> Option<&MongoStore> {
        match self {
            Self::MongoDB(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sqlserver(&self) -> Option<&SqlServerStore> {
        match self {
            Self::SqlServer(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&PostgresStore> {
        match self {
            Self::PostgreSQL(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_redis(&self) -> Option<&RedisStore> {
        match self {
            Self::Redis(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_etcd(&self) -> Option<&EtcdStore> {
        match self {
            Self::Etcd(s) => Some(s),
            _ => None,
        }
    }
}

#[async_trait]
impl DbInterface for AnyStore {
    fn backend(&self) -> BackendKind {
        dispatch_store!(self, s => s.backend())
    }

    fn max_retries(&self) -> u32 {
        dispatch_store!(self, s => s.max_retries())
    }

    async fn connect(&mut self) -> DbResult<()> {
        dispatch_store!(self, s => s.connect().await)
    }

    async fn disconnect(&mut self) -> DbResult<()> {
        dispatch_store!(self, s => s.disconnect().await)
    }

    async fn ping(&self) -> DbResult<()> {
        dispatch_store!(self, s => s.ping().await)
    }

    fn is_connected(&self) -> bool {
        dispatch_store!(self, s => s.is_connected())
    }

    async fn reconnect(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        dispatch_store!(self, s => s.reconnect(cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    const ALL: [BackendKind; 5] = [
        BackendKind::MongoDB,
        BackendKind::SqlServer,
        BackendKind::PostgreSQL,
        BackendKind::Redis,
        BackendKind::Etcd,
    ];

    #[test]
    fn test_new_selects_matching_adapter() {
        for kind in ALL {
            let store = AnyStore::new(kind, Arc::new(BackendConfig::new("localhost", kind.default_port())));
            assert_eq!(store.backend(), kind);
            assert!(!store.is_connected());
        }
    }

    #[test]
    fn test_from_url_and_accessors() {
        let store = AnyStore::from_url("redis://:pw@localhost:6379").unwrap();
        assert!(store.as_redis().is_some());
        assert!(store.as_etcd().is_none());

        let store = AnyStore::from_url("postgres://app@localhost/orders").unwrap();
        assert!(store.as_postgres().is_some());
        assert!(store.as_mongo().is_none());
        assert!(store.as_sqlserver().is_none());
    }

    #[test]
    fn test_with_max_retries_forwards() {
        let store = AnyStore::from_url("etcd://localhost")
            .unwrap()
            .with_max_retries(9);
        assert_eq!(store.max_retries(), 9);
    }

    #[tokio::test]
    async fn test_ping_before_connect_for_every_backend() {
        for kind in ALL {
            let mut store =
                AnyStore::new(kind, Arc::new(BackendConfig::new("localhost", kind.default_port())));
            let err = store.ping().await.unwrap_err();
            assert!(matches!(err, DbError::NotConnected { .. }), "{}", kind);
            assert_eq!(err.backend(), Some(kind));
            tokio_test::assert_ok!(store.disconnect().await);
        }
    }
}
