//! Integration tests for the Redis adapter.
//!
//! Set TEST_REDIS_URL to run them.
//! Example: TEST_REDIS_URL="redis://:secret@localhost:6379"

use polydb::config::BackendConfig;
use polydb::db::{DbInterface, RedisStore};
use polydb::error::DbError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn redis_store() -> Option<RedisStore> {
    let url = match std::env::var("TEST_REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_REDIS_URL not set");
            return None;
        }
    };
    let (_, config) = BackendConfig::from_url(&url).expect("valid TEST_REDIS_URL");
    Some(RedisStore::new(Arc::new(config)))
}

fn unique_key(name: &str) -> String {
    format!("polydb:test:{}:{}", name, std::process::id())
}

#[tokio::test]
async fn test_connect_disconnect_toggles_flag() {
    let Some(mut store) = redis_store() else {
        return;
    };

    store.connect().await.unwrap();
    assert!(store.is_connected());
    store.ping().await.unwrap();

    let err = store.connect().await.unwrap_err();
    assert!(matches!(err, DbError::AlreadyConnected { .. }));
    assert!(store.is_connected());

    store.disconnect().await.unwrap();
    assert!(!store.is_connected());

    store.reconnect(&CancellationToken::new()).await.unwrap();
    assert!(store.is_connected());
    store.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_get_missing_key_is_not_found() {
    let Some(mut store) = redis_store() else {
        return;
    };
    store.connect().await.unwrap();

    let err = store.get(&unique_key("never-set")).await.unwrap_err();
    assert!(err.is_not_found(), "{}", err);
    assert!(!matches!(err, DbError::NotConnected { .. }));

    store.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_set_get_delete_exists() {
    let Some(mut store) = redis_store() else {
        return;
    };
    store.connect().await.unwrap();
    let key = unique_key("roundtrip");

    store.set(&key, "hello", None).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), "hello");
    assert!(store.exists(&key).await.unwrap());

    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert!(!store.exists(&key).await.unwrap());

    store.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_set_with_expiration() {
    let Some(mut store) = redis_store() else {
        return;
    };
    store.connect().await.unwrap();
    let key = unique_key("ttl");

    store
        .set(&key, "short-lived", Some(Duration::from_millis(150)))
        .await
        .unwrap();
    assert!(store.exists(&key).await.unwrap());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.get(&key).await.unwrap_err().is_not_found());

    store.disconnect().await.unwrap();
}
