//! Shared adapter contracts.
//!
//! [`DbInterface`] is the lifecycle every adapter implements. [`DataOperation`]
//! is the CRUD contract for the adapters whose data model fits
//! collection-plus-filter access (document and relational stores). The key-value
//! and coordination adapters expose their own key-based methods instead.

use crate::config::BackendKind;
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connection lifecycle contract.
///
/// States are Disconnected (initial) and Connected. Lifecycle methods take
/// `&mut self`; data operations on the concrete adapters take `&self`.
#[async_trait]
pub trait DbInterface: Send + Sync {
    /// Which backend this adapter talks to.
    fn backend(&self) -> BackendKind;

    /// Upper bound on connect attempts made by [`DbInterface::reconnect`].
    fn max_retries(&self) -> u32;

    /// Establish the native connection.
    ///
    /// Fails with [`DbError::AlreadyConnected`] if a handle is already held.
    async fn connect(&mut self) -> DbResult<()>;

    /// Release the native handle. A no-op when nothing is held.
    async fn disconnect(&mut self) -> DbResult<()>;

    /// Issue the backend's liveness check.
    async fn ping(&self) -> DbResult<()>;

    /// Cached connection flag. Never touches the network.
    fn is_connected(&self) -> bool;

    /// Disconnect, then retry connect up to `max_retries` times with linear
    /// backoff (1s, 2s, ... between attempts).
    ///
    /// The waits between attempts abort with [`DbError::Cancelled`] as soon as
    /// `cancel` fires.
    async fn reconnect(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        let backend = self.backend();
        if let Err(e) = self.disconnect().await {
            warn!(backend = %backend, error = %e, "Disconnect before reconnect failed");
        }

        let max_retries = self.max_retries();
        for attempt in 1..=max_retries {
            match self.connect().await {
                Ok(()) => {
                    info!(backend = %backend, attempt, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        backend = %backend,
                        attempt,
                        max_retries,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                }
            }

            if attempt < max_retries {
                wait_or_cancel(backoff_delay(attempt), cancel).await?;
            }
        }

        Err(DbError::reconnect_failed(backend, max_retries))
    }
}

/// CRUD contract, generic over each backend's native data shapes.
#[async_trait]
pub trait DataOperation: DbInterface {
    /// What a single record looks like (a document, a row).
    type Record: Send + Sync;
    /// Selection criteria. An empty filter matches every record.
    type Filter: Send + Sync;
    /// Changes applied by [`DataOperation::update`].
    type Update: Send + Sync;

    /// Insert one record.
    async fn create(&self, collection: &str, data: &Self::Record) -> DbResult<()>;

    /// Fetch the first record matching `filter`, or [`DbError::NotFound`].
    async fn read(&self, collection: &str, filter: &Self::Filter) -> DbResult<Self::Record>;

    /// Apply `update` to matching records, returning how many were modified.
    async fn update(
        &self,
        collection: &str,
        filter: &Self::Filter,
        update: &Self::Update,
    ) -> DbResult<u64>;

    /// Delete matching records, returning how many were removed.
    async fn delete(&self, collection: &str, filter: &Self::Filter) -> DbResult<u64>;

    /// Fetch every record matching `filter`.
    async fn list(&self, collection: &str, filter: &Self::Filter) -> DbResult<Vec<Self::Record>>;
}

/// Linear backoff: the wait after attempt `n` (1-indexed) is `n` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt))
}

async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> DbResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DbError::cancelled("reconnect backoff")),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
