//! PostgreSQL adapter (relational-B).
//!
//! Wraps a `PgPool` built from a `PgConnectOptions` value. Statements come from
//! [`crate::db::sql`] with the Postgres dialect.
//!
//! Text parameters are sent as `text`. Postgres has no implicit cast from
//! `text` to types such as `timestamptz`, `uuid` or `integer`, so before binding
//! text values the adapter looks up the target table's column types and casts
//! those placeholders explicitly.

use crate::config::{BackendConfig, BackendKind, DEFAULT_MAX_RETRIES};
use crate::db::interface::{DataOperation, DbInterface};
use crate::db::params::postgres_query;
use crate::db::sql::{self, ColumnCasts, Dialect};
use crate::db::types::pg_row_to_values;
use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlValue};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKEND: BackendKind = BackendKind::PostgreSQL;

const MAX_CONNECTIONS: u32 = 10;
const MIN_CONNECTIONS: u32 = 1;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const COLUMN_TYPES_SQL: &str = "SELECT a.attname::text, a.atttypid::regtype::text \
     FROM pg_catalog.pg_attribute a \
     WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped";

/// Types that accept a `text` parameter without a cast.
const TEXT_TYPES: &[&str] = &["text", "character varying", "character", "name", "citext"];

pub struct PostgresStore {
    config: Arc<BackendConfig>,
    pool: Option<PgPool>,
    connected: bool,
    max_retries: u32,
}

impl PostgresStore {
    pub fn new(config: Arc<BackendConfig>) -> Self {
        Self {
            config,
            pool: None,
            connected: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Driver connect options derived from the config.
    ///
    /// Recognised option: `application_name`.
    pub fn connect_options(&self) -> PgConnectOptions {
        let config = &self.config;
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port);

        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }
        if let Some(name) = config.option_str("application_name") {
            options = options.application_name(name);
        }
        options
    }

    fn pool(&self) -> DbResult<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| DbError::not_connected(BACKEND))
    }

    /// Casts for the non-text columns of `table`. Skips the lookup when none
    /// of `rows` carries a text value.
    async fn text_casts(&self, pool: &PgPool, table: &str, rows: &[&Row]) -> DbResult<ColumnCasts> {
        let has_text = rows
            .iter()
            .flat_map(|row| row.values())
            .any(|v| matches!(v, SqlValue::Text(_)));
        if !has_text {
            return Ok(ColumnCasts::new());
        }

        let qualified = Dialect::Postgres.quote_ident(table)?;
        let columns: Vec<(String, String)> = sqlx::query_as(COLUMN_TYPES_SQL)
            .bind(qualified)
            .fetch_all(pool)
            .await?;
        Ok(casts_for(columns))
    }
}

fn casts_for(columns: impl IntoIterator<Item = (String, String)>) -> ColumnCasts {
    columns
        .into_iter()
        .filter(|(_, ty)| !TEXT_TYPES.contains(&ty.as_str()))
        .collect()
}

#[async_trait]
impl DbInterface for PostgresStore {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.pool.is_some() {
            return Err(DbError::already_connected(BACKEND));
        }

        let pool = PgPoolOptions::new()
            .min_connections(MIN_CONNECTIONS)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(self.connect_options())
            .await
            .map_err(|e| DbError::connect_failed(BACKEND, e))?;

        info!(
            backend = %BACKEND,
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connected"
        );
        self.pool = Some(pool);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> DbResult<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(backend = %BACKEND, "Disconnected");
        }
        self.connected = false;
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()?).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl DataOperation for PostgresStore {
    type Record = Row;
    type Filter = Row;
    type Update = Row;

    async fn create(&self, collection: &str, data: &Row) -> DbResult<()> {
        let pool = self.pool()?;
        let casts = self.text_casts(pool, collection, &[data]).await?;
        let stmt = sql::insert(Dialect::Postgres, collection, data, &casts)?;
        debug!(backend = %BACKEND, sql = %stmt.sql, params = stmt.params.len(), "Executing insert");
        postgres_query(&stmt).execute(pool).await?;
        Ok(())
    }

    async fn read(&self, collection: &str, filter: &Row) -> DbResult<Row> {
        let pool = self.pool()?;
        let casts = self.text_casts(pool, collection, &[filter]).await?;
        let stmt = sql::select(Dialect::Postgres, collection, filter, Some(1), &casts)?;
        debug!(backend = %BACKEND, sql = %stmt.sql, "Executing read");
        postgres_query(&stmt)
            .fetch_optional(pool)
            .await?
            .map(|row| pg_row_to_values(&row))
            .ok_or_else(|| DbError::not_found(BACKEND, format!("row in '{}'", collection)))
    }

    async fn update(&self, collection: &str, filter: &Row, update: &Row) -> DbResult<u64> {
        let pool = self.pool()?;
        let casts = self.text_casts(pool, collection, &[filter, update]).await?;
        let stmt = sql::update(Dialect::Postgres, collection, filter, update, &casts)?;
        debug!(backend = %BACKEND, sql = %stmt.sql, params = stmt.params.len(), "Executing update");
        let result = postgres_query(&stmt).execute(pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, collection: &str, filter: &Row) -> DbResult<u64> {
        let pool = self.pool()?;
        if filter.is_empty() {
            warn!(backend = %BACKEND, table = %collection, "Deleting every row");
        }
        let casts = self.text_casts(pool, collection, &[filter]).await?;
        let stmt = sql::delete(Dialect::Postgres, collection, filter, &casts)?;
        debug!(backend = %BACKEND, sql = %stmt.sql, "Executing delete");
        let result = postgres_query(&stmt).execute(pool).await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, collection: &str, filter: &Row) -> DbResult<Vec<Row>> {
        let pool = self.pool()?;
        let casts = self.text_casts(pool, collection, &[filter]).await?;
        let stmt = sql::select(Dialect::Postgres, collection, filter, None, &casts)?;
        debug!(backend = %BACKEND, sql = %stmt.sql, "Executing list");
        let rows = postgres_query(&stmt).fetch_all(pool).await?;
        Ok(rows.iter().map(pg_row_to_values).collect())
    }
}
