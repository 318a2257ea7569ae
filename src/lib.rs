//! polydb
//!
//! One data-access layer over MongoDB, SQL Server, PostgreSQL, Redis and
//! etcd. Every adapter shares the same connection lifecycle and reconnect
//! policy; document and relational adapters also share a CRUD contract.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{BackendConfig, BackendKind, Config};
pub use db::{AnyStore, DataOperation, DbInterface};
pub use error::{DbError, DbResult};
