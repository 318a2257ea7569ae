//! Database abstraction layer.
//!
//! This module provides:
//! - The shared lifecycle and CRUD contracts
//! - One adapter per backend
//! - Statement building and row decoding for the relational adapters
//! - Backend selection through [`AnyStore`]

pub mod etcd;
pub mod interface;
#[macro_use]
pub mod macros;
pub mod mongo;
pub(crate) mod params;
pub mod postgres;
pub mod redis;
pub mod sql;
pub mod sqlserver;
pub mod store;
pub mod types;

pub use self::etcd::{EtcdStore, Watch};
pub use self::interface::{DataOperation, DbInterface, backoff_delay};
pub use self::mongo::MongoStore;
pub use self::postgres::PostgresStore;
pub use self::redis::RedisStore;
pub use self::sqlserver::SqlServerStore;
pub use self::store::AnyStore;
