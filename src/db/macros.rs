//! Dispatch macro for [`AnyStore`](crate::db::store::AnyStore).
//!
//! Expands to a match over every adapter variant, binding the adapter to one
//! identifier and evaluating the same body in each arm.

/// Evaluate `$body` against whichever adapter `$store` holds.
///
/// # Example
///
/// ```ignore
/// dispatch_store!(self, s => s.is_connected())
/// ```
#[macro_export]
macro_rules! dispatch_store {
    ($store:expr, $s:ident => $body:expr) => {
        match $store {
            $crate::db::store::AnyStore::MongoDB($s) => $body,
            $crate::db::store::AnyStore::SqlServer($s) => $body,
            $crate::db::store::AnyStore::PostgreSQL($s) => $body,
            $crate::db::store::AnyStore::Redis($s) => $body,
            $crate::db::store::AnyStore::Etcd($s) => $body,
        }
    };
}

pub use dispatch_store;
