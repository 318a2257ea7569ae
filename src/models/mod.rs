//! Data models for polydb.
//!
//! This module re-exports the value types passed through the adapters.

pub mod value;
pub mod watch;

// Re-export commonly used types
pub use value::{Row, SqlValue, decode_row, row_from_json, row_to_json};
pub use watch::{WatchEvent, WatchEventKind};
