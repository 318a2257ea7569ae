//! Change notifications produced by the coordination-store watch stream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Put,
    Delete,
}

/// One change to a watched key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: Vec<u8>,
    /// Empty for deletions
    pub value: Vec<u8>,
    /// Store revision at which the change happened
    pub revision: i64,
}

impl WatchEvent {
    /// Key as UTF-8, replacing invalid sequences.
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Value as UTF-8, replacing invalid sequences.
    pub fn value_str(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}
