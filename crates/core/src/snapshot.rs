//! Polling snapshot shape.
//!
//! The pull endpoint returns the same logical state the push channel
//! delivers incrementally: a map from state key (see
//! [`Message::state_key`](crate::Message::state_key)) to the latest value,
//! stamped with the time the snapshot was assembled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Assembly time; the tie-break against push messages.
    pub timestamp: Timestamp,
    /// Latest value per state key, e.g. `"lead:42"`, `"metrics:tenant-3"`.
    #[serde(default)]
    pub entries: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }
}
