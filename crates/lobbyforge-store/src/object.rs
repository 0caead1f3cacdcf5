//! Stored object type.

use serde::{Deserialize, Serialize};

/// A stored object and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Owner identity. The registry stores everything under one system owner.
    pub owner: String,
    /// Collection name.
    pub collection: String,
    /// Object key within the collection.
    pub key: String,
    /// JSON value.
    pub value: serde_json::Value,
    /// Write counter, starting at 1.
    pub version: u64,
    /// Creation timestamp (milliseconds since epoch).
    pub created_at: u64,
    /// Last update timestamp (milliseconds since epoch).
    pub updated_at: u64,
}
