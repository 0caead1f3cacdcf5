//! Registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Owner identity every registry record is stored under.
pub const SYSTEM_OWNER: &str = "00000000-0000-0000-0000-000000000000";

/// How long a server may go without a heartbeat before its lease is
/// reclaimed.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(30);

/// Settings for a [`ServerRegistry`](crate::ServerRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Store owner for lease and job records.
    pub owner: String,

    /// Collection holding one lease per compute server.
    pub servers_collection: String,

    /// Collection holding at most one pending job per compute server.
    pub jobs_collection: String,

    /// Leases whose last heartbeat is older than this are deleted when a
    /// scan reaches them.
    pub heartbeat_ttl: Duration,

    /// Attempts a heartbeat or release makes before giving up when its
    /// conditional write keeps losing to concurrent writers.
    pub max_write_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            owner: SYSTEM_OWNER.to_string(),
            servers_collection: "servers".to_string(),
            jobs_collection: "jobs".to_string(),
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
            max_write_attempts: 3,
        }
    }
}
