//! Lease and job records as they are stored.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lobbyforge_protocol::{MatchId, ServerAddress, UserId};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Availability of a compute server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    /// Alive and waiting for a match.
    Ready,
    /// Handed to a lobby; a job for it is pending or being hosted.
    InUse,
}

/// One compute server's registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLease {
    pub server_id: UserId,
    pub state: LeaseState,
    pub address: ServerAddress,
    /// Last liveness signal, milliseconds since epoch.
    pub heartbeat_at: u64,
}

impl ServerLease {
    /// A freshly registered server: Ready, heartbeat at `now`.
    pub fn new(server_id: UserId, address: ServerAddress, now: u64) -> Self {
        Self {
            server_id,
            state: LeaseState::Ready,
            address,
            heartbeat_at: now,
        }
    }

    /// `true` once more than `ttl` has passed since the last heartbeat.
    pub fn is_stale(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.heartbeat_at) > ttl.as_millis() as u64
    }

    pub fn is_ready(&self) -> bool {
        self.state == LeaseState::Ready
    }
}

/// Tells a compute server which match to host. Keyed by server id, so a
/// server has at most one pending job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAssignment {
    pub server_id: UserId,
    pub match_id: MatchId,
    /// Milliseconds since epoch.
    pub assigned_at: u64,
}
