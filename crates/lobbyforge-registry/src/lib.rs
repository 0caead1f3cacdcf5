//! Compute-server registry and allocator for Lobbyforge.
//!
//! Compute servers announce themselves with periodic heartbeats; lobbies
//! ask the registry for a server once their players are ready. The
//! registry keeps one [`ServerLease`] per server and at most one pending
//! [`JobAssignment`] per server in a [`StorageBackend`], and guarantees a
//! Ready server is handed to exactly one lobby.
//!
//! ```text
//!            heartbeat()                 acquire()               release()
//! (absent) ─────────────→ Ready ───────────────────→ InUse ──────────────→ Ready
//!                           │                          │
//!                           └──── heartbeat older than TTL: deleted on next scan
//! ```
//!
//! [`StorageBackend`]: lobbyforge_store::StorageBackend

mod config;
mod error;
mod lease;
mod registry;

pub use config::{DEFAULT_HEARTBEAT_TTL, RegistryConfig, SYSTEM_OWNER};
pub use error::RegistryError;
pub use lease::{JobAssignment, LeaseState, ServerLease, now_millis};
pub use registry::ServerRegistry;
